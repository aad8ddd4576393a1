//! Interactive edit loop: open the batch in an editor until it validates
//! and the operator confirms it.

use std::io::{BufRead, Write};
use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};

use meshtask_core::config::EditorConfig;
use meshtask_core::TaskBatch;
use meshtask_services::Validator;

use super::dispatch::print_batch;

/// Initial buffer content for a new batch.
pub const TEMPLATE: &str = r#"{
    "actions": [
        {
            "opcode": "GET_STATUS",
            "addr": "0000",
            "auto": false
        }
    ]
}
"#;

/// Pick the editor: flag, then config, then `$EDITOR`.
pub fn resolve_editor(
    flag: Option<&str>,
    config: &EditorConfig,
    env: Option<String>,
) -> Result<String> {
    flag.map(str::to_string)
        .or_else(|| config.command.clone())
        .or(env)
        .filter(|cmd| !cmd.trim().is_empty())
        .context("no editor configured; set EDITOR (export EDITOR=vim), editor.command, or pass --editor")
}

/// Run `editor` on `path` and wait for it to exit.
fn launch(editor: &str, path: &Path) -> Result<()> {
    let mut parts = editor.split_whitespace();
    let program = parts.next().context("editor command is empty")?;
    let status = Command::new(program)
        .args(parts)
        .arg(path)
        .status()
        .with_context(|| format!("failed to start editor {:?}", editor))?;
    if !status.success() {
        bail!("editor {:?} exited with {}", editor, status);
    }
    Ok(())
}

fn read_answer(input: &mut impl BufRead) -> Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        bail!("input closed, batch not sent");
    }
    Ok(line.trim().to_ascii_lowercase())
}

/// Ask a yes/no question; empty input means yes.
pub fn confirm(input: &mut impl BufRead, out: &mut impl Write, prompt: &str) -> Result<bool> {
    write!(out, "{}", prompt)?;
    out.flush()?;
    Ok(matches!(read_answer(input)?.as_str(), "" | "y" | "yes"))
}

/// Edit `path` until its content validates and is confirmed.
pub fn edit_until_valid(
    editor: &str,
    validator: &Validator,
    path: &Path,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<TaskBatch> {
    loop {
        launch(editor, path)?;
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        match validator.validate(&raw) {
            Ok(batch) => {
                print_batch(&batch, out)?;
                if confirm(input, out, "Is it correct? [Y/n]: ")? {
                    return Ok(batch);
                }
            }
            Err(e) => {
                writeln!(out, "Invalid batch: {}", e)?;
                if let Some(allowed) = e.allowed() {
                    writeln!(out, "  allowed: {}", allowed)?;
                }
                write!(out, "Press Enter to continue...")?;
                out.flush()?;
                read_answer(input)?;
            }
        }
    }
}
