//! Compose a batch in an editor and dispatch it.

use std::io::Write;

use anyhow::{Context, Result};

use meshtask_core::config::MeshtaskConfig;
use meshtask_services::{SchemaRules, Validator};

use super::dispatch::dispatch_batch;
use super::editor::{edit_until_valid, resolve_editor, TEMPLATE};

pub async fn cmd_create(config: &MeshtaskConfig, editor: Option<&str>) -> Result<()> {
    config.mqtt.validate()?;
    let editor = resolve_editor(editor, &config.editor, std::env::var("EDITOR").ok())?;
    let validator = Validator::new(SchemaRules::from(&config.schema));

    let mut buffer = tempfile::Builder::new()
        .prefix("meshtask-")
        .suffix(".json")
        .tempfile()
        .context("failed to create batch buffer")?;
    buffer.write_all(TEMPLATE.as_bytes())?;
    buffer.flush()?;

    // The editor and prompts block on the terminal.
    let path = buffer.path().to_path_buf();
    let batch = tokio::task::spawn_blocking(move || {
        let stdin = std::io::stdin();
        edit_until_valid(&editor, &validator, &path, &mut stdin.lock(), &mut std::io::stdout())
    })
    .await
    .context("edit loop panicked")??;

    dispatch_batch(config, &batch).await
}
