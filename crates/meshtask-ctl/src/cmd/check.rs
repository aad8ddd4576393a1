//! Offline batch validation.

use std::path::Path;

use anyhow::{Context, Result};

use meshtask_core::config::MeshtaskConfig;
use meshtask_services::{SchemaRules, ValidationError, Validator};

use super::dispatch::print_batch;

pub fn cmd_check(config: &MeshtaskConfig, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read batch file: {}", file.display()))?;
    let validator = Validator::new(SchemaRules::from(&config.schema));
    let batch = validator.validate(&raw).map_err(|e| {
        print_hint(&e);
        anyhow::Error::new(e).context(format!("{} is not a valid batch", file.display()))
    })?;
    print_batch(&batch, &mut std::io::stdout())?;
    println!("\nCorrect.");
    Ok(())
}

/// Print the allowed values for the offending field, if it has any.
pub fn print_hint(err: &ValidationError) {
    if let Some(allowed) = err.allowed() {
        eprintln!("  allowed: {}", allowed);
    }
}
