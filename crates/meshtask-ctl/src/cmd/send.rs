//! Send a prepared batch file.

use std::path::Path;

use anyhow::{Context, Result};

use meshtask_core::config::MeshtaskConfig;
use meshtask_services::{SchemaRules, Validator};

use super::check::print_hint;
use super::dispatch::dispatch_batch;

pub async fn cmd_send(config: &MeshtaskConfig, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read batch file: {}", file.display()))?;
    let batch = Validator::new(SchemaRules::from(&config.schema))
        .validate(&raw)
        .map_err(|e| {
            print_hint(&e);
            anyhow::Error::new(e).context(format!("{} is not a valid batch", file.display()))
        })?;
    dispatch_batch(config, &batch).await
}
