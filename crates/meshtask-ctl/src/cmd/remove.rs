//! Remove scheduled tasks by name.

use anyhow::Result;

use meshtask_core::config::MeshtaskConfig;
use meshtask_core::TaskBatch;

use super::dispatch::dispatch_batch;

pub async fn cmd_remove(config: &MeshtaskConfig, names: &[String]) -> Result<()> {
    let batch = TaskBatch::removal(names.iter().cloned());
    dispatch_batch(config, &batch).await
}
