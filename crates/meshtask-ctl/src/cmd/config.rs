//! Config inspection and bootstrap.

use std::path::Path;

use anyhow::Result;

use meshtask_core::config::MeshtaskConfig;

pub fn cmd_config_show(config: &MeshtaskConfig, path: &Path) -> Result<()> {
    let state = if path.exists() { "" } else { " (not found, using defaults)" };
    println!("# {}{}", path.display(), state);
    print!("{}", config.to_toml()?);
    Ok(())
}

pub fn cmd_config_init(path: &Path) -> Result<()> {
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }
    MeshtaskConfig::write_default_if_missing(path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
