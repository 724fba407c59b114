//! Init command implementation

use anyhow::Result;
use std::path::PathBuf;

use questhook::config::Config;

/// Initialize a new questhook configuration
/// By default creates the global config at ~/.questhook/config.toml
/// Use --config to specify a custom path
pub fn init_command(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    let config_path = config_path.unwrap_or_else(Config::global_config_path);

    Config::write_default(&config_path, force)?;
    println!("Created: {}", config_path.display());

    Ok(())
}
