//! Init command implementation

use std::path::PathBuf;

use anyhow::Result;
use tracing::info;

use ptydeck::config::Config;

/// Write the default configuration file
pub fn init_command(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = config_path.unwrap_or_else(Config::global_config_path);

    if Config::init(&path, force)? {
        info!("Created {}", path.display());
    } else {
        println!(
            "Config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    Ok(())
}
