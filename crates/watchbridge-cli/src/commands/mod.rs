pub mod config;
pub mod daemon;
pub mod sync;
pub mod tasks;

use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use std::path::PathBuf;
use watch_sync_config::{Config, PathManager};
use watch_sync_core::TaskManager;
use watch_sync_servers::ServerFactoryRegistry;

pub(crate) fn config_file(path: Option<PathBuf>) -> PathBuf {
    path.unwrap_or_else(|| PathManager::default().config_file())
}

/// Load and validate the configuration.
pub(crate) fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let file = config_file(path);
    if !file.exists() {
        return Err(eyre!("Configuration file not found at {}", file.display()));
    }
    let config = Config::load_from_file(&file)
        .map_err(|e| eyre!("{:#}", e))
        .wrap_err_with(|| format!("Failed to load config from {}", file.display()))?;
    config.validate().map_err(|e| eyre!("Invalid configuration: {:#}", e))?;
    Ok((config, file))
}

/// Live servers and every configured task.
pub(crate) fn build_manager(config: &Config) -> Result<TaskManager> {
    let registry = ServerFactoryRegistry::new()
        .build_registry(config)
        .map_err(|e| eyre!("Failed to set up servers: {:#}", e))?;
    Ok(TaskManager::from_config(config, registry))
}
