pub mod config;
pub mod paths;

pub use config::{Config, RuntimeConfig, Schedule, ServerConfig, TaskConfig, DEFAULT_INTERVAL_MINUTES};
pub use paths::{PathManager, container_base_path};
