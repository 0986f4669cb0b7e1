pub mod config;
pub mod manager;

pub use config::{Config, ConfigError, ConfigResult, GatewayConfig, LogLevel, LoggingConfig};
pub use manager::ConfigManager;

use std::path::PathBuf;

/// `~/.tether`
pub fn tether_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".tether"))
}

pub fn default_config_path() -> Option<PathBuf> {
    tether_dir().map(|dir| dir.join("config.json"))
}

/// Expand a leading `~/` to the home directory
pub fn expand_tilde(path: &str) -> Option<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map(|home| home.join(rest)),
        None => Some(PathBuf::from(path)),
    }
}
