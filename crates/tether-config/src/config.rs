use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            gateway: GatewayConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Read a value by dotted key, e.g. `gateway.port`
    pub fn get_value(&self, key: &str) -> Option<String> {
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["version"] => Some(self.version.clone()),
            ["gateway", "port"] => Some(self.gateway.port.to_string()),
            ["gateway", "tick_interval_ms"] => Some(self.gateway.tick_interval_ms.to_string()),
            ["gateway", "ping_interval_ms"] => Some(self.gateway.ping_interval_ms.to_string()),
            ["gateway", "disconnect_timeout_ms"] => {
                Some(self.gateway.disconnect_timeout_ms.to_string())
            }
            ["gateway", "broadcast_receive_enabled"] => {
                Some(self.gateway.broadcast_receive_enabled.to_string())
            }
            ["gateway", "unconnected_messages_enabled"] => {
                Some(self.gateway.unconnected_messages_enabled.to_string())
            }
            ["gateway", "accept_connections"] => {
                Some(self.gateway.accept_connections.to_string())
            }
            ["logging", "level"] => Some(self.logging.level.to_string()),
            ["logging", "json_format"] => Some(self.logging.json_format.to_string()),
            ["logging", "include_target"] => Some(self.logging.include_target.to_string()),
            ["logging", "ansi_colors"] => Some(self.logging.ansi_colors.to_string()),
            ["logging", "module_levels", module] => self.logging.module_levels.get(*module).cloned(),
            _ => None,
        }
    }

    /// Set a value by dotted key
    pub fn set_value(&mut self, key: &str, value: &str) -> ConfigResult<()> {
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["gateway", "port"] => {
                self.gateway.port = value.parse().map_err(|_| {
                    ConfigError::Validation(format!("Invalid port number: {}", value))
                })?;
            }
            ["gateway", "tick_interval_ms"] => {
                self.gateway.tick_interval_ms = parse_number(value)?;
            }
            ["gateway", "ping_interval_ms"] => {
                self.gateway.ping_interval_ms = parse_number(value)?;
            }
            ["gateway", "disconnect_timeout_ms"] => {
                self.gateway.disconnect_timeout_ms = parse_number(value)?;
            }
            ["gateway", "broadcast_receive_enabled"] => {
                self.gateway.broadcast_receive_enabled = parse_bool(value)?;
            }
            ["gateway", "unconnected_messages_enabled"] => {
                self.gateway.unconnected_messages_enabled = parse_bool(value)?;
            }
            ["gateway", "accept_connections"] => {
                self.gateway.accept_connections = parse_bool(value)?;
            }
            ["logging", "level"] => {
                self.logging.level = value.parse()?;
            }
            ["logging", "json_format"] => {
                self.logging.json_format = parse_bool(value)?;
            }
            ["logging", "include_target"] => {
                self.logging.include_target = parse_bool(value)?;
            }
            ["logging", "ansi_colors"] => {
                self.logging.ansi_colors = parse_bool(value)?;
            }
            ["logging", "module_levels", module] => {
                let level: LogLevel = value.parse()?;
                self.logging
                    .module_levels
                    .insert(module.to_string(), level.to_string());
            }
            _ => return Err(ConfigError::KeyNotFound(key.to_string())),
        }
        Ok(())
    }
}

fn parse_number(value: &str) -> ConfigResult<u64> {
    value
        .parse()
        .map_err(|_| ConfigError::Validation(format!("Invalid number: {}", value)))
}

fn parse_bool(value: &str) -> ConfigResult<bool> {
    value
        .parse()
        .map_err(|_| ConfigError::Validation(format!("Invalid boolean: {}", value)))
}

/// Gateway and transport settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Port the transport binds to
    pub port: u16,
    /// Polling loop tick, also handed to the transport as its update interval
    pub tick_interval_ms: u64,
    /// Transport keep-alive ping interval
    pub ping_interval_ms: u64,
    /// Idle time after which the transport times a peer out
    pub disconnect_timeout_ms: u64,
    pub broadcast_receive_enabled: bool,
    pub unconnected_messages_enabled: bool,
    /// Admission decision for incoming connection requests
    pub accept_connections: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: 9050,
            tick_interval_ms: 15,
            ping_interval_ms: 1000,
            disconnect_timeout_ms: 5000,
            broadcast_receive_enabled: true,
            unconnected_messages_enabled: true,
            accept_connections: true,
        }
    }
}

impl GatewayConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.port == 0 {
            return Err(ConfigError::Validation(
                "Gateway port cannot be 0".to_string(),
            ));
        }

        if self.tick_interval_ms == 0 || self.tick_interval_ms > 1000 {
            return Err(ConfigError::Validation(format!(
                "Gateway tick_interval_ms must be within 1..=1000, got {}",
                self.tick_interval_ms
            )));
        }

        if self.ping_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "Gateway ping_interval_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Log level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(ConfigError::Validation(format!("Invalid log level: {}", s))),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub json_format: bool,
    /// Per-module overrides, module path -> level
    #[serde(default)]
    pub module_levels: HashMap<String, String>,
    #[serde(default = "default_true")]
    pub include_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json_format: false,
            module_levels: HashMap::new(),
            include_target: true,
            ansi_colors: true,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gateway.port, 9050);
        assert_eq!(config.gateway.tick_interval(), Duration::from_millis(15));
        assert_eq!(config.gateway.ping_interval(), Duration::from_millis(1000));
        assert!(config.gateway.accept_connections);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_get_and_set_value() {
        let mut config = Config::default();
        config.set_value("gateway.port", "7777").unwrap();
        config.set_value("gateway.accept_connections", "false").unwrap();
        config.set_value("logging.level", "WARNING").unwrap();
        config
            .set_value("logging.module_levels.tether_gateway", "trace")
            .unwrap();

        assert_eq!(config.get_value("gateway.port").as_deref(), Some("7777"));
        assert_eq!(
            config.get_value("gateway.accept_connections").as_deref(),
            Some("false")
        );
        assert_eq!(config.get_value("logging.level").as_deref(), Some("warn"));
        assert_eq!(
            config
                .get_value("logging.module_levels.tether_gateway")
                .as_deref(),
            Some("trace")
        );
    }

    #[test]
    fn test_set_value_rejects_bad_input() {
        let mut config = Config::default();
        assert!(matches!(
            config.set_value("gateway.port", "70000"),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            config.set_value("logging.level", "loud"),
            Err(ConfigError::Validation(_))
        ));
        assert!(matches!(
            config.set_value("gateway.nope", "1"),
            Err(ConfigError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"gateway": {"port": 4000}}"#).unwrap();
        assert_eq!(config.gateway.port, 4000);
        assert_eq!(config.gateway.tick_interval_ms, 15);
        assert!(config.logging.include_target);
    }
}
