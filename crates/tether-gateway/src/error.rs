use crate::transport::TransportError;

/// Gateway error type
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway is already running")]
    AlreadyRunning,

    #[error("Failed to start transport on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: TransportError,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] tether_config::ConfigError),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
