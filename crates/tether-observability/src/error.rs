//! Observability error type

/// Observability error type
#[derive(Debug, thiserror::Error, Clone)]
pub enum ObservabilityError {
    /// Bad logging configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
    },

    /// Subscriber or filter failure
    #[error("Logging error: {message}")]
    Logging {
        message: String,
    },

    /// Global subscriber could not be installed
    #[error("Initialization error: {message}")]
    Init {
        message: String,
    },
}

impl ObservabilityError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn logging(message: impl Into<String>) -> Self {
        Self::Logging {
            message: message.into(),
        }
    }

    pub fn init(message: impl Into<String>) -> Self {
        Self::Init {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ObservabilityError>;
