//! Tether observability
//!
//! Logging bootstrap shared by applications embedding the gateway.

pub mod error;
pub mod logging;

pub use error::{ObservabilityError, Result};
pub use logging::{build_filter, client_span, gateway_span, LogManager};
