//! Structured logging
//!
//! Installs a `tracing` subscriber with a reloadable filter.

use tether_config::{LogLevel, LoggingConfig};
use tracing_subscriber::{
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

use crate::error::{ObservabilityError, Result};

type ReloadHandle = Handle<EnvFilter, Registry>;

/// Owns the installed subscriber's filter
#[derive(Debug)]
pub struct LogManager {
    config: LoggingConfig,
    reload_handle: ReloadHandle,
}

impl LogManager {
    /// Install the global subscriber.
    ///
    /// Fails with [`ObservabilityError::Init`] if a global subscriber is
    /// already set for this process.
    pub fn init(config: &LoggingConfig) -> Result<Self> {
        let filter = build_filter(config)?;
        let (filter, reload_handle) = reload::Layer::new(filter);

        let registry = tracing_subscriber::registry().with(filter);

        let installed = if config.json_format {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(config.include_target)
                .with_thread_ids(true)
                .with_ansi(false);
            registry.with(layer).try_init()
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_target(config.include_target)
                .with_ansi(config.ansi_colors);
            registry.with(layer).try_init()
        };
        installed.map_err(|e| ObservabilityError::init(e.to_string()))?;

        tracing::info!(
            target: "tether_observability",
            "Log manager initialized with level: {}",
            config.level
        );

        Ok(Self {
            config: config.clone(),
            reload_handle,
        })
    }

    /// Swap the active filter; `directives` uses `EnvFilter` syntax
    pub fn update_level(&mut self, directives: &str) -> Result<()> {
        let new_filter = EnvFilter::try_new(directives)
            .map_err(|e| ObservabilityError::logging(format!("Invalid log level: {}", e)))?;

        self.reload_handle
            .modify(|filter| *filter = new_filter)
            .map_err(|e| ObservabilityError::logging(format!("Failed to update log level: {}", e)))?;

        if let Ok(level) = directives.parse::<LogLevel>() {
            self.config.level = level;
        }

        tracing::info!(
            target: "tether_observability",
            "Log level updated to: {}",
            directives
        );
        Ok(())
    }

    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }
}

/// Base level plus per-module directives
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(config.level.to_string())
        .map_err(|e| ObservabilityError::logging(format!("Invalid log level: {}", e)))?;

    let mut modules: Vec<_> = config.module_levels.iter().collect();
    modules.sort();
    for (module, level) in modules {
        let directive = format!("{}={}", module, level)
            .parse()
            .map_err(|e| ObservabilityError::config(format!("Invalid directive: {}", e)))?;
        filter = filter.add_directive(directive);
    }

    Ok(filter)
}

/// Span scoped to one client identity
pub fn client_span(client_id: &str) -> tracing::Span {
    tracing::info_span!("client", client_id = %client_id)
}

/// Span scoped to one gateway run
pub fn gateway_span(port: u16) -> tracing::Span {
    tracing::info_span!("gateway", port = port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_with_modules() {
        let mut config = LoggingConfig::default();
        config.level = LogLevel::Warn;
        config
            .module_levels
            .insert("tether_gateway".to_string(), "debug".to_string());

        let filter = build_filter(&config).unwrap();
        let rendered = filter.to_string();
        assert!(rendered.contains("warn"));
        assert!(rendered.contains("tether_gateway=debug"));
    }

    #[test]
    fn test_build_filter_rejects_bad_directive() {
        let mut config = LoggingConfig::default();
        config
            .module_levels
            .insert("tether_gateway".to_string(), "loud".to_string());
        assert!(build_filter(&config).is_err());
    }

    #[test]
    fn test_init_then_update_level() {
        let config = LoggingConfig {
            ansi_colors: false,
            ..LoggingConfig::default()
        };

        let mut manager = LogManager::init(&config).unwrap();
        manager.update_level("debug").unwrap();
        assert_eq!(manager.config().level, LogLevel::Debug);
        assert!(manager.update_level("tether_gateway=loud").is_err());

        // second global install in the same process is refused
        assert!(matches!(
            LogManager::init(&config),
            Err(ObservabilityError::Init { .. })
        ));
    }

    #[test]
    fn test_create_spans() {
        let span = client_span("c-1");
        if let Some(metadata) = span.metadata() {
            assert_eq!(metadata.name(), "client");
        }
        let span = gateway_span(9050);
        if let Some(metadata) = span.metadata() {
            assert_eq!(metadata.name(), "gateway");
        }
    }
}
