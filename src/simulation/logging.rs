//! Logging and tracing configuration
//!
//! This module provides centralized logging configuration for the simulator.
//! Logs always go to stderr so that stdout stays free for device updates.

use std::io;
use tracing::{info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

/// Boxed error returned by logging setup
pub type LoggingError = Box<dyn std::error::Error + Send + Sync>;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level for the application
    pub level: Level,
    /// Whether to enable JSON formatting
    pub json_format: bool,
    /// Whether to log to file
    pub log_to_file: bool,
    /// Log file directory (if logging to file)
    pub log_directory: Option<String>,
    /// Log file prefix (if logging to file)
    pub log_file_prefix: String,
    /// Whether to enable span events
    pub enable_span_events: bool,
    /// Whether to enable ansi colors in console output
    pub enable_ansi: bool,
    /// Custom environment filter
    pub env_filter: Option<String>,
}

/// Keeps the non-blocking log writers flushing until dropped
#[derive(Debug, Default)]
pub struct LoggingGuards {
    guards: Vec<WorkerGuard>,
}

impl LoggingGuards {
    /// Number of background writers held
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    /// Whether no background writer is held
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            log_to_file: false,
            log_directory: None,
            log_file_prefix: "fleet-synth".to_string(),
            enable_span_events: false,
            enable_ansi: true,
            env_filter: None,
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the log level
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Enable JSON formatting
    pub fn with_json_format(mut self) -> Self {
        self.json_format = true;
        self
    }

    /// Enable file logging
    pub fn with_file_logging(mut self, directory: impl Into<String>) -> Self {
        self.log_to_file = true;
        self.log_directory = Some(directory.into());
        self
    }

    /// Set log file prefix
    ///
    /// Runs name their log files after the scenario instance, e.g.
    /// `fleet-synth-demo.2017-01-01`.
    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.log_file_prefix = prefix.into();
        self
    }

    /// Enable span events
    pub fn with_span_events(mut self) -> Self {
        self.enable_span_events = true;
        self
    }

    /// Disable ANSI colors
    pub fn without_ansi(mut self) -> Self {
        self.enable_ansi = false;
        self
    }

    /// Set custom environment filter
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    fn span_events(&self) -> FmtSpan {
        if self.enable_span_events {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    fn build_filter(&self) -> Result<EnvFilter, LoggingError> {
        if let Some(filter) = &self.env_filter {
            return Ok(EnvFilter::try_new(filter)?);
        }
        Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                self.level
            ))
        }))
    }

    /// Initialize the global tracing subscriber
    ///
    /// The returned guards must be kept alive for as long as logs should be
    /// written; dropping them flushes the background writers.
    pub fn init(self) -> Result<LoggingGuards, LoggingError> {
        let env_filter = self.build_filter()?;
        let registry = Registry::default().with(env_filter);
        let mut guards = LoggingGuards::default();

        if self.log_to_file {
            let log_dir = self.log_directory.as_deref().unwrap_or("logs");
            let file_appender = rolling::daily(log_dir, &self.log_file_prefix);
            let (file_writer, file_guard) = non_blocking(file_appender);
            let (console_writer, console_guard) = non_blocking(io::stderr());
            guards.guards.push(file_guard);
            guards.guards.push(console_guard);

            // Files are always JSON
            let file_layer = fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_span_events(self.span_events());

            if self.json_format {
                let console_layer = fmt::layer()
                    .json()
                    .with_writer(console_writer)
                    .with_span_events(self.span_events());
                registry.with(file_layer).with(console_layer).try_init()?;
            } else {
                let console_layer = fmt::layer()
                    .with_writer(console_writer)
                    .with_ansi(self.enable_ansi)
                    .with_span_events(self.span_events());
                registry.with(file_layer).with(console_layer).try_init()?;
            }
        } else if self.json_format {
            let layer = fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_span_events(self.span_events());
            registry.with(layer).try_init()?;
        } else {
            let layer = fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(self.enable_ansi)
                .with_span_events(self.span_events());
            registry.with(layer).try_init()?;
        }

        info!(
            level = %self.level,
            json = self.json_format,
            file = self.log_to_file,
            "Logging initialized"
        );
        Ok(guards)
    }

    /// Initialize verbose logging (INFO level with span events)
    pub fn verbose() -> Self {
        Self::new().with_level(Level::INFO).with_span_events()
    }

    /// Initialize debug logging (DEBUG level with span events)
    pub fn debug() -> Self {
        Self::new().with_level(Level::DEBUG).with_span_events()
    }

    /// Quiet logging: warnings and errors only
    pub fn quiet() -> Self {
        Self::new().with_level(Level::WARN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn test_logging_config_creation() {
        let config = LoggingConfig::new();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.json_format);
        assert!(!config.log_to_file);
        assert!(config.log_directory.is_none());
        assert_eq!(config.log_file_prefix, "fleet-synth");
        assert!(!config.enable_span_events);
        assert!(config.enable_ansi);
        assert!(config.env_filter.is_none());
    }

    #[test]
    fn test_logging_config_builder_pattern() {
        let config = LoggingConfig::new()
            .with_level(Level::DEBUG)
            .with_json_format()
            .with_file_logging("test_logs")
            .with_file_prefix("fleet-synth-demo")
            .with_span_events()
            .without_ansi()
            .with_env_filter("debug");

        assert_eq!(config.level, Level::DEBUG);
        assert!(config.json_format);
        assert!(config.log_to_file);
        assert_eq!(config.log_directory, Some("test_logs".to_string()));
        assert_eq!(config.log_file_prefix, "fleet-synth-demo");
        assert!(config.enable_span_events);
        assert!(!config.enable_ansi);
        assert_eq!(config.env_filter, Some("debug".to_string()));
    }

    #[test]
    fn test_presets() {
        assert_eq!(LoggingConfig::debug().level, Level::DEBUG);
        assert!(LoggingConfig::verbose().enable_span_events);
        assert_eq!(LoggingConfig::quiet().level, Level::WARN);
    }

    #[test]
    fn test_invalid_env_filter_rejected() {
        let config = LoggingConfig::new().with_env_filter("fleet_synth=loud");
        assert!(config.build_filter().is_err());
    }
}
