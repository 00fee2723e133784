//! Common error types shared across crates.

use thiserror::Error;

/// Fatal configuration error raised while the agent is starting.
///
/// Any of these aborts initialisation: the process must not go on to serve
/// traffic with an undefined metrics path or an unusable route matcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `OTEL_METRICS_EXPORTER` holds a value outside the supported set.
    #[error("no valid option for OTEL_METRICS_EXPORTER: {0}")]
    UnknownMetricsExporter(String),

    /// `OTEL_METRIC_EXPORT_INTERVAL` is not a positive integer of milliseconds.
    #[error("invalid OTEL_METRIC_EXPORT_INTERVAL: {0:?} is not a positive integer of milliseconds")]
    InvalidExportInterval(String),

    /// `ROUTE_EXCLUSION_PATTERN` does not compile as a regular expression.
    #[error("invalid ROUTE_EXCLUSION_PATTERN {pattern:?}: {reason}")]
    InvalidExclusionPattern { pattern: String, reason: String },

    /// A value is present but outside its accepted range.
    #[error("{name} {reason}")]
    OutOfRange { name: &'static str, reason: String },
}

impl ConfigError {
    /// Name of the environment variable that caused the error.
    pub fn variable(&self) -> &'static str {
        match self {
            ConfigError::UnknownMetricsExporter(_) => "OTEL_METRICS_EXPORTER",
            ConfigError::InvalidExportInterval(_) => "OTEL_METRIC_EXPORT_INTERVAL",
            ConfigError::InvalidExclusionPattern { .. } => "ROUTE_EXCLUSION_PATTERN",
            ConfigError::OutOfRange { name, .. } => name,
        }
    }
}
