//! Metrics exporter selection.
//!
//! Turns `OTEL_METRICS_EXPORTER` / `OTEL_METRIC_EXPORT_INTERVAL` into exactly
//! one of: a periodic OTLP reader, a Prometheus pull endpoint, no reader, or
//! a fatal [`ConfigError`]. The decision is pure and taken once at startup;
//! the only side effect is a diagnostic log line naming the chosen path.

use std::time::Duration;

use common::ConfigError;
use tracing::info;

use crate::config::AgentConfig;

/// Interval used when `OTEL_METRIC_EXPORT_INTERVAL` is unset or empty.
pub const DEFAULT_EXPORT_INTERVAL_MS: u64 = 60_000;

/// Parsed value of `OTEL_METRICS_EXPORTER`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricsExporterKind {
    /// Variable absent or empty.
    Unset,
    Otlp,
    Prometheus,
    /// Metrics explicitly disabled.
    None,
    /// Anything else, kept verbatim for the error message.
    Invalid(String),
}

impl MetricsExporterKind {
    /// Parse the raw variable. Matching is case-sensitive.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Option::None | Some("") => MetricsExporterKind::Unset,
            Some("otlp") => MetricsExporterKind::Otlp,
            Some("prometheus") => MetricsExporterKind::Prometheus,
            Some("none") => MetricsExporterKind::None,
            Some(other) => MetricsExporterKind::Invalid(other.to_owned()),
        }
    }
}

/// The metrics reader the SDK should be built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsReaderChoice {
    /// Periodic reader pushing to the OTLP metrics sink.
    OtlpPeriodic { interval: Duration },
    /// Pull-based Prometheus endpoint; no export interval applies.
    PrometheusPull,
    /// No reader: metrics are disabled.
    Disabled,
}

impl MetricsReaderChoice {
    /// Short name used in logs and the health endpoint.
    pub fn label(&self) -> &'static str {
        match self {
            MetricsReaderChoice::OtlpPeriodic { .. } => "otlp",
            MetricsReaderChoice::PrometheusPull => "prometheus",
            MetricsReaderChoice::Disabled => "none",
        }
    }
}

/// Exporter configuration derived once from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterConfig {
    pub kind: MetricsExporterKind,
    pub export_interval_ms: u64,
}

impl ExporterConfig {
    /// Build from the agent configuration.
    pub fn from_agent_config(cfg: &AgentConfig) -> Result<Self, ConfigError> {
        Self::parse(
            cfg.otel_metrics_exporter.as_deref(),
            cfg.otel_metric_export_interval.as_deref(),
        )
    }

    /// Build from the two raw variables.
    ///
    /// The interval is only parsed when the OTLP path is selected; for the
    /// other kinds it is irrelevant and left at the default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidExportInterval`] when the OTLP path is
    /// selected and the interval is not a positive integer.
    pub fn parse(exporter: Option<&str>, interval: Option<&str>) -> Result<Self, ConfigError> {
        let kind = MetricsExporterKind::parse(exporter);
        let export_interval_ms = match kind {
            MetricsExporterKind::Unset | MetricsExporterKind::Otlp => parse_interval(interval)?,
            MetricsExporterKind::Prometheus
            | MetricsExporterKind::None
            | MetricsExporterKind::Invalid(_) => DEFAULT_EXPORT_INTERVAL_MS,
        };
        Ok(Self {
            kind,
            export_interval_ms,
        })
    }

    /// Decide which metrics reader to build.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownMetricsExporter`] naming the raw value
    /// when the exporter kind is not recognised.
    pub fn select(&self) -> Result<MetricsReaderChoice, ConfigError> {
        let choice = match &self.kind {
            MetricsExporterKind::Unset | MetricsExporterKind::Otlp => {
                info!(
                    interval_ms = self.export_interval_ms,
                    "using otel metrics exporter"
                );
                MetricsReaderChoice::OtlpPeriodic {
                    interval: Duration::from_millis(self.export_interval_ms),
                }
            }
            MetricsExporterKind::Prometheus => {
                info!("using prometheus metrics exporter");
                MetricsReaderChoice::PrometheusPull
            }
            MetricsExporterKind::None => {
                info!("disabling metrics reader");
                MetricsReaderChoice::Disabled
            }
            MetricsExporterKind::Invalid(raw) => {
                return Err(ConfigError::UnknownMetricsExporter(raw.clone()))
            }
        };
        Ok(choice)
    }
}

/// Parse and select in one step.
pub fn select_metrics_reader(
    cfg: &AgentConfig,
) -> Result<(ExporterConfig, MetricsReaderChoice), ConfigError> {
    let exporter = ExporterConfig::from_agent_config(cfg)?;
    let choice = exporter.select()?;
    Ok((exporter, choice))
}

/// Unset and blank fall back to the default; anything else must be a
/// positive integer.
fn parse_interval(raw: Option<&str>) -> Result<u64, ConfigError> {
    let raw = match raw {
        Some(r) if !r.trim().is_empty() => r,
        _ => return Ok(DEFAULT_EXPORT_INTERVAL_MS),
    };
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(ms),
        _ => Err(ConfigError::InvalidExportInterval(raw.to_owned())),
    }
}
