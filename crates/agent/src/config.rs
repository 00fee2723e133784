//! Configuration loading and validation for the telemetry agent.
//!
//! All values are read from environment variables at startup. Exporter and
//! route settings are kept as raw strings here; [`crate::exporter`] and
//! [`crate::route`] turn them into typed, validated values.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Raw agent configuration as read from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// `OTEL_METRICS_EXPORTER`. Unset and empty both select OTLP.
    #[serde(default)]
    pub otel_metrics_exporter: Option<String>,

    /// `OTEL_METRIC_EXPORT_INTERVAL`, milliseconds between OTLP pushes.
    #[serde(default)]
    pub otel_metric_export_interval: Option<String>,

    /// OTLP/gRPC collector endpoint for traces and metrics.
    #[serde(default = "default_otlp_endpoint")]
    pub otel_exporter_otlp_endpoint: String,

    /// Prepended to inbound request paths before route computation.
    #[serde(default)]
    pub path_prefix: String,

    /// Overrides the default route exclusion pattern.
    #[serde(default)]
    pub route_exclusion_pattern: Option<String>,

    /// Upper bound on each resource detector, in milliseconds.
    #[serde(default = "default_detector_timeout_ms")]
    pub detector_timeout_ms: u64,

    /// Port the agent's HTTP server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_otlp_endpoint() -> String {
    "http://localhost:4317".into()
}
fn default_detector_timeout_ms() -> u64 {
    2000
}
fn default_listen_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".into()
}

impl AgentConfig {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self> {
        let source = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;
        Self::from_source(source)
    }

    /// Deserialise and validate an already-assembled configuration source.
    pub fn from_source(source: config::Config) -> Result<Self> {
        let c: AgentConfig = source
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Per-detector timeout as a [`Duration`].
    pub fn detector_timeout(&self) -> Duration {
        Duration::from_millis(self.detector_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.otel_exporter_otlp_endpoint.trim().is_empty() {
            anyhow::bail!("OTEL_EXPORTER_OTLP_ENDPOINT must not be empty");
        }
        if self.detector_timeout_ms == 0 {
            return Err(common::ConfigError::OutOfRange {
                name: "DETECTOR_TIMEOUT_MS",
                reason: "must be > 0".into(),
            }
            .into());
        }
        Ok(())
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            otel_metrics_exporter: None,
            otel_metric_export_interval: None,
            otel_exporter_otlp_endpoint: default_otlp_endpoint(),
            path_prefix: String::new(),
            route_exclusion_pattern: None,
            detector_timeout_ms: default_detector_timeout_ms(),
            listen_port: default_listen_port(),
            log_level: default_log_level(),
        }
    }
}
