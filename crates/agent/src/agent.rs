//! Process-wide telemetry agent.
//!
//! Startup order matters: the metrics exporter and route settings are
//! validated before any detector runs, so a bad `OTEL_METRICS_EXPORTER`
//! fails the process immediately. The resource is resolved next and is then
//! shared by the tracer and meter providers for the rest of the process.

use std::sync::Arc;

use common::ConfigError;
use opentelemetry::metrics::MetricsError;
use opentelemetry::trace::TraceError;
use prometheus::Registry;
use thiserror::Error;
use tracing::{error, info};

use crate::config::AgentConfig;
use crate::exporter::{select_metrics_reader, MetricsReaderChoice};
use crate::resource::{AttributeSet, ResourceResolver};
use crate::route::{RouteConfig, RouteNormalizer};
use crate::telemetry::{self, MetricsPipeline};

/// Errors that abort agent startup.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to install trace pipeline: {0}")]
    Tracing(#[from] TraceError),

    #[error("failed to install metrics pipeline: {0}")]
    Metrics(#[from] MetricsError),
}

/// A started agent: resolved resource, installed providers, route hook.
pub struct TelemetryAgent {
    metrics_reader: MetricsReaderChoice,
    resource: Arc<AttributeSet>,
    normalizer: Arc<RouteNormalizer>,
    metrics: MetricsPipeline,
}

impl TelemetryAgent {
    /// Start with the production detector list.
    pub async fn start(cfg: &AgentConfig) -> Result<Self, AgentError> {
        Self::start_with_resolver(
            cfg,
            ResourceResolver::with_default_detectors(cfg.detector_timeout()),
        )
        .await
    }

    /// Start with a caller-supplied resolver.
    ///
    /// # Errors
    ///
    /// Configuration errors are returned before `resolver` runs.
    pub async fn start_with_resolver(
        cfg: &AgentConfig,
        resolver: ResourceResolver,
    ) -> Result<Self, AgentError> {
        let (_, metrics_reader) = select_metrics_reader(cfg).map_err(config_failure)?;
        let route_config = RouteConfig::from_agent_config(cfg).map_err(config_failure)?;

        let resource = resolver.resolve().await;
        let sdk_resource = resource.to_resource();

        telemetry::install_tracing(&cfg.otel_exporter_otlp_endpoint, sdk_resource.clone())?;
        let metrics = telemetry::install_metrics(
            &metrics_reader,
            &cfg.otel_exporter_otlp_endpoint,
            sdk_resource,
        )?;

        info!(
            metrics_exporter = metrics_reader.label(),
            resource_attributes = resource.len(),
            path_prefix = route_config.path_prefix(),
            "telemetry agent started"
        );

        Ok(Self {
            metrics_reader,
            resource: Arc::new(resource),
            normalizer: Arc::new(RouteNormalizer::new(route_config)),
            metrics,
        })
    }

    pub fn resource(&self) -> Arc<AttributeSet> {
        Arc::clone(&self.resource)
    }

    pub fn metrics_reader(&self) -> MetricsReaderChoice {
        self.metrics_reader
    }

    pub fn route_normalizer(&self) -> Arc<RouteNormalizer> {
        Arc::clone(&self.normalizer)
    }

    pub fn prometheus_registry(&self) -> Option<Registry> {
        self.metrics.prometheus_registry().cloned()
    }

    /// Flush pending telemetry and stop the providers.
    pub fn shutdown(self) {
        self.metrics.shutdown();
        telemetry::shutdown_tracing();
        info!("telemetry agent stopped");
    }
}

fn config_failure(e: ConfigError) -> AgentError {
    error!(variable = e.variable(), error = %e, "invalid telemetry configuration");
    AgentError::Config(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{DetectError, Detector};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tracing_test::traced_test;

    /// Records whether it was ever asked to detect.
    struct Recording(Arc<AtomicBool>);

    #[async_trait]
    impl Detector for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn detect(&self) -> Result<AttributeSet, DetectError> {
            self.0.store(true, Ordering::SeqCst);
            Ok(AttributeSet::new().with("service.name", "checkout"))
        }
    }

    fn config(exporter: Option<&str>) -> AgentConfig {
        AgentConfig {
            otel_metrics_exporter: exporter.map(str::to_owned),
            ..AgentConfig::default()
        }
    }

    #[tokio::test]
    async fn unknown_exporter_fails_before_detection() {
        let detected = Arc::new(AtomicBool::new(false));
        let resolver =
            ResourceResolver::new(Duration::from_secs(1)).with_detector(Recording(detected.clone()));

        let err = TelemetryAgent::start_with_resolver(&config(Some("datadog")), resolver)
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            AgentError::Config(ConfigError::UnknownMetricsExporter(ref v)) if v == "datadog"
        ));
        assert_eq!(
            err.to_string(),
            "no valid option for OTEL_METRICS_EXPORTER: datadog"
        );
        assert!(!detected.load(Ordering::SeqCst));
    }

    #[traced_test]
    #[tokio::test]
    async fn invalid_exclusion_pattern_fails_startup() {
        let cfg = AgentConfig {
            route_exclusion_pattern: Some("(".into()),
            ..config(Some("none"))
        };
        let err = TelemetryAgent::start_with_resolver(&cfg, ResourceResolver::new(Duration::from_secs(1)))
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            AgentError::Config(ConfigError::InvalidExclusionPattern { .. })
        ));
        assert!(logs_contain("invalid telemetry configuration"));
        assert!(logs_contain("variable=\"ROUTE_EXCLUSION_PATTERN\""));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn starts_with_prometheus_reader() {
        let detected = Arc::new(AtomicBool::new(false));
        let resolver =
            ResourceResolver::new(Duration::from_secs(1)).with_detector(Recording(detected.clone()));
        let cfg = AgentConfig {
            path_prefix: "/api".into(),
            ..config(Some("prometheus"))
        };

        let agent = TelemetryAgent::start_with_resolver(&cfg, resolver)
            .await
            .unwrap();
        assert!(detected.load(Ordering::SeqCst));
        assert_eq!(agent.metrics_reader(), MetricsReaderChoice::PrometheusPull);
        assert!(agent.prometheus_registry().is_some());
        assert_eq!(
            agent.resource().get("service.name"),
            Some(&opentelemetry::Value::from("checkout"))
        );
        assert_eq!(agent.route_normalizer().route("/users").as_deref(), Some("/api/users"));
        agent.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn none_exporter_disables_metrics() {
        let agent = TelemetryAgent::start_with_resolver(
            &config(Some("none")),
            ResourceResolver::new(Duration::from_secs(1)),
        )
        .await
        .unwrap();
        assert_eq!(agent.metrics_reader(), MetricsReaderChoice::Disabled);
        assert!(agent.prometheus_registry().is_none());
        assert!(agent.resource().is_empty());
        agent.shutdown();
    }
}
