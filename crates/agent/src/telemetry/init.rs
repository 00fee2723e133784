//! OTEL SDK initialisation: structured logging, OTLP traces, and the selected
//! metrics reader.

use anyhow::{Context, Result};
use opentelemetry::global;
use opentelemetry::metrics::MetricsError;
use opentelemetry::trace::TraceError;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::{runtime, Resource};
use prometheus::Registry;
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::exporter::MetricsReaderChoice;

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `log_level` when set. Logging comes up
/// before resource detection so exporter selection and detector failures
/// are visible.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(log_level: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .context("failed to initialise tracing subscriber")?;

    Ok(())
}

/// Install the OTLP/gRPC batch span pipeline as the global tracer provider.
pub fn install_tracing(otlp_endpoint: &str, resource: Resource) -> Result<(), TraceError> {
    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(otlp_endpoint),
        )
        .with_trace_config(opentelemetry_sdk::trace::Config::default().with_resource(resource))
        .install_batch(runtime::Tokio)?;
    debug!(endpoint = otlp_endpoint, "OTLP trace pipeline installed");
    Ok(())
}

/// Handles to the installed metrics pipeline.
#[derive(Default)]
pub struct MetricsPipeline {
    provider: Option<SdkMeterProvider>,
    prometheus: Option<Registry>,
}

impl MetricsPipeline {
    /// Registry scraped by `GET /metrics`; only set for the Prometheus reader.
    pub fn prometheus_registry(&self) -> Option<&Registry> {
        self.prometheus.as_ref()
    }

    /// Flush and stop the meter provider, if any.
    pub fn shutdown(&self) {
        if let Some(provider) = &self.provider {
            if let Err(e) = provider.shutdown() {
                warn!(error = %e, "meter provider shutdown failed");
            }
        }
    }
}

/// Build the meter provider for `choice` and install it globally.
///
/// [`MetricsReaderChoice::Disabled`] installs nothing; instruments created
/// through the global meter then record into a no-op.
pub fn install_metrics(
    choice: &MetricsReaderChoice,
    otlp_endpoint: &str,
    resource: Resource,
) -> Result<MetricsPipeline, MetricsError> {
    let pipeline = match choice {
        MetricsReaderChoice::OtlpPeriodic { interval } => {
            let provider = opentelemetry_otlp::new_pipeline()
                .metrics(runtime::Tokio)
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(otlp_endpoint),
                )
                .with_resource(resource)
                .with_period(*interval)
                .build()?;
            MetricsPipeline {
                provider: Some(provider),
                prometheus: None,
            }
        }
        MetricsReaderChoice::PrometheusPull => {
            let registry = Registry::new();
            let exporter = opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()?;
            let provider = SdkMeterProvider::builder()
                .with_reader(exporter)
                .with_resource(resource)
                .build();
            MetricsPipeline {
                provider: Some(provider),
                prometheus: Some(registry),
            }
        }
        MetricsReaderChoice::Disabled => MetricsPipeline::default(),
    };

    if let Some(provider) = &pipeline.provider {
        global::set_meter_provider(provider.clone());
    }
    debug!(reader = choice.label(), "metrics pipeline installed");
    Ok(pipeline)
}

/// Flush and stop the global tracer provider.
pub fn shutdown_tracing() {
    global::shutdown_tracer_provider();
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::metrics::MeterProvider as _;
    use opentelemetry::KeyValue;

    #[tokio::test]
    async fn disabled_reader_installs_nothing() {
        let pipeline = install_metrics(
            &MetricsReaderChoice::Disabled,
            "http://localhost:4317",
            Resource::empty(),
        )
        .unwrap();
        assert!(pipeline.provider.is_none());
        assert!(pipeline.prometheus_registry().is_none());
    }

    #[tokio::test]
    async fn prometheus_reader_exposes_registry() {
        let pipeline = install_metrics(
            &MetricsReaderChoice::PrometheusPull,
            "http://localhost:4317",
            Resource::new([KeyValue::new("service.name", "checkout")]),
        )
        .unwrap();
        assert!(pipeline.provider.is_some());

        let provider = pipeline.provider.as_ref().unwrap();
        provider
            .meter("init-test")
            .u64_counter("init.test.count")
            .init()
            .add(1, &[]);

        let families = pipeline.prometheus_registry().unwrap().gather();
        assert!(families
            .iter()
            .any(|f| f.get_name().starts_with("init_test_count")));
        pipeline.shutdown();
    }
}
