//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use prometheus::Registry;

use crate::agent::TelemetryAgent;
use crate::resource::AttributeSet;
use crate::route::RouteNormalizer;

/// Application state shared across all request handlers.
///
/// All fields are cheaply cloneable (`Arc`-wrapped or already `Arc`-backed) so
/// that Axum can clone the state for each request without copying the resource.
#[derive(Clone)]
pub struct AppState {
    /// Resource resolved at startup; immutable.
    pub resource: Arc<AttributeSet>,
    /// Label of the selected metrics reader.
    pub metrics_exporter: &'static str,
    /// Scraped by `GET /metrics` when the Prometheus reader is selected.
    pub prometheus: Option<Registry>,
    /// Route hook run by the request instrumentation layer.
    pub normalizer: Arc<RouteNormalizer>,
}

impl AppState {
    pub fn new(
        resource: Arc<AttributeSet>,
        metrics_exporter: &'static str,
        prometheus: Option<Registry>,
        normalizer: Arc<RouteNormalizer>,
    ) -> Self {
        Self {
            resource,
            metrics_exporter,
            prometheus,
            normalizer,
        }
    }

    pub fn from_agent(agent: &TelemetryAgent) -> Self {
        Self::new(
            agent.resource(),
            agent.metrics_reader().label(),
            agent.prometheus_registry(),
            agent.route_normalizer(),
        )
    }
}

impl Default for AppState {
    /// Empty resource, metrics disabled, no path prefix. Suitable for tests.
    fn default() -> Self {
        Self::new(
            Arc::new(AttributeSet::new()),
            "none",
            None,
            Arc::new(RouteNormalizer::default()),
        )
    }
}
