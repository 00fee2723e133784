//! Axum router construction.

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use super::{handlers, middleware, state::AppState};
use crate::route::RouteLayer;

/// Build the application [`Router`] with all routes and middleware attached.
pub fn build(state: AppState) -> Router {
    let route_layer = RouteLayer::new(Arc::clone(&state.normalizer));
    Router::new()
        .route("/health", get(handlers::health))
        .route("/resource", get(handlers::resource))
        .route("/metrics", get(handlers::metrics))
        .fallback(handlers::route_echo)
        .layer(route_layer)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(middleware::REQUEST_TIMEOUT))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::AttributeSet;
    use crate::route::{RouteConfig, RouteNormalizer};
    use axum::{body::Body, http::Request};
    use axum_test::TestServer;
    use common::protocol::{HealthResponse, ResourceResponse, RouteResponse};
    use opentelemetry::metrics::MeterProvider as _;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::Registry;
    use tower::ServiceExt;

    fn state_with_prefix(prefix: &str) -> AppState {
        AppState {
            normalizer: Arc::new(RouteNormalizer::new(RouteConfig::new(prefix, None).unwrap())),
            ..AppState::default()
        }
    }

    #[tokio::test]
    async fn health_reports_exporter_and_resource_size() {
        let state = AppState {
            resource: Arc::new(
                AttributeSet::new()
                    .with("service.name", "checkout")
                    .with("host.name", "node-1"),
            ),
            metrics_exporter: "otlp",
            ..AppState::default()
        };
        let server = TestServer::new(build(state)).unwrap();

        let response = server.get("/health").await;
        response.assert_status_ok();
        let body: HealthResponse = response.json();
        assert_eq!(body.status, "ok");
        assert_eq!(body.metrics_exporter, "otlp");
        assert_eq!(body.resource_attributes, 2);
    }

    #[tokio::test]
    async fn resource_lists_merged_attributes() {
        let state = AppState {
            resource: Arc::new(
                AttributeSet::new()
                    .with("process.pid", 42_i64)
                    .with("cloud.provider", "aws"),
            ),
            ..AppState::default()
        };
        let server = TestServer::new(build(state)).unwrap();

        let body: ResourceResponse = server.get("/resource").await.json();
        assert_eq!(body.attributes["process.pid"], 42);
        assert_eq!(body.attributes["cloud.provider"], "aws");
    }

    #[tokio::test]
    async fn metrics_is_404_without_prometheus() {
        let app = build(AppState::default());
        let req = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn metrics_exposes_prometheus_registry() {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
            .unwrap();
        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        provider
            .meter("router-test")
            .u64_counter("router.test.count")
            .init()
            .add(3, &[]);

        let state = AppState {
            prometheus: Some(registry),
            metrics_exporter: "prometheus",
            ..AppState::default()
        };
        let server = TestServer::new(build(state)).unwrap();

        let response = server.get("/metrics").await;
        response.assert_status_ok();
        assert!(response.text().contains("router_test_count"));
    }

    #[tokio::test]
    async fn fallback_echoes_prefixed_route() {
        let server = TestServer::new(build(state_with_prefix("/api"))).unwrap();

        let body: RouteResponse = server.post("/orders/7").await.json();
        assert_eq!(body.method, "POST");
        assert_eq!(body.path, "/orders/7");
        assert_eq!(body.route.as_deref(), Some("/api/orders/7"));
    }

    #[tokio::test]
    async fn fallback_reports_no_route_for_assets() {
        let server = TestServer::new(build(AppState::default())).unwrap();

        let body: RouteResponse = server.get("/_next/static/chunk.js").await.json();
        assert_eq!(body.route, None);
    }
}
