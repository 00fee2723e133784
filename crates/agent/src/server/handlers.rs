//! Axum request handlers for all agent endpoints.

use axum::{
    extract::State,
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Extension, Json,
};
use common::protocol::{ErrorResponse, HealthResponse, ResourceResponse, RouteResponse};
use opentelemetry::{Array, Value};
use prometheus::{Encoder, TextEncoder};
use tracing::warn;

use super::state::AppState;
use crate::route::RpcMetadata;

/// `GET /health` — liveness check.
///
/// Reports the selected metrics path and the size of the resolved resource.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        metrics_exporter: state.metrics_exporter.into(),
        resource_attributes: state.resource.len(),
    })
}

/// `GET /resource` — the merged resource attributes.
pub async fn resource(State(state): State<AppState>) -> Json<ResourceResponse> {
    let attributes = state
        .resource
        .iter()
        .map(|(key, value)| (key.to_owned(), value_to_json(value)))
        .collect();
    Json(ResourceResponse { attributes })
}

/// `GET /metrics` — Prometheus text exposition.
///
/// Returns `404 Not Found` unless the Prometheus reader is selected.
pub async fn metrics(State(state): State<AppState>) -> Response {
    let Some(registry) = state.prometheus.as_ref() else {
        let err = ErrorResponse::new("not_found", "prometheus metrics exporter is not enabled");
        return (StatusCode::NOT_FOUND, Json(err)).into_response();
    };

    let encoder = TextEncoder::new();
    let mut body = String::new();
    if let Err(e) = encoder.encode_utf8(&registry.gather(), &mut body) {
        warn!(error = %e, "failed to encode prometheus metrics");
        let err = ErrorResponse::new("internal_error", "failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(err)).into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_owned())],
        body,
    )
        .into_response()
}

/// Catch-all: echo the route the instrumentation recorded for this request.
pub async fn route_echo(
    method: Method,
    uri: Uri,
    rpc: Option<Extension<RpcMetadata>>,
) -> Json<RouteResponse> {
    Json(RouteResponse {
        method: method.as_str().to_owned(),
        path: uri.path().to_owned(),
        route: rpc.and_then(|Extension(rpc)| rpc.route),
    })
}

/// Convert an attribute value to its JSON form. Non-finite floats become `null`.
fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Bool(b) => (*b).into(),
        Value::I64(i) => (*i).into(),
        Value::F64(f) => float_to_json(*f),
        Value::String(s) => s.as_str().into(),
        Value::Array(Array::Bool(v)) => v.iter().copied().map(serde_json::Value::from).collect(),
        Value::Array(Array::I64(v)) => v.iter().copied().map(serde_json::Value::from).collect(),
        Value::Array(Array::F64(v)) => v.iter().copied().map(float_to_json).collect(),
        Value::Array(Array::String(v)) => v
            .iter()
            .map(|s| serde_json::Value::from(s.as_str()))
            .collect(),
    }
}

fn float_to_json(f: f64) -> serde_json::Value {
    serde_json::Number::from_f64(f)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}
