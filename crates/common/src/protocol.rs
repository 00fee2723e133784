//! Response types served by the agent's HTTP surface.
//!
//! All bodies are JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"not_found"`).
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` once the agent is serving.
    pub status: String,
    /// Selected metrics path: `"otlp"`, `"prometheus"` or `"none"`.
    pub metrics_exporter: String,
    /// Number of attributes in the resolved resource.
    pub resource_attributes: usize,
}

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

/// Response body for `GET /resource`: the merged resource attributes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceResponse {
    pub attributes: BTreeMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Route echo
// ---------------------------------------------------------------------------

/// Response body of the fallback handler: what the route hook recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteResponse {
    pub method: String,
    pub path: String,
    /// Normalized route, `None` when the path was excluded.
    pub route: Option<String>,
}
