//! Route normalization for inbound HTTP requests.
//!
//! # Responsibilities
//!
//! - Derive a stable route string from the raw request target (path and
//!   query string), optionally prefixed with the configured `PATH_PREFIX`.
//! - Drop routes for asset paths matching the exclusion pattern.
//! - Record the route on the request's [`RpcMetadata`] slot and as the
//!   `resource.name` span attribute so spans group by route.
//!
//! The hook never blocks and never panics; requests that are not incoming
//! HTTP requests with a path pass through untouched.

pub mod layer;

pub use layer::{RouteLayer, RouteService};

use common::ConfigError;
use opentelemetry::trace::Span;
use opentelemetry::KeyValue;
use regex::Regex;

use crate::config::AgentConfig;

/// Asset paths that never receive a route.
pub const DEFAULT_EXCLUSION_PATTERN: &str = r"(favicon\.ico|_next|static)";

/// Span attribute carrying `"<METHOD> <route>"`.
pub const RESOURCE_NAME: &str = "resource.name";

const DEFAULT_METHOD: &str = "GET";

/// Immutable route settings, built once at startup.
#[derive(Debug, Clone)]
pub struct RouteConfig {
    path_prefix: String,
    exclusion: Regex,
}

impl RouteConfig {
    /// `exclusion` overrides [`DEFAULT_EXCLUSION_PATTERN`] when set.
    pub fn new(path_prefix: impl Into<String>, exclusion: Option<&str>) -> Result<Self, ConfigError> {
        let pattern = exclusion
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_EXCLUSION_PATTERN);
        let exclusion = Regex::new(pattern).map_err(|e| ConfigError::InvalidExclusionPattern {
            pattern: pattern.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            path_prefix: path_prefix.into(),
            exclusion,
        })
    }

    pub fn from_agent_config(cfg: &AgentConfig) -> Result<Self, ConfigError> {
        Self::new(cfg.path_prefix.clone(), cfg.route_exclusion_pattern.as_deref())
    }

    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            path_prefix: String::new(),
            exclusion: Regex::new(DEFAULT_EXCLUSION_PATTERN)
                .expect("default exclusion pattern compiles"),
        }
    }
}

/// Per-request slot the host instrumentation uses to group spans by route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcMetadata {
    pub route: Option<String>,
}

/// What the hook is handed by the host instrumentation.
#[derive(Debug, Clone, Copy)]
pub enum HookRequest<'a> {
    /// An inbound HTTP request; either part may be missing.
    Incoming {
        method: Option<&'a str>,
        path: Option<&'a str>,
    },
    /// Outbound requests and anything else the host hands over.
    Other,
}

impl<'a> HookRequest<'a> {
    pub fn incoming(method: Option<&'a str>, path: Option<&'a str>) -> Self {
        Self::Incoming { method, path }
    }

    /// `(method, path)` for incoming requests that carry a non-empty path.
    fn as_incoming(&self) -> Option<(Option<&'a str>, &'a str)> {
        match *self {
            Self::Incoming {
                method,
                path: Some(path),
            } if !path.is_empty() => Some((method, path)),
            _ => None,
        }
    }
}

/// The raw request target a route is computed from: path plus query string.
pub fn request_target(uri: &http::Uri) -> &str {
    uri.path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path())
}

/// Computes routes and applies them to spans.
#[derive(Debug, Clone, Default)]
pub struct RouteNormalizer {
    config: RouteConfig,
}

impl RouteNormalizer {
    pub fn new(config: RouteConfig) -> Self {
        Self { config }
    }

    /// `raw` with the path prefix prepended unless it already starts with it.
    pub fn effective_path(&self, raw: &str) -> String {
        let prefix = self.config.path_prefix.as_str();
        if !prefix.is_empty() && !raw.starts_with(prefix) {
            format!("{prefix}{raw}")
        } else {
            raw.to_owned()
        }
    }

    /// The route for `raw`, or `None` when the effective path is excluded.
    pub fn route(&self, raw: &str) -> Option<String> {
        let effective = self.effective_path(raw);
        if effective.is_empty() || self.config.exclusion.is_match(&effective) {
            None
        } else {
            Some(effective)
        }
    }

    /// Request hook: compute the route and, when a span is present, record
    /// it on `rpc` and as `resource.name` on the span.
    ///
    /// Returns the route that was applied.
    pub fn on_request<S: Span>(
        &self,
        span: Option<&mut S>,
        request: &HookRequest<'_>,
        rpc: Option<&mut RpcMetadata>,
    ) -> Option<String> {
        let (method, path) = request.as_incoming()?;
        let span = span?;
        let route = self.route(path)?;

        if let Some(rpc) = rpc {
            rpc.route = Some(route.clone());
        }
        let method = method.filter(|m| !m.is_empty()).unwrap_or(DEFAULT_METHOD);
        span.set_attribute(KeyValue::new(RESOURCE_NAME, format!("{method} {route}")));
        Some(route)
    }
}
