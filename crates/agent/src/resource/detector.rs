//! The [`Detector`] capability and its error type.

use async_trait::async_trait;
use thiserror::Error;

use super::AttributeSet;

/// Errors produced while probing the environment.
///
/// None of these are fatal: the resolver logs them and moves on.
#[derive(Debug, Error)]
pub enum DetectError {
    /// Detection ran fine but the process is not in this environment.
    #[error("not running in {0}")]
    NotApplicable(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The metadata endpoint could not be reached.
    #[error("request to {uri} failed: {reason}")]
    Http { uri: String, reason: String },

    /// The metadata endpoint answered with a non-2xx status.
    #[error("unexpected status {status} from {uri}")]
    Status { uri: String, status: u16 },

    #[error("malformed JSON document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("TLS setup failed: {0}")]
    Tls(String),
}

/// A source for a subset of resource attributes.
///
/// Implementations must be cheap to construct; all I/O happens in
/// [`detect`](Detector::detect), which the resolver bounds with a timeout.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Detector: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &'static str;

    async fn detect(&self) -> Result<AttributeSet, DetectError>;
}
