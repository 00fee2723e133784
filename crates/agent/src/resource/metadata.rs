//! Minimal HTTP client for instance metadata services.
//!
//! Cloud detectors talk plain HTTP to link-local metadata endpoints; the EKS
//! detector swaps in an HTTPS connector for the Kubernetes API server.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request};
use hyper_util::client::legacy::connect::{Connect, HttpConnector};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use super::DetectError;

/// Bound on TCP connect so a missing metadata service fails fast.
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Client bound to one metadata service base URL.
#[derive(Clone)]
pub struct MetadataClient<C = HttpConnector> {
    client: Client<C, Full<Bytes>>,
    base: String,
}

impl MetadataClient<HttpConnector> {
    /// Plain-HTTP client for `base` (e.g. `http://169.254.169.254`).
    pub fn new(base: impl Into<String>) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(CONNECT_TIMEOUT));
        Self::with_connector(base, connector)
    }
}

impl<C> MetadataClient<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    pub fn with_connector(base: impl Into<String>, connector: C) -> Self {
        let base = base.into().trim_end_matches('/').to_owned();
        Self {
            client: Client::builder(TokioExecutor::new()).build(connector),
            base,
        }
    }

    /// `GET {base}{path}` and return the body as UTF-8 text.
    pub async fn get(&self, path: &str, headers: &[(&str, &str)]) -> Result<String, DetectError> {
        self.send(Method::GET, path, headers).await
    }

    /// `PUT {base}{path}` with an empty body and return the response text.
    pub async fn put(&self, path: &str, headers: &[(&str, &str)]) -> Result<String, DetectError> {
        self.send(Method::PUT, path, headers).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        headers: &[(&str, &str)],
    ) -> Result<String, DetectError> {
        let uri = format!("{}{}", self.base, path);
        let mut builder = Request::builder().method(method).uri(&uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder
            .body(Full::new(Bytes::new()))
            .map_err(|e| DetectError::Http {
                uri: uri.clone(),
                reason: e.to_string(),
            })?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| DetectError::Http {
                uri: uri.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DetectError::Status {
                uri,
                status: status.as_u16(),
            });
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| DetectError::Http {
                uri: uri.clone(),
                reason: e.to_string(),
            })?
            .to_bytes();

        String::from_utf8(body.to_vec())
            .map_err(|_| DetectError::Malformed(format!("{uri} returned non UTF-8 body")))
    }
}
