//! Environment resource detector
//!
//! Reads `OTEL_RESOURCE_ATTRIBUTES` and `OTEL_SERVICE_NAME`.
use std::env;

use async_trait::async_trait;
use opentelemetry::KeyValue;
use opentelemetry_semantic_conventions::resource::SERVICE_NAME;
use percent_encoding::percent_decode_str;
use tracing::debug;

use super::{AttributeSet, DetectError, Detector};

const OTEL_RESOURCE_ATTRIBUTES: &str = "OTEL_RESOURCE_ATTRIBUTES";
const OTEL_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";

/// Detect attributes supplied by the operator through the environment.
///
/// `OTEL_SERVICE_NAME` takes precedence over a `service.name` entry in
/// `OTEL_RESOURCE_ATTRIBUTES`.
pub struct EnvDetector;

impl EnvDetector {
    fn detect_with(lookup: impl Fn(&str) -> Option<String>) -> AttributeSet {
        let mut attributes = lookup(OTEL_RESOURCE_ATTRIBUTES)
            .map(|raw| parse_resource_attributes(&raw))
            .unwrap_or_default();

        if let Some(name) = lookup(OTEL_SERVICE_NAME) {
            let name = name.trim();
            if !name.is_empty() {
                attributes.insert(SERVICE_NAME, name.to_owned());
            }
        }
        attributes
    }
}

#[async_trait]
impl Detector for EnvDetector {
    fn name(&self) -> &'static str {
        "env"
    }

    async fn detect(&self) -> Result<AttributeSet, DetectError> {
        Ok(Self::detect_with(|key| env::var(key).ok()))
    }
}

/// Parse `key1=value1,key2=value2`. Values are percent-decoded; malformed
/// pairs are skipped.
fn parse_resource_attributes(raw: &str) -> AttributeSet {
    raw.split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                debug!(pair, "skipping resource attribute without a key");
                return None;
            }
            let value = match percent_decode_str(value.trim()).decode_utf8() {
                Ok(v) => v.into_owned(),
                Err(_) => {
                    debug!(key, "skipping resource attribute with invalid encoding");
                    return None;
                }
            };
            Some(KeyValue::new(key.to_owned(), value))
        })
        .collect()
}
