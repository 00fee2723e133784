//! Resource detection and deterministic merging.
//!
//! # Responsibilities
//!
//! - Run the fixed detector list concurrently, each under its own timeout.
//! - Merge the partial attribute sets by **list position**, never by
//!   completion order: the first detector to report a key owns it.
//! - Hand back one immutable [`AttributeSet`] that is attached to every span
//!   and metric for the rest of the process lifetime.
//!
//! # Module invariants
//!
//! - A failing, panicking, or timed-out detector contributes nothing and never
//!   aborts resolution of the others.

pub mod alibaba;
pub mod aws_ec2;
pub mod aws_eks;
pub mod container;
pub mod detector;
pub mod env;
pub mod gcp;
pub mod host;
pub mod metadata;
pub mod os;
pub mod process;

pub use detector::{DetectError, Detector};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::{KeyValue, Value};
use opentelemetry_sdk::Resource;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Attribute key → scalar value, keys unique.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSet(BTreeMap<String, Value>);

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert `value` only when `value` is `Some`.
    pub fn insert_opt(&mut self, key: impl Into<String>, value: Option<impl Into<Value>>) {
        if let Some(value) = value {
            self.insert(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Convert into the SDK resource attached to tracer and meter providers.
    pub fn to_resource(&self) -> Resource {
        Resource::new(
            self.0
                .iter()
                .map(|(k, v)| KeyValue::new(k.clone(), v.clone())),
        )
    }
}

impl FromIterator<KeyValue> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = KeyValue>>(iter: I) -> Self {
        let mut set = AttributeSet::new();
        for kv in iter {
            set.insert(kv.key.as_str().to_owned(), kv.value);
        }
        set
    }
}

impl From<&Resource> for AttributeSet {
    fn from(resource: &Resource) -> Self {
        resource
            .iter()
            .map(|(key, value)| KeyValue::new(key.clone(), value.clone()))
            .collect()
    }
}

/// Merge partial sets in the given order; the earliest set holding a key wins.
pub fn merge_in_order(sets: impl IntoIterator<Item = AttributeSet>) -> AttributeSet {
    let mut merged = BTreeMap::new();
    for set in sets {
        for (key, value) in set.0 {
            merged.entry(key).or_insert(value);
        }
    }
    AttributeSet(merged)
}

/// Runs an ordered list of [`Detector`]s and merges their output.
pub struct ResourceResolver {
    detectors: Vec<Arc<dyn Detector>>,
    timeout: Duration,
}

impl ResourceResolver {
    /// A resolver with no detectors, each detector bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            detectors: Vec::new(),
            timeout,
        }
    }

    /// The fixed production order: container, env, host, os, process,
    /// alibaba-ecs, aws-eks, aws-ec2, gcp.
    pub fn with_default_detectors(timeout: Duration) -> Self {
        Self::new(timeout)
            .with_detector(container::ContainerDetector::default())
            .with_detector(env::EnvDetector)
            .with_detector(host::HostDetector::default())
            .with_detector(os::OsDetector)
            .with_detector(process::ProcessDetector)
            .with_detector(alibaba::AlibabaEcsDetector::default())
            .with_detector(aws_eks::AwsEksDetector::default())
            .with_detector(aws_ec2::AwsEc2Detector::default())
            .with_detector(gcp::GcpDetector::default())
    }

    /// Append a detector; later detectors have lower precedence.
    pub fn with_detector(mut self, detector: impl Detector + 'static) -> Self {
        self.detectors.push(Arc::new(detector));
        self
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    /// Run every detector concurrently and merge by list position.
    pub async fn resolve(&self) -> AttributeSet {
        let timeout = self.timeout;
        debug!(detectors = ?self.detector_names(), "resolving resource");
        let mut tasks = JoinSet::new();
        for (index, detector) in self.detectors.iter().enumerate() {
            let detector = Arc::clone(detector);
            tasks.spawn(async move {
                let outcome = tokio::time::timeout(timeout, detector.detect()).await;
                (index, detector.name(), outcome)
            });
        }

        let mut slots = vec![AttributeSet::new(); self.detectors.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, name, Ok(Ok(attributes)))) => {
                    debug!(
                        detector = name,
                        attributes = attributes.len(),
                        "resource detector finished"
                    );
                    slots[index] = attributes;
                }
                Ok((_, name, Ok(Err(DetectError::NotApplicable(what))))) => {
                    debug!(detector = name, "not running in {what}; skipping");
                }
                Ok((_, name, Ok(Err(e)))) => {
                    warn!(detector = name, error = %e, "resource detector failed");
                }
                Ok((_, name, Err(_))) => {
                    warn!(
                        detector = name,
                        timeout_ms = timeout.as_millis() as u64,
                        "resource detector timed out"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "resource detector task aborted");
                }
            }
        }

        let merged = merge_in_order(slots);
        info!(attributes = merged.len(), "resource resolved");
        merged
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::Router;

    /// Serve `router` on an ephemeral local port and return its base URL.
    pub async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }
}
