//! OS resource detector
//!
//! Wraps the contrib [`OsResourceDetector`] and adds the kernel release.
use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::Value;
use opentelemetry_resource_detectors::OsResourceDetector;
use opentelemetry_sdk::resource::ResourceDetector;
use opentelemetry_semantic_conventions::resource::{OS_TYPE, OS_VERSION};

use super::{AttributeSet, DetectError, Detector};

const KERNEL_RELEASE_PATH: &str = "/proc/sys/kernel/osrelease";

/// Detect `os.type` and, on Linux, `os.version`.
pub struct OsDetector;

#[async_trait]
impl Detector for OsDetector {
    fn name(&self) -> &'static str {
        "os"
    }

    async fn detect(&self) -> Result<AttributeSet, DetectError> {
        let mut attributes = AttributeSet::from(&OsResourceDetector.detect(Duration::ZERO));
        if let Some(Value::String(os)) = attributes.get(OS_TYPE).cloned() {
            attributes.insert(OS_TYPE, os_type(os.as_str()));
        }
        attributes.insert_opt(
            OS_VERSION,
            tokio::fs::read_to_string(KERNEL_RELEASE_PATH)
                .await
                .ok()
                .map(|release| release.trim().to_owned())
                .filter(|release| !release.is_empty()),
        );
        Ok(attributes)
    }
}

/// Rust's `std::env::consts::OS` names mapped onto the `os.type` well-known values.
fn os_type(os: &str) -> String {
    match os {
        "macos" => "darwin",
        "dragonfly" => "dragonflybsd",
        "illumos" | "solaris" => "solaris",
        other => other,
    }
    .to_owned()
}
