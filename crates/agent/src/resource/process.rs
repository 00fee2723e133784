//! PROCESS resource detector
//!
//! Wraps the contrib [`ProcessResourceDetector`] (pid, command line) and adds
//! the runtime name and the executable.
use std::env::current_exe;
use std::time::Duration;

use async_trait::async_trait;
use opentelemetry_resource_detectors::ProcessResourceDetector;
use opentelemetry_sdk::resource::ResourceDetector;
use opentelemetry_semantic_conventions::resource::{
    PROCESS_EXECUTABLE_NAME, PROCESS_EXECUTABLE_PATH, PROCESS_RUNTIME_NAME,
};

use super::{AttributeSet, DetectError, Detector};

/// Detect the pid, executable and command line of the running process.
pub struct ProcessDetector;

#[async_trait]
impl Detector for ProcessDetector {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn detect(&self) -> Result<AttributeSet, DetectError> {
        let mut attributes =
            AttributeSet::from(&ProcessResourceDetector.detect(Duration::ZERO))
                .with(PROCESS_RUNTIME_NAME, "rustc");

        if let Ok(exe) = current_exe() {
            attributes.insert_opt(
                PROCESS_EXECUTABLE_NAME,
                exe.file_name().map(|n| n.to_string_lossy().into_owned()),
            );
            attributes.insert(
                PROCESS_EXECUTABLE_PATH,
                exe.to_string_lossy().into_owned(),
            );
        }
        Ok(attributes)
    }
}
