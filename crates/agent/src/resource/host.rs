//! HOST resource detector
//!
//! Detect the host name, architecture and unique host ID.
use std::env::consts::ARCH;
use std::path::PathBuf;

use async_trait::async_trait;
use opentelemetry_semantic_conventions::resource::{HOST_ARCH, HOST_ID, HOST_NAME};
use tracing::debug;

use super::{AttributeSet, DetectError, Detector};

/// Detect host information.
///
/// The host id is looked up using the sources defined in the OpenTelemetry
/// semantic conventions for non-containerized systems. Only Linux has a
/// machine-id file; other platforms report no `host.id`.
pub struct HostDetector {
    machine_id_paths: Vec<PathBuf>,
}

impl HostDetector {
    /// Read `host.id` from the first readable, non-blank file in `paths`.
    pub fn with_machine_id_paths(paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            machine_id_paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    async fn host_id(&self) -> Option<String> {
        for path in &self.machine_id_paths {
            match tokio::fs::read_to_string(path).await {
                Ok(id) if !id.trim().is_empty() => return Some(id.trim().to_owned()),
                Ok(_) => debug!(path = %path.display(), "machine id file is empty"),
                Err(e) => debug!(path = %path.display(), error = %e, "machine id not readable"),
            }
        }
        None
    }
}

impl Default for HostDetector {
    fn default() -> Self {
        if cfg!(target_os = "linux") {
            Self::with_machine_id_paths(["/etc/machine-id", "/var/lib/dbus/machine-id"])
        } else {
            Self::with_machine_id_paths(Vec::<PathBuf>::new())
        }
    }
}

#[async_trait]
impl Detector for HostDetector {
    fn name(&self) -> &'static str {
        "host"
    }

    async fn detect(&self) -> Result<AttributeSet, DetectError> {
        let mut attributes = AttributeSet::new().with(HOST_ARCH, host_arch(ARCH));
        attributes.insert_opt(HOST_NAME, host_name().await);
        attributes.insert_opt(HOST_ID, self.host_id().await);
        Ok(attributes)
    }
}

async fn host_name() -> Option<String> {
    tokio::task::spawn_blocking(nix::unistd::gethostname)
        .await
        .ok()?
        .ok()?
        .into_string()
        .ok()
}

/// Map Rust's architecture names onto the `host.arch` well-known values.
fn host_arch(arch: &'static str) -> &'static str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "x86",
        "arm" => "arm32",
        "powerpc" => "ppc32",
        "powerpc64" => "ppc64",
        "s390x" => "s390x",
        "ia64" => "ia64",
        other => other,
    }
}
