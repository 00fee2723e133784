//! Container resource detector
//!
//! Detect the container id from the process cgroup membership.
use std::path::PathBuf;

use async_trait::async_trait;
use opentelemetry_semantic_conventions::resource::CONTAINER_ID;

use super::{AttributeSet, DetectError, Detector};

const CGROUP_V1_PATH: &str = "/proc/self/cgroup";
const CGROUP_V2_PATH: &str = "/proc/self/mountinfo";
const CONTAINER_ID_LEN: usize = 64;

/// Detect `container.id`.
///
/// cgroup v1 exposes the id as the last segment of each `/proc/self/cgroup`
/// line, optionally wrapped as `docker-<id>.scope` or `cri-containerd-<id>`.
/// cgroup v2 only leaks it through the `hostname` bind mount listed in
/// `/proc/self/mountinfo`.
pub struct ContainerDetector {
    cgroup_v1_path: PathBuf,
    cgroup_v2_path: PathBuf,
}

impl ContainerDetector {
    pub fn with_paths(cgroup_v1_path: impl Into<PathBuf>, cgroup_v2_path: impl Into<PathBuf>) -> Self {
        Self {
            cgroup_v1_path: cgroup_v1_path.into(),
            cgroup_v2_path: cgroup_v2_path.into(),
        }
    }

    async fn container_id(&self) -> Option<String> {
        if let Ok(contents) = tokio::fs::read_to_string(&self.cgroup_v1_path).await {
            if let Some(id) = container_id_from_cgroup(&contents) {
                return Some(id);
            }
        }
        let contents = tokio::fs::read_to_string(&self.cgroup_v2_path).await.ok()?;
        container_id_from_mountinfo(&contents)
    }
}

impl Default for ContainerDetector {
    fn default() -> Self {
        Self::with_paths(CGROUP_V1_PATH, CGROUP_V2_PATH)
    }
}

#[async_trait]
impl Detector for ContainerDetector {
    fn name(&self) -> &'static str {
        "container"
    }

    async fn detect(&self) -> Result<AttributeSet, DetectError> {
        self.container_id()
            .await
            .map(|id| AttributeSet::new().with(CONTAINER_ID, id))
            .ok_or(DetectError::NotApplicable("a container"))
    }
}

/// Container id of the current process, if any, from the default cgroup files.
pub(crate) async fn current_container_id() -> Option<String> {
    ContainerDetector::default().container_id().await
}

fn container_id_from_cgroup(contents: &str) -> Option<String> {
    contents.lines().find_map(|line| {
        let last = line.trim().rsplit('/').next()?;
        let last = last.strip_suffix(".scope").unwrap_or(last);
        let candidate = last.rsplit('-').next().unwrap_or(last);
        is_container_id(candidate).then(|| candidate.to_owned())
    })
}

fn container_id_from_mountinfo(contents: &str) -> Option<String> {
    contents
        .lines()
        .filter(|line| line.contains("hostname"))
        .find_map(|line| {
            line.split('/')
                .find(|segment| is_container_id(segment))
                .map(str::to_owned)
        })
}

fn is_container_id(s: &str) -> bool {
    s.len() == CONTAINER_ID_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::Value;
    use std::io::Write;

    const ID: &str = "a8493b8a4f6f23b65c5db50e4d5f1b9d0e3b3a4d1e6f8c9b7a6d5e4f3c2b1a09";

    #[test]
    fn cgroup_v1_plain_docker() {
        let contents = format!("12:pids:/docker/{ID}\n11:memory:/docker/{ID}\n");
        assert_eq!(container_id_from_cgroup(&contents).as_deref(), Some(ID));
    }

    #[test]
    fn cgroup_v1_systemd_scope() {
        let contents = format!("1:name=systemd:/system.slice/docker-{ID}.scope\n");
        assert_eq!(container_id_from_cgroup(&contents).as_deref(), Some(ID));
    }

    #[test]
    fn cgroup_v1_cri_containerd() {
        let contents = format!(
            "0::/kubepods/besteffort/pod5f2c/cri-containerd-{ID}\n"
        );
        assert_eq!(container_id_from_cgroup(&contents).as_deref(), Some(ID));
    }

    #[test]
    fn cgroup_v2_root_has_no_id() {
        assert_eq!(container_id_from_cgroup("0::/\n"), None);
    }

    #[test]
    fn mountinfo_hostname_mount() {
        let contents = format!(
            "736 709 0:46 / / rw,relatime - overlay overlay rw\n\
             760 736 254:1 /var/lib/docker/containers/{ID}/hostname /etc/hostname rw - ext4 /dev/vda1 rw\n"
        );
        assert_eq!(container_id_from_mountinfo(&contents).as_deref(), Some(ID));
    }

    #[test]
    fn rejects_short_or_non_hex_ids() {
        assert!(!is_container_id("abc123"));
        assert!(!is_container_id(&"z".repeat(64)));
        assert!(is_container_id(ID));
    }

    #[tokio::test]
    async fn detect_reads_files() {
        let dir = std::env::temp_dir().join(format!("container-detector-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let v1 = dir.join("cgroup");
        let mut f = std::fs::File::create(&v1).unwrap();
        writeln!(f, "0::/").unwrap();
        let v2 = dir.join("mountinfo");
        let mut f = std::fs::File::create(&v2).unwrap();
        writeln!(f, "760 736 254:1 /var/lib/docker/containers/{ID}/hostname /etc/hostname rw").unwrap();

        let attrs = ContainerDetector::with_paths(&v1, &v2).detect().await.unwrap();
        assert_eq!(attrs.get(CONTAINER_ID), Some(&Value::from(ID.to_string())));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn missing_files_mean_not_a_container() {
        let err = ContainerDetector::with_paths("/nonexistent/cgroup", "/nonexistent/mountinfo")
            .detect()
            .await
            .unwrap_err();
        assert!(matches!(err, DetectError::NotApplicable(_)));
    }
}
