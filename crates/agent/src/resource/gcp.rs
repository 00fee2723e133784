//! GCP resource detector
//!
//! Reads the Compute Engine metadata server. On GKE the same server also
//! exposes the cluster name as an instance attribute.
use std::env;

use async_trait::async_trait;
use opentelemetry_semantic_conventions::resource::{
    CLOUD_ACCOUNT_ID, CLOUD_AVAILABILITY_ZONE, CLOUD_PLATFORM, CLOUD_PROVIDER, CLOUD_REGION,
    HOST_ID, HOST_NAME, K8S_CLUSTER_NAME,
};

use super::metadata::MetadataClient;
use super::{AttributeSet, DetectError, Detector};

const ENDPOINT: &str = "http://metadata.google.internal";
const METADATA_FLAVOR: (&str, &str) = ("Metadata-Flavor", "Google");

const PROJECT_ID_PATH: &str = "/computeMetadata/v1/project/project-id";
const INSTANCE_ID_PATH: &str = "/computeMetadata/v1/instance/id";
const INSTANCE_ZONE_PATH: &str = "/computeMetadata/v1/instance/zone";
const INSTANCE_NAME_PATH: &str = "/computeMetadata/v1/instance/name";
const CLUSTER_NAME_PATH: &str = "/computeMetadata/v1/instance/attributes/cluster-name";

const KUBERNETES_SERVICE_HOST: &str = "KUBERNETES_SERVICE_HOST";

pub struct GcpDetector {
    client: MetadataClient,
    in_kubernetes: bool,
}

impl GcpDetector {
    pub fn with_endpoint(endpoint: impl Into<String>, in_kubernetes: bool) -> Self {
        Self {
            client: MetadataClient::new(endpoint),
            in_kubernetes,
        }
    }

    async fn read(&self, path: &str) -> Result<String, DetectError> {
        self.client
            .get(path, &[METADATA_FLAVOR])
            .await
            .map(|body| body.trim().to_owned())
    }
}

impl Default for GcpDetector {
    fn default() -> Self {
        Self::with_endpoint(ENDPOINT, env::var_os(KUBERNETES_SERVICE_HOST).is_some())
    }
}

#[async_trait]
impl Detector for GcpDetector {
    fn name(&self) -> &'static str {
        "gcp"
    }

    async fn detect(&self) -> Result<AttributeSet, DetectError> {
        let project_id = self.read(PROJECT_ID_PATH).await?;
        let (instance_id, zone, instance_name) = tokio::try_join!(
            self.read(INSTANCE_ID_PATH),
            self.read(INSTANCE_ZONE_PATH),
            self.read(INSTANCE_NAME_PATH),
        )?;

        // projects/<number>/zones/<zone>
        let zone = zone.rsplit('/').next().unwrap_or_default().to_owned();
        let mut attributes = AttributeSet::new()
            .with(CLOUD_PROVIDER, "gcp")
            .with(CLOUD_ACCOUNT_ID, project_id)
            .with(HOST_ID, instance_id)
            .with(HOST_NAME, instance_name);
        attributes.insert_opt(CLOUD_REGION, region_from_zone(&zone));
        if !zone.is_empty() {
            attributes.insert(CLOUD_AVAILABILITY_ZONE, zone);
        }

        if self.in_kubernetes {
            attributes.insert(CLOUD_PLATFORM, "gcp_kubernetes_engine");
            attributes.insert_opt(
                K8S_CLUSTER_NAME,
                self.read(CLUSTER_NAME_PATH)
                    .await
                    .ok()
                    .filter(|name| !name.is_empty()),
            );
        } else {
            attributes.insert(CLOUD_PLATFORM, "gcp_compute_engine");
        }
        Ok(attributes)
    }
}

/// `us-central1-a` → `us-central1`.
fn region_from_zone(zone: &str) -> Option<String> {
    zone.rsplit_once('-').map(|(region, _)| region.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::test_support::serve;
    use axum::{
        http::{HeaderMap, StatusCode},
        routing::get,
        Router,
    };
    use opentelemetry::Value;

    fn flavored(body: &'static str) -> axum::routing::MethodRouter {
        get(move |headers: HeaderMap| async move {
            match headers.get(METADATA_FLAVOR.0) {
                Some(v) if v == METADATA_FLAVOR.1 => (StatusCode::OK, body),
                _ => (StatusCode::FORBIDDEN, ""),
            }
        })
    }

    fn metadata_router() -> Router {
        Router::new()
            .route(PROJECT_ID_PATH, flavored("my-project"))
            .route(INSTANCE_ID_PATH, flavored("4520031799277581759"))
            .route(INSTANCE_ZONE_PATH, flavored("projects/123456/zones/us-central1-a"))
            .route(INSTANCE_NAME_PATH, flavored("gke-node-1\n"))
            .route(CLUSTER_NAME_PATH, flavored("prod-cluster"))
    }

    #[test]
    fn region_is_zone_without_suffix() {
        assert_eq!(region_from_zone("europe-west1-b").as_deref(), Some("europe-west1"));
        assert_eq!(region_from_zone("nozone"), None);
    }

    #[tokio::test]
    async fn detects_compute_engine() {
        let detector = GcpDetector::with_endpoint(serve(metadata_router()).await, false);
        let attrs = detector.detect().await.unwrap();

        assert_eq!(attrs.get(CLOUD_PROVIDER), Some(&Value::from("gcp")));
        assert_eq!(attrs.get(CLOUD_PLATFORM), Some(&Value::from("gcp_compute_engine")));
        assert_eq!(attrs.get(CLOUD_ACCOUNT_ID), Some(&Value::from("my-project")));
        assert_eq!(attrs.get(HOST_ID), Some(&Value::from("4520031799277581759")));
        assert_eq!(attrs.get(HOST_NAME), Some(&Value::from("gke-node-1")));
        assert_eq!(attrs.get(CLOUD_AVAILABILITY_ZONE), Some(&Value::from("us-central1-a")));
        assert_eq!(attrs.get(CLOUD_REGION), Some(&Value::from("us-central1")));
        assert_eq!(attrs.get(K8S_CLUSTER_NAME), None);
    }

    #[tokio::test]
    async fn detects_kubernetes_engine_cluster() {
        let detector = GcpDetector::with_endpoint(serve(metadata_router()).await, true);
        let attrs = detector.detect().await.unwrap();

        assert_eq!(attrs.get(CLOUD_PLATFORM), Some(&Value::from("gcp_kubernetes_engine")));
        assert_eq!(attrs.get(K8S_CLUSTER_NAME), Some(&Value::from("prod-cluster")));
    }

    #[tokio::test]
    async fn missing_flavor_header_is_rejected() {
        let router = Router::new().route(
            PROJECT_ID_PATH,
            get(|| async { (StatusCode::FORBIDDEN, "") }),
        );
        let detector = GcpDetector::with_endpoint(serve(router).await, false);
        assert!(matches!(
            detector.detect().await,
            Err(DetectError::Status { status: 403, .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_metadata_server_fails() {
        let detector = GcpDetector::with_endpoint("http://127.0.0.1:1", false);
        assert!(matches!(detector.detect().await, Err(DetectError::Http { .. })));
    }
}
