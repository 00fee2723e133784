//! Alibaba Cloud ECS resource detector
//!
//! Queries the ECS instance metadata service for the instance identity
//! document and hostname.
use async_trait::async_trait;
use opentelemetry_semantic_conventions::resource::{
    CLOUD_ACCOUNT_ID, CLOUD_AVAILABILITY_ZONE, CLOUD_PLATFORM, CLOUD_PROVIDER, CLOUD_REGION,
    HOST_ID, HOST_NAME, HOST_TYPE,
};
use serde::Deserialize;

use super::metadata::MetadataClient;
use super::{AttributeSet, DetectError, Detector};

const ENDPOINT: &str = "http://100.100.100.200";
const IDENTITY_PATH: &str = "/latest/dynamic/instance-identity/document";
const HOSTNAME_PATH: &str = "/latest/meta-data/hostname";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct IdentityDocument {
    owner_account_id: String,
    instance_id: String,
    instance_type: String,
    region_id: String,
    zone_id: String,
}

pub struct AlibabaEcsDetector {
    client: MetadataClient,
}

impl AlibabaEcsDetector {
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            client: MetadataClient::new(endpoint),
        }
    }
}

impl Default for AlibabaEcsDetector {
    fn default() -> Self {
        Self::with_endpoint(ENDPOINT)
    }
}

#[async_trait]
impl Detector for AlibabaEcsDetector {
    fn name(&self) -> &'static str {
        "alibaba-ecs"
    }

    async fn detect(&self) -> Result<AttributeSet, DetectError> {
        let (document, hostname) = tokio::try_join!(
            self.client.get(IDENTITY_PATH, &[]),
            self.client.get(HOSTNAME_PATH, &[]),
        )?;
        let document: IdentityDocument = serde_json::from_str(&document)?;

        Ok(AttributeSet::new()
            .with(CLOUD_PROVIDER, "alibaba_cloud")
            .with(CLOUD_PLATFORM, "alibaba_cloud_ecs")
            .with(CLOUD_ACCOUNT_ID, document.owner_account_id)
            .with(CLOUD_REGION, document.region_id)
            .with(CLOUD_AVAILABILITY_ZONE, document.zone_id)
            .with(HOST_ID, document.instance_id)
            .with(HOST_TYPE, document.instance_type)
            .with(HOST_NAME, hostname.trim().to_owned()))
    }
}
