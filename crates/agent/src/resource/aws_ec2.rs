//! AWS EC2 resource detector
//!
//! Uses IMDSv2: a session token is requested first and sent with every
//! metadata read.
use async_trait::async_trait;
use opentelemetry_semantic_conventions::resource::{
    CLOUD_ACCOUNT_ID, CLOUD_AVAILABILITY_ZONE, CLOUD_PLATFORM, CLOUD_PROVIDER, CLOUD_REGION,
    HOST_ID, HOST_IMAGE_ID, HOST_NAME, HOST_TYPE,
};
use serde::Deserialize;

use super::metadata::MetadataClient;
use super::{AttributeSet, DetectError, Detector};

const ENDPOINT: &str = "http://169.254.169.254";
const TOKEN_PATH: &str = "/latest/api/token";
const IDENTITY_PATH: &str = "/latest/dynamic/instance-identity/document";
const HOSTNAME_PATH: &str = "/latest/meta-data/hostname";

const TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";
const TOKEN_TTL_SECONDS: &str = "60";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityDocument {
    account_id: String,
    instance_id: String,
    instance_type: String,
    image_id: String,
    region: String,
    availability_zone: String,
}

pub struct AwsEc2Detector {
    client: MetadataClient,
}

impl AwsEc2Detector {
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            client: MetadataClient::new(endpoint),
        }
    }
}

impl Default for AwsEc2Detector {
    fn default() -> Self {
        Self::with_endpoint(ENDPOINT)
    }
}

#[async_trait]
impl Detector for AwsEc2Detector {
    fn name(&self) -> &'static str {
        "aws-ec2"
    }

    async fn detect(&self) -> Result<AttributeSet, DetectError> {
        let token = self
            .client
            .put(TOKEN_PATH, &[(TOKEN_TTL_HEADER, TOKEN_TTL_SECONDS)])
            .await?;
        let headers = [(TOKEN_HEADER, token.trim())];

        let (document, hostname) = tokio::try_join!(
            self.client.get(IDENTITY_PATH, &headers),
            self.client.get(HOSTNAME_PATH, &headers),
        )?;
        let document: IdentityDocument = serde_json::from_str(&document)?;

        Ok(AttributeSet::new()
            .with(CLOUD_PROVIDER, "aws")
            .with(CLOUD_PLATFORM, "aws_ec2")
            .with(CLOUD_ACCOUNT_ID, document.account_id)
            .with(CLOUD_REGION, document.region)
            .with(CLOUD_AVAILABILITY_ZONE, document.availability_zone)
            .with(HOST_ID, document.instance_id)
            .with(HOST_TYPE, document.instance_type)
            .with(HOST_IMAGE_ID, document.image_id)
            .with(HOST_NAME, hostname.trim().to_owned()))
    }
}
