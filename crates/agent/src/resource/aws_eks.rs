//! AWS EKS resource detector
//!
//! Runs only inside a Kubernetes pod with a mounted service-account token.
//! The `kube-system/aws-auth` config map marks the cluster as EKS; the
//! CloudWatch agent's `cluster-info` config map carries the cluster name.
use std::collections::HashMap;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::{Connect, HttpConnector};
use opentelemetry_semantic_conventions::resource::{
    CLOUD_PLATFORM, CLOUD_PROVIDER, CONTAINER_ID, K8S_CLUSTER_NAME,
};
use rustls::{ClientConfig, RootCertStore};
use serde::Deserialize;
use tracing::debug;

use super::container::current_container_id;
use super::metadata::MetadataClient;
use super::{AttributeSet, DetectError, Detector};

const TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
const CA_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";
const API_ENDPOINT: &str = "https://kubernetes.default.svc";

const AWS_AUTH_PATH: &str = "/api/v1/namespaces/kube-system/configmaps/aws-auth";
const CLUSTER_INFO_PATH: &str = "/api/v1/namespaces/amazon-cloudwatch/configmaps/cluster-info";
const CLUSTER_NAME_KEY: &str = "cluster.name";

#[derive(Debug, Deserialize)]
struct ConfigMap {
    #[serde(default)]
    data: HashMap<String, String>,
}

pub struct AwsEksDetector {
    token_path: PathBuf,
    ca_path: PathBuf,
    api_endpoint: String,
}

impl AwsEksDetector {
    pub fn with_paths(
        token_path: impl Into<PathBuf>,
        ca_path: impl Into<PathBuf>,
        api_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            token_path: token_path.into(),
            ca_path: ca_path.into(),
            api_endpoint: api_endpoint.into(),
        }
    }

    async fn api_client(&self) -> Result<MetadataClient<HttpsConnector<HttpConnector>>, DetectError> {
        let ca = tokio::fs::read(&self.ca_path).await?;
        let mut roots = RootCertStore::empty();
        let certs = rustls_pemfile::certs(&mut BufReader::new(ca.as_slice()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DetectError::Tls(format!("failed to parse CA bundle: {e}")))?;
        let (added, _) = roots.add_parsable_certificates(certs);
        if added == 0 {
            return Err(DetectError::Tls("no usable certificate in CA bundle".into()));
        }

        let config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(|e| DetectError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();

        let connector = HttpsConnectorBuilder::new()
            .with_tls_config(config)
            .https_only()
            .enable_http1()
            .build();
        Ok(MetadataClient::with_connector(&self.api_endpoint, connector))
    }
}

impl Default for AwsEksDetector {
    fn default() -> Self {
        Self::with_paths(TOKEN_PATH, CA_PATH, API_ENDPOINT)
    }
}

#[async_trait]
impl Detector for AwsEksDetector {
    fn name(&self) -> &'static str {
        "aws-eks"
    }

    async fn detect(&self) -> Result<AttributeSet, DetectError> {
        let token = match tokio::fs::read_to_string(&self.token_path).await {
            Ok(token) => token,
            Err(_) => return Err(DetectError::NotApplicable("a Kubernetes pod")),
        };
        let client = self.api_client().await?;
        let mut attributes = detect_with_client(&client, token.trim()).await?;
        attributes.insert_opt(CONTAINER_ID, current_container_id().await);
        Ok(attributes)
    }
}

/// Query the Kubernetes API server behind `client` with a bearer `token`.
async fn detect_with_client<C>(
    client: &MetadataClient<C>,
    token: &str,
) -> Result<AttributeSet, DetectError>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    let authorization = format!("Bearer {token}");
    let headers = [("Authorization", authorization.as_str())];

    if let Err(e) = client.get(AWS_AUTH_PATH, &headers).await {
        debug!(error = %e, "aws-auth config map not readable");
        return Err(DetectError::NotApplicable("an EKS cluster"));
    }

    let mut attributes = AttributeSet::new()
        .with(CLOUD_PROVIDER, "aws")
        .with(CLOUD_PLATFORM, "aws_eks");

    let cluster_name = match client.get(CLUSTER_INFO_PATH, &headers).await {
        Ok(body) => cluster_name_from_configmap(&body).unwrap_or_else(|e| {
            debug!(error = %e, "cluster-info config map is malformed");
            None
        }),
        Err(e) => {
            debug!(error = %e, "cluster-info config map not readable");
            None
        }
    };
    attributes.insert_opt(K8S_CLUSTER_NAME, cluster_name);
    Ok(attributes)
}

fn cluster_name_from_configmap(body: &str) -> Result<Option<String>, DetectError> {
    let config_map: ConfigMap = serde_json::from_str(body)?;
    Ok(config_map
        .data
        .get(CLUSTER_NAME_KEY)
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty()))
}
