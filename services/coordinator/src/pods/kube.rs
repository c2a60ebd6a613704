//! Kubernetes API backend for the pod lifecycle client.
//!
//! Talks to the core v1 pods endpoints:
//! - `GET    /api/v1/namespaces/{ns}/pods/{name}`
//! - `POST   /api/v1/namespaces/{ns}/pods`
//! - `DELETE /api/v1/namespaces/{ns}/pods/{name}`
//!
//! Inside a cluster the API server address, CA bundle and service-account
//! token are discovered from the pod environment. Outside a cluster an
//! explicit API URL (for example a local `kubectl proxy`) can be supplied.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, error};

use super::{Pod, PodApi, PodError, PodOperation};

/// Mount point of the service-account credentials in every pod.
const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// How to reach the Kubernetes API.
#[derive(Debug, Clone, Default)]
pub struct KubeConfig {
    /// Explicit API base URL. When unset, in-cluster discovery is used.
    pub api_url: Option<String>,

    /// Static bearer token sent with requests to `api_url`.
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
enum Credentials {
    Anonymous,
    Static(String),
    /// Projected tokens are rotated on disk, so the file is read per request.
    TokenFile(PathBuf),
}

/// Kubernetes API client.
pub struct KubeClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

impl KubeClient {
    pub fn new(config: &KubeConfig, timeout: Duration) -> Result<Self, PodError> {
        match &config.api_url {
            Some(url) => Self::with_base_url(url, config.token.clone(), timeout),
            None => Self::in_cluster(timeout),
        }
    }

    /// Client for an explicitly addressed API server.
    pub fn with_base_url(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, PodError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: token.map_or(Credentials::Anonymous, Credentials::Static),
        })
    }

    /// Client using the service account this process runs as.
    pub fn in_cluster(timeout: Duration) -> Result<Self, PodError> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| {
            PodError::Credentials(
                "KUBERNETES_SERVICE_HOST is not set (not running inside a cluster?)".to_string(),
            )
        })?;
        let port =
            std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());

        let dir = Path::new(SERVICE_ACCOUNT_DIR);
        let ca_path = dir.join("ca.crt");
        let ca = std::fs::read(&ca_path).map_err(|e| {
            PodError::Credentials(format!("failed to read {}: {e}", ca_path.display()))
        })?;

        let token_path = dir.join("token");
        if !token_path.exists() {
            return Err(PodError::Credentials(format!(
                "service account token not found at {}",
                token_path.display()
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .add_root_certificate(reqwest::Certificate::from_pem(&ca)?)
            .build()?;

        // IPv6 service hosts need brackets in the authority
        let base_url = if host.contains(':') {
            format!("https://[{host}]:{port}")
        } else {
            format!("https://{host}:{port}")
        };

        Ok(Self {
            client,
            base_url,
            credentials: Credentials::TokenFile(token_path),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn pods_url(&self, namespace: &str) -> String {
        format!("{}/api/v1/namespaces/{}/pods", self.base_url, namespace)
    }

    fn pod_url(&self, namespace: &str, name: &str) -> String {
        format!("{}/{}", self.pods_url(namespace), name)
    }

    async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, PodError> {
        let token = match &self.credentials {
            Credentials::Anonymous => return Ok(request),
            Credentials::Static(token) => token.clone(),
            Credentials::TokenFile(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|e| {
                    PodError::Credentials(format!("failed to read {}: {e}", path.display()))
                })?
                .trim()
                .to_string(),
        };
        Ok(request.bearer_auth(token))
    }

    async fn rejection(operation: PodOperation, response: reqwest::Response) -> PodError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!(operation = %operation, status = %status, body = %body, "Control plane request failed");
        PodError::Api {
            operation,
            status: status.as_u16(),
            body,
        }
    }
}

#[async_trait]
impl PodApi for KubeClient {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, PodError> {
        let url = self.pod_url(namespace, name);
        debug!(url = %url, "Fetching pod");

        let response = self.authorize(self.client.get(&url)).await?.send().await?;

        if !response.status().is_success() {
            return Err(Self::rejection(PodOperation::Get, response).await);
        }

        Ok(response.json().await?)
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, PodError> {
        let url = self.pods_url(namespace);
        debug!(url = %url, pod = %pod.metadata.name, "Creating pod");

        let response = self
            .authorize(self.client.post(&url).json(pod))
            .await?
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::rejection(PodOperation::Create, response).await);
        }

        Ok(response.json().await?)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), PodError> {
        let url = self.pod_url(namespace, name);
        debug!(url = %url, "Deleting pod");

        let response = self
            .authorize(self.client.delete(&url))
            .await?
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(namespace = %namespace, pod = %name, "Pod already absent");
            return Ok(());
        }

        if !response.status().is_success() {
            return Err(Self::rejection(PodOperation::Delete, response).await);
        }

        Ok(())
    }
}
