//! Client for the destination coordinator.
//!
//! The source coordinator hands over to the destination by calling
//! `GET <address>/restore?id=<container id>`. Only reaching the peer matters;
//! its response status is informational.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from notifying the destination coordinator.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("invalid destination address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("could not reach {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Outbound calls to a peer coordinator.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Ask the coordinator at `address` to restore `container_id`.
    ///
    /// Returns the HTTP status the peer answered with.
    async fn notify_restore(&self, address: &str, container_id: &str) -> Result<u16, PeerError>;
}

/// HTTP implementation of [`PeerClient`].
pub struct HttpPeerClient {
    client: reqwest::Client,
}

impl HttpPeerClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

/// Build `<address>/restore?id=<container_id>` with the id query-encoded.
pub fn restore_url(address: &str, container_id: &str) -> Result<reqwest::Url, PeerError> {
    let base = format!("{}/restore", address.trim_end_matches('/'));
    reqwest::Url::parse_with_params(&base, &[("id", container_id)]).map_err(|e| {
        PeerError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        }
    })
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn notify_restore(&self, address: &str, container_id: &str) -> Result<u16, PeerError> {
        let url = restore_url(address, container_id)?;
        debug!(url = %url, "Notifying destination coordinator");

        let response =
            self.client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| PeerError::Transport {
                    url: url.to_string(),
                    source: Box::new(e),
                })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.is_success() {
            info!(status = %status, body = %body.trim_end(), "Destination acknowledged restore");
        } else {
            warn!(status = %status, body = %body.trim_end(), "Destination answered restore with an error status");
        }

        Ok(status.as_u16())
    }
}

/// Mock peer that records notifications.
pub struct MockPeer {
    notifications: Mutex<Vec<(String, String)>>,
    unreachable: bool,
}

impl MockPeer {
    pub fn new() -> Self {
        Self {
            notifications: Mutex::new(Vec::new()),
            unreachable: false,
        }
    }

    /// Create a mock peer that can never be reached.
    pub fn unreachable() -> Self {
        Self {
            notifications: Mutex::new(Vec::new()),
            unreachable: true,
        }
    }

    /// `(address, container_id)` pairs, in call order.
    pub fn notifications(&self) -> Vec<(String, String)> {
        self.notifications
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }
}

impl Default for MockPeer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerClient for MockPeer {
    async fn notify_restore(&self, address: &str, container_id: &str) -> Result<u16, PeerError> {
        let url = restore_url(address, container_id)?;

        if let Ok(mut notifications) = self.notifications.lock() {
            notifications.push((address.to_string(), container_id.to_string()));
        }

        if self.unreachable {
            return Err(PeerError::Transport {
                url: url.to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "mock peer unreachable",
                )),
            });
        }
        Ok(200)
    }
}
