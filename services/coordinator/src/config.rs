//! Configuration for the migration coordinator.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::coordinator::DEFAULT_RUNTIME_SCHEME;
use crate::pods::{
    BackoffPolicy, ImagePullPolicy, KubeConfig, PodDefaults, ReadyPolicy, MAX_READY_TIMEOUT,
};

/// Coordinator configuration (env-driven).
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the control surface listens on.
    pub listen_addr: SocketAddr,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Executable that checkpoints a workload.
    pub checkpoint_cmd: PathBuf,

    /// Executable that restores a checkpointed container.
    pub restore_cmd: PathBuf,

    /// Pod names, namespace and image used by every migration.
    pub pods: PodDefaults,

    /// Engine scheme stripped from runtime container ids.
    pub runtime_scheme: String,

    /// How long and how often to poll for the destination pod.
    pub ready: ReadyPolicy,

    /// Timeout for outbound HTTP requests (control plane and peer).
    pub http_timeout: Duration,

    pub kube: KubeConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let listen_addr: SocketAddr = std::env::var("WORMHOLE_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .context("WORMHOLE_LISTEN_ADDR must be a socket address (host:port).")?;

        let log_level = std::env::var("WORMHOLE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let checkpoint_cmd = std::env::var("WORMHOLE_CHECKPOINT_CMD")
            .unwrap_or_else(|_| "./checkpoint.sh".to_string())
            .into();
        let restore_cmd = std::env::var("WORMHOLE_RESTORE_CMD")
            .unwrap_or_else(|_| "./restore.sh".to_string())
            .into();

        let defaults = PodDefaults::default();
        let image_pull_policy = match std::env::var("WORMHOLE_IMAGE_PULL_POLICY") {
            Ok(v) => v.parse::<ImagePullPolicy>().map_err(|e| {
                anyhow!("WORMHOLE_IMAGE_PULL_POLICY must be Always, IfNotPresent or Never ({e}).")
            })?,
            Err(_) => defaults.image_pull_policy,
        };
        let pods = PodDefaults {
            namespace: env_or("WORMHOLE_NAMESPACE", defaults.namespace),
            source_pod: env_or("WORMHOLE_SOURCE_POD", defaults.source_pod),
            target_pod: env_or("WORMHOLE_TARGET_POD", defaults.target_pod),
            container_name: env_or("WORMHOLE_CONTAINER_NAME", defaults.container_name),
            image: env_or("WORMHOLE_IMAGE", defaults.image),
            image_pull_policy,
        };

        let runtime_scheme = env_or("WORMHOLE_RUNTIME_SCHEME", DEFAULT_RUNTIME_SCHEME.to_string());

        let ready_timeout_secs: u64 = std::env::var("WORMHOLE_READY_TIMEOUT_SECS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("WORMHOLE_READY_TIMEOUT_SECS must be an integer (seconds).")?
            .unwrap_or(120);

        let poll_base_ms: u64 = std::env::var("WORMHOLE_POLL_BASE_MS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("WORMHOLE_POLL_BASE_MS must be an integer (milliseconds).")?
            .unwrap_or(200);

        let poll_max_ms: u64 = std::env::var("WORMHOLE_POLL_MAX_MS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("WORMHOLE_POLL_MAX_MS must be an integer (milliseconds).")?
            .unwrap_or(5000);

        let ready = ReadyPolicy {
            timeout: Duration::from_secs(ready_timeout_secs.max(1)).min(MAX_READY_TIMEOUT),
            backoff: BackoffPolicy {
                base: Duration::from_millis(poll_base_ms.max(10)),
                max: Duration::from_millis(poll_max_ms.max(poll_base_ms)),
                ..BackoffPolicy::default()
            },
        };

        let http_timeout_secs: u64 = std::env::var("WORMHOLE_HTTP_TIMEOUT_SECS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("WORMHOLE_HTTP_TIMEOUT_SECS must be an integer (seconds).")?
            .unwrap_or(120);

        let kube = KubeConfig {
            api_url: std::env::var("WORMHOLE_KUBE_API_URL")
                .ok()
                .filter(|v| !v.is_empty()),
            token: std::env::var("WORMHOLE_KUBE_TOKEN")
                .ok()
                .filter(|v| !v.is_empty()),
        };

        Ok(Self {
            listen_addr,
            log_level,
            checkpoint_cmd,
            restore_cmd,
            pods,
            runtime_scheme,
            ready,
            http_timeout: Duration::from_secs(http_timeout_secs.max(1)),
            kube,
        })
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}
