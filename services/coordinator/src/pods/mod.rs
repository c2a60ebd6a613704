//! Pod lifecycle client.
//!
//! Wraps the three control-plane primitives the migration needs:
//! - deleting the source workload pod
//! - creating the destination pod from a template
//! - waiting for a pod to reach a lifecycle phase
//!
//! The control plane itself sits behind the [`PodApi`] trait. The production
//! backend is [`kube::KubeClient`]; [`mock::MockPodApi`] scripts phase
//! sequences for tests.

pub mod kube;
pub mod mock;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub use kube::{KubeClient, KubeConfig};
pub use mock::{MockPodApi, PodCall};

// =============================================================================
// Resource Model
// =============================================================================

/// Coarse pod lifecycle state reported by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PodPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    #[serde(other)]
    Unknown,
}

impl PodPhase {
    /// A pod in a terminal phase never moves to another phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, PodPhase::Succeeded | PodPhase::Failed)
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PodPhase::Pending => write!(f, "Pending"),
            PodPhase::Running => write!(f, "Running"),
            PodPhase::Succeeded => write!(f, "Succeeded"),
            PodPhase::Failed => write!(f, "Failed"),
            PodPhase::Unknown => write!(f, "Unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImagePullPolicy {
    Always,
    #[default]
    IfNotPresent,
    Never,
}

impl FromStr for ImagePullPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Always" => Ok(Self::Always),
            "IfNotPresent" => Ok(Self::IfNotPresent),
            "Never" => Ok(Self::Never),
            other => Err(format!("unknown image pull policy: {other}")),
        }
    }
}

/// Pod resource, limited to the fields the coordinator reads or writes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<PodSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PodStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    pub containers: Vec<Container>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<ImagePullPolicy>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<PodPhase>,
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerStatus {
    #[serde(default)]
    pub name: String,
    /// Runtime-assigned id, prefixed with the engine scheme
    /// (example: `containerd://0f3c...`). Absent until the container starts.
    #[serde(rename = "containerID", default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
}

impl Pod {
    /// Observed phase; a pod without status yet is pending.
    pub fn phase(&self) -> PodPhase {
        self.status
            .as_ref()
            .and_then(|s| s.phase)
            .unwrap_or(PodPhase::Pending)
    }

    pub fn first_container_status(&self) -> Option<&ContainerStatus> {
        self.status
            .as_ref()
            .and_then(|s| s.container_statuses.first())
    }

    pub fn node_name(&self) -> Option<&str> {
        self.spec.as_ref().and_then(|s| s.node_name.as_deref())
    }
}

// =============================================================================
// Templates
// =============================================================================

/// Fixed pod settings used for every migration.
#[derive(Debug, Clone)]
pub struct PodDefaults {
    /// Namespace of both the source and destination pods.
    pub namespace: String,
    /// Well-known name of the workload pod deleted on the source.
    pub source_pod: String,
    /// Name of the pod created on the destination node.
    pub target_pod: String,
    pub container_name: String,
    pub image: String,
    pub image_pull_policy: ImagePullPolicy,
}

impl Default for PodDefaults {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            source_pod: "workload".to_string(),
            target_pod: "restored".to_string(),
            container_name: "workload".to_string(),
            image: "nikolabo/alpineio".to_string(),
            image_pull_policy: ImagePullPolicy::IfNotPresent,
        }
    }
}

impl PodDefaults {
    /// Build the destination pod template pinned to `target_node`.
    pub fn template_for(&self, target_node: &str) -> PodTemplate {
        PodTemplate {
            name: self.target_pod.clone(),
            namespace: self.namespace.clone(),
            container_name: self.container_name.clone(),
            image: self.image.clone(),
            image_pull_policy: self.image_pull_policy,
            target_node: target_node.to_string(),
        }
    }
}

/// Single-container pod bound to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodTemplate {
    pub name: String,
    pub namespace: String,
    pub container_name: String,
    pub image: String,
    pub image_pull_policy: ImagePullPolicy,
    pub target_node: String,
}

impl PodTemplate {
    /// Render the pod manifest sent to the control plane.
    pub fn to_pod(&self) -> Pod {
        Pod {
            api_version: Some("v1".to_string()),
            kind: Some("Pod".to_string()),
            metadata: ObjectMeta {
                name: self.name.clone(),
                namespace: self.namespace.clone(),
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: self.container_name.clone(),
                    image: self.image.clone(),
                    image_pull_policy: Some(self.image_pull_policy),
                }],
                node_name: Some(self.target_node.clone()),
            }),
            status: None,
        }
    }
}

// =============================================================================
// Control Plane Interface
// =============================================================================

/// Control-plane pod operation, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodOperation {
    Get,
    Create,
    Delete,
}

impl fmt::Display for PodOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PodOperation::Get => write!(f, "get"),
            PodOperation::Create => write!(f, "create"),
            PodOperation::Delete => write!(f, "delete"),
        }
    }
}

/// Errors from control-plane calls.
#[derive(Debug, Error)]
pub enum PodError {
    #[error("control plane request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("control plane rejected {operation} with {status}: {body}")]
    Api {
        operation: PodOperation,
        status: u16,
        body: String,
    },

    #[error("control plane credentials unavailable: {0}")]
    Credentials(String),
}

/// Control-plane pod primitives.
#[async_trait]
pub trait PodApi: Send + Sync {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, PodError>;

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, PodError>;

    /// Delete a pod. A pod that does not exist counts as deleted.
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), PodError>;
}

// =============================================================================
// Readiness Policy
// =============================================================================

/// Exponential backoff configuration.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the second poll.
    pub base: Duration,

    /// Maximum delay between polls.
    pub max: Duration,

    /// Jitter factor (0.0 to 1.0).
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(200),
            max: Duration::from_secs(5),
            jitter: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// Calculate delay for the given attempt number.
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = self.base.as_millis() as f64 * 2.0_f64.powi(attempt.min(31) as i32);
        let delay = delay.min(self.max.as_millis() as f64);

        let jitter = delay * self.jitter.clamp(0.0, 1.0) * rand::random::<f64>();

        Duration::from_millis((delay + jitter) as u64)
    }
}

/// Longest readiness wait honoured, whatever the configured timeout.
pub const MAX_READY_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Bound on how long to wait for a pod to reach a phase.
#[derive(Debug, Clone)]
pub struct ReadyPolicy {
    pub timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for ReadyPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Errors from waiting on a pod phase.
#[derive(Debug, Error)]
pub enum AwaitError {
    #[error("pod {name} did not reach {target} within {waited:?} (last observed {last})")]
    Timeout {
        name: String,
        target: PodPhase,
        last: PodPhase,
        waited: Duration,
    },

    #[error("pod {name} is {observed}, expected {target}")]
    UnexpectedPhase {
        name: String,
        target: PodPhase,
        observed: PodPhase,
    },

    #[error("failed to fetch pod {name}: {source}")]
    Fetch {
        name: String,
        #[source]
        source: PodError,
    },
}

// =============================================================================
// Lifecycle Client
// =============================================================================

/// Pod operations used by the migration coordinator.
pub struct PodLifecycle {
    api: Arc<dyn PodApi>,
    policy: ReadyPolicy,
}

impl PodLifecycle {
    pub fn new(api: Arc<dyn PodApi>, policy: ReadyPolicy) -> Self {
        Self { api, policy }
    }

    pub async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), PodError> {
        self.api.delete_pod(namespace, name).await?;
        info!(namespace = %namespace, pod = %name, "Pod deleted");
        Ok(())
    }

    pub async fn create_pod(&self, template: &PodTemplate) -> Result<Pod, PodError> {
        let pod = self
            .api
            .create_pod(&template.namespace, &template.to_pod())
            .await?;

        info!(
            namespace = %template.namespace,
            pod = %template.name,
            node = %template.target_node,
            "Pod created"
        );
        Ok(pod)
    }

    /// Poll `pod` until its observed phase equals `target`.
    ///
    /// Returns the pod as last fetched. Gives up with [`AwaitError::Timeout`]
    /// once the policy's timeout elapses, or immediately if the pod settles in
    /// a terminal phase other than `target`.
    pub async fn await_phase(&self, pod: &Pod, target: PodPhase) -> Result<Pod, AwaitError> {
        let namespace = &pod.metadata.namespace;
        let name = &pod.metadata.name;
        let started = Instant::now();
        let deadline = started + self.policy.timeout.min(MAX_READY_TIMEOUT);
        let mut attempt = 0u32;

        loop {
            let current = self
                .api
                .get_pod(namespace, name)
                .await
                .map_err(|source| AwaitError::Fetch {
                    name: name.clone(),
                    source,
                })?;

            let phase = current.phase();
            debug!(pod = %name, phase = %phase, attempt, "Polled pod phase");

            if phase == target {
                info!(
                    pod = %name,
                    phase = %phase,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Pod reached phase"
                );
                return Ok(current);
            }

            if phase.is_terminal() {
                return Err(AwaitError::UnexpectedPhase {
                    name: name.clone(),
                    target,
                    observed: phase,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(pod = %name, last = %phase, target = %target, "Gave up waiting for pod phase");
                return Err(AwaitError::Timeout {
                    name: name.clone(),
                    target,
                    last: phase,
                    waited: started.elapsed(),
                });
            }

            let delay = self.policy.backoff.delay(attempt).min(deadline - now);
            tokio::time::sleep(delay).await;
            attempt = attempt.saturating_add(1);
        }
    }
}
