//! Migration coordinator.
//!
//! Drives one migration from the source side:
//!
//! ```text
//! Idle -> Checkpointing -> Rescheduling -> AwaitingReady -> Notifying -> Complete
//!              \                \                \               \
//!               +----------------+----------------+---------------+--> Aborted
//! ```
//!
//! Every phase runs inside the calling request. An abort stops the migration
//! where it is: side effects of completed steps (a deleted source pod, for
//! instance) are not undone, but they are listed in the returned failure.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info};

use crate::invoker::{Checkpointer, InvokeError};
use crate::peer::{PeerClient, PeerError};
use crate::pods::{AwaitError, Pod, PodDefaults, PodError, PodLifecycle, PodPhase};
use crate::registry::{DestinationConfig, DestinationRegistry};

/// Engine scheme used when none is configured.
pub const DEFAULT_RUNTIME_SCHEME: &str = "containerd";

// =============================================================================
// State Machine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    Idle,
    Checkpointing,
    Rescheduling,
    AwaitingReady,
    Notifying,
    Complete,
    Aborted,
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationPhase::Idle => write!(f, "idle"),
            MigrationPhase::Checkpointing => write!(f, "checkpointing"),
            MigrationPhase::Rescheduling => write!(f, "rescheduling"),
            MigrationPhase::AwaitingReady => write!(f, "awaiting_ready"),
            MigrationPhase::Notifying => write!(f, "notifying"),
            MigrationPhase::Complete => write!(f, "complete"),
            MigrationPhase::Aborted => write!(f, "aborted"),
        }
    }
}

/// A side-effecting step that has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStep {
    Checkpoint,
    DeleteSource,
    CreateDestination,
    AwaitReady,
    Notify,
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationStep::Checkpoint => write!(f, "checkpoint"),
            MigrationStep::DeleteSource => write!(f, "delete"),
            MigrationStep::CreateDestination => write!(f, "create"),
            MigrationStep::AwaitReady => write!(f, "ready"),
            MigrationStep::Notify => write!(f, "notify"),
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Errors extracting the runtime container id from a pod.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContainerIdError {
    #[error("pod {pod} reports no container id")]
    NoContainerStatus { pod: String },

    #[error("container id {raw:?} does not start with {scheme}://")]
    MissingScheme { raw: String, scheme: String },

    #[error("container id {raw:?} is empty after {scheme}://")]
    Empty { raw: String, scheme: String },
}

/// Why a migration did not complete.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Destination not configured")]
    NotConfigured,

    #[error("checkpoint failed: {0}")]
    Checkpoint(#[source] InvokeError),

    #[error("destination scheduling failed: could not delete source pod: {0}")]
    DeleteSource(#[source] PodError),

    #[error("destination scheduling failed: could not create destination pod: {0}")]
    CreateDestination(#[source] PodError),

    #[error("destination pod never became ready: {0}")]
    NotReady(#[source] AwaitError),

    #[error("destination pod never became ready: {0}")]
    ContainerId(#[source] ContainerIdError),

    #[error("notification to destination failed: {0}")]
    Notify(#[source] PeerError),
}

/// A migration that ended in [`MigrationPhase::Aborted`] (or never started).
#[derive(Debug, Error)]
#[error("{error}")]
pub struct MigrationFailure {
    #[source]
    pub error: MigrationError,

    /// Final state: [`MigrationPhase::Aborted`], or `Idle` for a migration
    /// that was refused before it started.
    pub phase: MigrationPhase,

    /// Phase that was running when the migration stopped.
    pub failed_in: MigrationPhase,

    /// Steps whose side effects are in place.
    pub completed: Vec<MigrationStep>,
}

impl MigrationFailure {
    /// Comma-separated list of completed steps, empty if none.
    pub fn completed_summary(&self) -> String {
        self.completed
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// =============================================================================
// Container Id Extraction
// =============================================================================

/// Strip the `<scheme>://` engine prefix from a runtime container id.
pub fn extract_container_id(raw: &str, scheme: &str) -> Result<String, ContainerIdError> {
    let prefix = format!("{scheme}://");

    let id = raw
        .strip_prefix(&prefix)
        .ok_or_else(|| ContainerIdError::MissingScheme {
            raw: raw.to_string(),
            scheme: scheme.to_string(),
        })?;

    if id.is_empty() {
        return Err(ContainerIdError::Empty {
            raw: raw.to_string(),
            scheme: scheme.to_string(),
        });
    }

    Ok(id.to_string())
}

/// Bare container id of the pod's first container.
pub fn container_id_of(pod: &Pod, scheme: &str) -> Result<String, ContainerIdError> {
    let raw = pod
        .first_container_status()
        .and_then(|s| s.container_id.as_deref())
        .ok_or_else(|| ContainerIdError::NoContainerStatus {
            pod: pod.metadata.name.clone(),
        })?;

    extract_container_id(raw, scheme)
}

// =============================================================================
// Coordinator
// =============================================================================

/// Outcome of a completed migration.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub workload_id: String,
    pub destination: DestinationConfig,
    pub pod_name: String,
    pub container_id: String,
    /// Status the destination answered the restore call with.
    pub peer_status: u16,
    pub elapsed: Duration,
}

/// Per-request bookkeeping for one migration.
struct Migration<'a> {
    workload_id: &'a str,
    phase: MigrationPhase,
    completed: Vec<MigrationStep>,
}

impl<'a> Migration<'a> {
    fn new(workload_id: &'a str) -> Self {
        Self {
            workload_id,
            phase: MigrationPhase::Idle,
            completed: Vec::new(),
        }
    }

    fn enter(&mut self, phase: MigrationPhase) {
        info!(
            workload_id = %self.workload_id,
            from = %self.phase,
            to = %phase,
            "Migration phase transition"
        );
        self.phase = phase;
    }

    fn done(&mut self, step: MigrationStep) {
        debug!(workload_id = %self.workload_id, step = %step, "Migration step done");
        self.completed.push(step);
    }

    fn abort(self, error: MigrationError) -> MigrationFailure {
        let aborted = MigrationPhase::Aborted;
        error!(
            workload_id = %self.workload_id,
            from = %self.phase,
            to = %aborted,
            error = %error,
            "Migration aborted"
        );
        MigrationFailure {
            error,
            phase: aborted,
            failed_in: self.phase,
            completed: self.completed,
        }
    }

    /// Refuse to start; nothing has run, so the state stays `Idle`.
    fn refuse(self, error: MigrationError) -> MigrationFailure {
        info!(workload_id = %self.workload_id, reason = %error, "Migration not started");
        MigrationFailure {
            error,
            phase: self.phase,
            failed_in: self.phase,
            completed: self.completed,
        }
    }
}

/// Source-side orchestrator of the migration phases.
pub struct MigrationCoordinator {
    registry: Arc<DestinationRegistry>,
    checkpointer: Arc<dyn Checkpointer>,
    pods: PodLifecycle,
    peer: Arc<dyn PeerClient>,
    defaults: PodDefaults,
    runtime_scheme: String,
}

impl MigrationCoordinator {
    pub fn new(
        registry: Arc<DestinationRegistry>,
        checkpointer: Arc<dyn Checkpointer>,
        pods: PodLifecycle,
        peer: Arc<dyn PeerClient>,
        defaults: PodDefaults,
        runtime_scheme: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            checkpointer,
            pods,
            peer,
            defaults,
            runtime_scheme: runtime_scheme.into(),
        }
    }

    pub fn registry(&self) -> &DestinationRegistry {
        &self.registry
    }

    /// Migrate `workload_id` to the configured destination.
    pub async fn migrate(&self, workload_id: &str) -> Result<MigrationReport, MigrationFailure> {
        let started = Instant::now();
        let mut migration = Migration::new(workload_id);

        // One snapshot for the whole migration; a concurrent /configure only
        // affects migrations that start after it.
        let destination = self.registry.snapshot();
        if !destination.is_configured() {
            return Err(migration.refuse(MigrationError::NotConfigured));
        }

        migration.enter(MigrationPhase::Checkpointing);
        match self.checkpointer.checkpoint(workload_id).await {
            Ok(output) => {
                debug!(workload_id = %workload_id, stdout = %output.stdout.trim_end(), "Checkpoint output");
                migration.done(MigrationStep::Checkpoint);
            }
            Err(e) => return Err(migration.abort(MigrationError::Checkpoint(e))),
        }

        migration.enter(MigrationPhase::Rescheduling);
        if let Err(e) = self
            .pods
            .delete_pod(&self.defaults.namespace, &self.defaults.source_pod)
            .await
        {
            return Err(migration.abort(MigrationError::DeleteSource(e)));
        }
        migration.done(MigrationStep::DeleteSource);

        let template = self.defaults.template_for(&destination.target_node);
        let created = match self.pods.create_pod(&template).await {
            Ok(pod) => pod,
            Err(e) => return Err(migration.abort(MigrationError::CreateDestination(e))),
        };
        migration.done(MigrationStep::CreateDestination);

        migration.enter(MigrationPhase::AwaitingReady);
        let ready = match self.pods.await_phase(&created, PodPhase::Running).await {
            Ok(pod) => pod,
            Err(e) => return Err(migration.abort(MigrationError::NotReady(e))),
        };
        if ready.phase() != PodPhase::Running {
            let error = AwaitError::UnexpectedPhase {
                name: ready.metadata.name.clone(),
                target: PodPhase::Running,
                observed: ready.phase(),
            };
            return Err(migration.abort(MigrationError::NotReady(error)));
        }
        migration.done(MigrationStep::AwaitReady);

        let container_id = match container_id_of(&ready, &self.runtime_scheme) {
            Ok(id) => id,
            Err(e) => return Err(migration.abort(MigrationError::ContainerId(e))),
        };

        migration.enter(MigrationPhase::Notifying);
        let peer_status = match self
            .peer
            .notify_restore(&destination.address, &container_id)
            .await
        {
            Ok(status) => status,
            Err(e) => return Err(migration.abort(MigrationError::Notify(e))),
        };
        migration.done(MigrationStep::Notify);

        migration.enter(MigrationPhase::Complete);
        let report = MigrationReport {
            workload_id: workload_id.to_string(),
            destination: (*destination).clone(),
            pod_name: ready.metadata.name.clone(),
            container_id,
            peer_status,
            elapsed: started.elapsed(),
        };

        info!(
            workload_id = %report.workload_id,
            destination = %report.destination.address,
            target_node = %report.destination.target_node,
            pod = %report.pod_name,
            container_id = %report.container_id,
            peer_status = report.peer_status,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Migration complete"
        );

        Ok(report)
    }
}
