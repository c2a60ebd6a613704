//! Mock control plane for testing and development.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use super::{
    ContainerStatus, ObjectMeta, Pod, PodApi, PodError, PodOperation, PodPhase, PodStatus,
};

/// A control-plane call observed by [`MockPodApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodCall {
    Get {
        namespace: String,
        name: String,
    },
    Create {
        namespace: String,
        name: String,
        node: Option<String>,
    },
    Delete {
        namespace: String,
        name: String,
    },
}

impl PodCall {
    fn operation(&self) -> PodOperation {
        match self {
            PodCall::Get { .. } => PodOperation::Get,
            PodCall::Create { .. } => PodOperation::Create,
            PodCall::Delete { .. } => PodOperation::Delete,
        }
    }
}

/// Mock control plane with a scripted sequence of pod phases.
///
/// Each `get_pod` consumes the next scripted phase; the last one repeats
/// forever.
pub struct MockPodApi {
    phases: Mutex<VecDeque<PodPhase>>,
    container_id: Option<String>,
    fail_on: Option<PodOperation>,
    calls: Mutex<Vec<PodCall>>,
}

impl MockPodApi {
    /// Pods are reported `Running` with a containerd-style container id.
    pub fn new() -> Self {
        Self {
            phases: Mutex::new(VecDeque::from([PodPhase::Running])),
            container_id: Some("containerd://mock0001".to_string()),
            fail_on: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_phases(self, phases: Vec<PodPhase>) -> Self {
        Self {
            phases: Mutex::new(phases.into()),
            ..self
        }
    }

    pub fn with_container_id(self, container_id: Option<&str>) -> Self {
        Self {
            container_id: container_id.map(str::to_string),
            ..self
        }
    }

    /// Make every call of `operation` fail with a server error.
    pub fn failing_on(self, operation: PodOperation) -> Self {
        Self {
            fail_on: Some(operation),
            ..self
        }
    }

    pub fn calls(&self) -> Vec<PodCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn count(&self, operation: PodOperation) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }

    fn record(&self, call: PodCall) -> Result<(), PodError> {
        let operation = call.operation();
        debug!(?call, "[MOCK] Control plane call");

        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }

        if self.fail_on == Some(operation) {
            return Err(PodError::Api {
                operation,
                status: 500,
                body: "mock control plane configured to fail".to_string(),
            });
        }
        Ok(())
    }

    fn next_phase(&self) -> PodPhase {
        let Ok(mut phases) = self.phases.lock() else {
            return PodPhase::Unknown;
        };
        if phases.len() > 1 {
            phases.pop_front().unwrap_or_default()
        } else {
            phases.front().copied().unwrap_or_default()
        }
    }
}

impl Default for MockPodApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PodApi for MockPodApi {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, PodError> {
        self.record(PodCall::Get {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })?;

        let phase = self.next_phase();
        let container_statuses = match (&self.container_id, phase) {
            (Some(id), PodPhase::Running) => vec![ContainerStatus {
                name: name.to_string(),
                container_id: Some(id.clone()),
            }],
            _ => Vec::new(),
        };

        Ok(Pod {
            metadata: ObjectMeta {
                name: name.to_string(),
                namespace: namespace.to_string(),
            },
            status: Some(PodStatus {
                phase: Some(phase),
                container_statuses,
            }),
            ..Pod::default()
        })
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod, PodError> {
        self.record(PodCall::Create {
            namespace: namespace.to_string(),
            name: pod.metadata.name.clone(),
            node: pod.node_name().map(str::to_string),
        })?;

        let mut created = pod.clone();
        created.metadata.namespace = namespace.to_string();
        created.status = Some(PodStatus {
            phase: Some(PodPhase::Pending),
            container_statuses: Vec::new(),
        });
        Ok(created)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), PodError> {
        self.record(PodCall::Delete {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }
}
