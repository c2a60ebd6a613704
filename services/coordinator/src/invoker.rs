//! Checkpoint and restore invokers.
//!
//! Both capabilities are external executables that take a single identifier
//! argument:
//! - checkpoint: freezes and serializes the running container named by the
//!   workload identifier
//! - restore: resumes a container from its checkpoint on this node
//!
//! A mock implementation is provided for testing and development.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Captured output of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Errors from running an external command.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} failed with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stdout: String,
        stderr: String,
    },
}

/// Takes a checkpoint of a running workload.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn checkpoint(&self, workload_id: &str) -> Result<CommandOutput, InvokeError>;
}

/// Resumes a container from its checkpoint.
#[async_trait]
pub trait Restorer: Send + Sync {
    async fn restore(&self, container_id: &str) -> Result<CommandOutput, InvokeError>;
}

/// An executable invoked as `<program> <identifier>`.
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    program: PathBuf,
}

impl ExternalCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run the program and wait for it to exit.
    pub async fn run(&self, identifier: &str) -> Result<CommandOutput, InvokeError> {
        let program = self.program.display().to_string();
        debug!(program = %program, identifier = %identifier, "Running external command");

        let output = Command::new(&self.program)
            .arg(identifier)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| InvokeError::Launch {
                program: program.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(InvokeError::Failed {
                program,
                status: output.status.to_string(),
                stdout,
                stderr: stderr.trim().to_string(),
            });
        }

        debug!(program = %program, stdout = %stdout.trim_end(), "External command finished");
        Ok(CommandOutput { stdout, stderr })
    }
}

#[async_trait]
impl Checkpointer for ExternalCommand {
    async fn checkpoint(&self, workload_id: &str) -> Result<CommandOutput, InvokeError> {
        self.run(workload_id).await
    }
}

#[async_trait]
impl Restorer for ExternalCommand {
    async fn restore(&self, container_id: &str) -> Result<CommandOutput, InvokeError> {
        self.run(container_id).await
    }
}

/// Mock invoker for testing and development.
///
/// Records every identifier it is called with.
pub struct MockInvoker {
    calls: Mutex<Vec<String>>,

    /// Whether invocations should "fail" with a non-zero exit.
    fail: bool,
}

impl MockInvoker {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// Create a mock invoker whose every invocation fails.
    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Identifiers received so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn invoke(&self, identifier: &str) -> Result<CommandOutput, InvokeError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(identifier.to_string());
        }

        if self.fail {
            return Err(InvokeError::Failed {
                program: "mock".to_string(),
                status: "exit status: 1".to_string(),
                stdout: String::new(),
                stderr: "mock invoker configured to fail".to_string(),
            });
        }

        info!(identifier = %identifier, "[MOCK] Invoked");
        Ok(CommandOutput {
            stdout: format!("mock {identifier}\n"),
            stderr: String::new(),
        })
    }
}

impl Default for MockInvoker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Checkpointer for MockInvoker {
    async fn checkpoint(&self, workload_id: &str) -> Result<CommandOutput, InvokeError> {
        self.invoke(workload_id)
    }
}

#[async_trait]
impl Restorer for MockInvoker {
    async fn restore(&self, container_id: &str) -> Result<CommandOutput, InvokeError> {
        self.invoke(container_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_external_command_passes_identifier() {
        let command = ExternalCommand::new("echo");

        let output = command.checkpoint("container-123").await.unwrap();
        assert_eq!(output.stdout.trim(), "container-123");
    }

    #[tokio::test]
    async fn test_external_command_nonzero_exit() {
        let command = ExternalCommand::new("false");

        let err = command.restore("xyz").await.unwrap_err();
        match err {
            InvokeError::Failed { program, status, .. } => {
                assert_eq!(program, "false");
                assert!(status.contains('1'));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_external_command_missing_program() {
        let command = ExternalCommand::new("/nonexistent/checkpoint.sh");

        let err = command.checkpoint("container-123").await.unwrap_err();
        assert!(matches!(err, InvokeError::Launch { .. }));
    }

    #[tokio::test]
    async fn test_mock_invoker_records_calls() {
        let invoker = MockInvoker::new();

        invoker.checkpoint("a").await.unwrap();
        invoker.restore("b").await.unwrap();

        assert_eq!(invoker.calls(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_invoker_failing() {
        let invoker = MockInvoker::failing();

        assert!(invoker.checkpoint("a").await.is_err());
        assert_eq!(invoker.calls(), vec!["a".to_string()]);
    }
}
