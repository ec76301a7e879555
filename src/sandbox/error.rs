//! Failure taxonomy of a sandbox execution.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Why an execution produced no [`super::ExecutionResult`].
///
/// A non-zero exit code is not an error; it is reported in the result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    /// The static safety gate rejected the code; no process was created.
    #[error("blocked by static analysis: {0}")]
    SafetyViolation(String),

    /// The child exceeded its wall-clock budget and was killed.
    #[error("process timed out after {} seconds", .0.as_secs_f64())]
    Timeout(Duration),

    /// The interpreter is missing or could not be started.
    #[error("failed to start interpreter: {0}")]
    SpawnFailure(String),

    /// The environment refused access to the interpreter or workspace.
    #[error("permission denied: {0}")]
    PermissionFailure(String),

    /// Anything else.
    #[error("unexpected execution error: {0}")]
    Unknown(String),
}

impl ExecutionError {
    /// Classifies an IO error raised while spawning the interpreter.
    pub fn from_spawn_error(err: &io::Error, interpreter: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => {
                Self::SpawnFailure(format!("interpreter '{}' not found", interpreter))
            }
            io::ErrorKind::PermissionDenied => {
                Self::PermissionFailure(format!("cannot execute '{}': {}", interpreter, err))
            }
            _ => Self::SpawnFailure(format!("'{}': {}", interpreter, err)),
        }
    }

    /// Classifies an IO error raised while preparing the workspace or script.
    pub fn from_workspace_error(err: &io::Error, context: &str) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => {
                Self::PermissionFailure(format!("{}: {}", context, err))
            }
            _ => Self::Unknown(format!("{}: {}", context, err)),
        }
    }

    /// Stable short name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SafetyViolation(_) => "safety_violation",
            Self::Timeout(_) => "timeout",
            Self::SpawnFailure(_) => "spawn_failure",
            Self::PermissionFailure(_) => "permission_failure",
            Self::Unknown(_) => "unknown_execution_error",
        }
    }
}
