//! Sandboxed execution of generated Python code.
//!
//! This module provides the [`CodeExecutor`] trait the orchestrator runs code
//! through, the [`SandboxRunner`] implementation that executes each fragment as
//! an isolated child process, and the text report format used on the worker
//! channel.

mod artifact;
mod config;
mod error;
pub mod report;
mod runner;

pub use artifact::{remove_if_present, ScriptArtifact};
pub use config::SandboxConfig;
pub use error::ExecutionError;
pub use report::{parse_report, render_report};
pub use runner::SandboxRunner;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Captured outcome of one sandbox invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Process exit code; `-1` when the process was ended by a signal.
    pub exit_code: i32,
    /// Trimmed standard output.
    pub stdout: String,
    /// Trimmed standard error.
    pub stderr: String,
    /// Wall-clock time from spawn to exit.
    pub duration: Duration,
    /// Whether either stream exceeded the capture limit.
    #[serde(default)]
    pub truncated: bool,
}

impl ExecutionResult {
    /// Returns true if the process exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Something that can execute a code fragment for the orchestrator.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Executes `code`, returning its captured result or a classified failure.
    async fn execute(&self, code: &str) -> Result<ExecutionResult, ExecutionError>;

    /// Returns the name of this executor.
    fn name(&self) -> &str;
}
