//! Interpreter invocation settings for the sandbox runner.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the sandbox child process is started.
///
/// All isolation switches live here so that they can be inspected and tested
/// instead of being scattered across platform conditionals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Interpreter executable.
    #[serde(default = "default_interpreter")]
    pub interpreter: PathBuf,

    /// Confined working directory shared by all invocations.
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,

    /// Wall-clock limit for one execution, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Run the interpreter in isolated mode (`-I`), ignoring `PYTHON*`
    /// environment variables and the user site directory.
    #[serde(default = "default_true")]
    pub isolated: bool,

    /// Unbuffered stdout/stderr (`-u`).
    #[serde(default = "default_true")]
    pub unbuffered: bool,

    /// Do not write `.pyc` files into the workspace (`-B`).
    #[serde(default = "default_true")]
    pub no_bytecode: bool,

    /// Suppress the console window for the child on Windows.
    #[serde(default = "default_true")]
    pub hide_console: bool,

    /// Maximum bytes kept per output stream; the rest is drained and dropped.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

fn default_interpreter() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("python")
    } else {
        PathBuf::from("python3")
    }
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("workspace")
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_max_output_bytes() -> usize {
    1024 * 1024
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            workspace_dir: default_workspace_dir(),
            timeout_secs: default_timeout_secs(),
            isolated: true,
            unbuffered: true,
            no_bytecode: true,
            hide_console: true,
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

impl SandboxConfig {
    /// Creates a configuration rooted at the given working directory.
    pub fn new(workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            workspace_dir: workspace_dir.into(),
            ..Default::default()
        }
    }

    /// Sets the interpreter executable.
    pub fn with_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Sets the execution timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        // stored in whole seconds, never zero
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Sets the per-stream output limit.
    pub fn with_max_output_bytes(mut self, limit: usize) -> Self {
        self.max_output_bytes = limit;
        self
    }

    /// Returns the timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Interpreter flags placed before the script path.
    pub fn interpreter_flags(&self) -> Vec<&'static str> {
        let mut flags = Vec::new();
        if self.isolated {
            flags.push("-I");
        }
        if self.unbuffered {
            flags.push("-u");
        }
        if self.no_bytecode {
            flags.push("-B");
        }
        flags
    }
}
