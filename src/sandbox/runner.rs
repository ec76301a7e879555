//! Child-process runner for generated Python code.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::safety::SafetyAnalyzer;

use super::{CodeExecutor, ExecutionError, ExecutionResult, SandboxConfig, ScriptArtifact};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Captured bytes of one stream plus the count of bytes dropped past the limit.
type Captured = (Vec<u8>, usize);

/// Runs code fragments as isolated interpreter processes.
///
/// Every call passes the safety gate first, writes its own uniquely named
/// script into the workspace, and removes it again on every exit path.
#[derive(Debug, Clone)]
pub struct SandboxRunner {
    config: SandboxConfig,
    analyzer: SafetyAnalyzer,
}

impl SandboxRunner {
    /// Creates a runner with the given configuration and safety gate.
    pub fn new(config: SandboxConfig, analyzer: SafetyAnalyzer) -> Self {
        Self { config, analyzer }
    }

    /// Returns the runner configuration.
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Executes `code` with the configured timeout.
    pub async fn run(&self, code: &str) -> Result<ExecutionResult, ExecutionError> {
        self.run_with_timeout(code, self.config.timeout()).await
    }

    /// Executes `code` with an explicit wall-clock timeout.
    pub async fn run_with_timeout(
        &self,
        code: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecutionError> {
        let verdict = self.analyzer.check(code);
        if !verdict.accepted {
            tracing::warn!(reason = %verdict.reason, "execution blocked by static analysis");
            return Err(ExecutionError::SafetyViolation(verdict.reason));
        }

        let workspace = &self.config.workspace_dir;
        std::fs::create_dir_all(workspace)
            .map_err(|e| ExecutionError::from_workspace_error(&e, "failed to create workspace"))?;

        let mut artifact = ScriptArtifact::create(workspace, code)
            .map_err(|e| ExecutionError::from_workspace_error(&e, "failed to write script"))?;

        let outcome = self.spawn_and_wait(&artifact, timeout).await;
        artifact.cleanup();
        outcome
    }

    fn build_command(&self, artifact: &ScriptArtifact) -> Command {
        let mut cmd = Command::new(&self.config.interpreter);
        // the child runs inside the workspace, so the bare file name resolves
        cmd.args(self.config.interpreter_flags())
            .arg(artifact.file_name())
            .current_dir(&self.config.workspace_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // the script leads its own group so its descendants can be killed with it
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        #[cfg(windows)]
        {
            if self.config.hide_console {
                cmd.creation_flags(CREATE_NO_WINDOW);
            }
        }

        cmd
    }

    async fn spawn_and_wait(
        &self,
        artifact: &ScriptArtifact,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecutionError> {
        let interpreter = self.config.interpreter.display().to_string();

        tracing::info!(
            interpreter = %interpreter,
            script = %artifact.path().display(),
            timeout_secs = timeout.as_secs_f64(),
            "executing script"
        );

        let start = Instant::now();
        let mut child = self
            .build_command(artifact)
            .spawn()
            .map_err(|e| ExecutionError::from_spawn_error(&e, &interpreter))?;
        let pid = child.id();

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecutionError::Unknown("stdout was not piped".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExecutionError::Unknown("stderr was not piped".to_string()))?;

        let limit = self.config.max_output_bytes;
        let mut stdout_task = tokio::spawn(read_limited(stdout, limit));
        let mut stderr_task = tokio::spawn(read_limited(stderr, limit));

        // one deadline covers the exit and the end of both output streams
        let collected = tokio::time::timeout(timeout, async {
            let status = child.wait().await.map_err(|e| {
                ExecutionError::Unknown(format!("failed to wait for interpreter: {}", e))
            })?;
            // background processes left in the group would hold the pipes open
            kill_group(pid);
            let stdout = join_capture(&mut stdout_task).await?;
            let stderr = join_capture(&mut stderr_task).await?;
            Ok::<_, ExecutionError>((status, stdout, stderr))
        })
        .await;

        let (status, (stdout, stdout_dropped), (stderr, stderr_dropped)) = match collected {
            Ok(Ok(collected)) => collected,
            Ok(Err(e)) => {
                kill_tree(&mut child, pid).await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = timeout.as_secs_f64(),
                    "script timed out, killing"
                );
                kill_tree(&mut child, pid).await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(ExecutionError::Timeout(timeout));
            }
        };
        let duration = start.elapsed();

        let truncated = stdout_dropped > 0 || stderr_dropped > 0;
        if truncated {
            tracing::warn!(stdout_dropped, stderr_dropped, "script output truncated");
        }

        let exit_code = status.code().unwrap_or(-1);
        tracing::info!(exit_code, duration_ms = duration.as_millis() as u64, "script finished");

        Ok(ExecutionResult {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            duration,
            truncated,
        })
    }
}

#[async_trait]
impl CodeExecutor for SandboxRunner {
    async fn execute(&self, code: &str) -> Result<ExecutionResult, ExecutionError> {
        self.run(code).await
    }

    fn name(&self) -> &str {
        "sandbox-runner"
    }
}

/// Kills the child and everything still running in its process group, then
/// reaps the child.
async fn kill_tree(child: &mut Child, pid: Option<u32>) {
    kill_group(pid);
    // kill() also reaps the child, so nothing is left running
    if let Err(e) = child.kill().await {
        tracing::error!(error = %e, "failed to kill script");
    }
}

/// Sends SIGKILL to the process group led by `pid`.
#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    let Some(pgid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
        return;
    };
    // SAFETY: killpg takes no pointers; a group that is already gone yields ESRCH.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!(pgid, error = %err, "failed to kill script process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

/// Reads a stream to the end, keeping at most `limit` bytes.
async fn read_limited<R: AsyncRead + Unpin>(
    mut reader: R,
    limit: usize,
) -> std::io::Result<Captured> {
    let mut kept = Vec::new();
    let mut dropped = 0usize;
    let mut buf = [0u8; 8192];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(kept.len());
        let take = room.min(n);
        kept.extend_from_slice(&buf[..take]);
        dropped += n - take;
    }

    Ok((kept, dropped))
}

async fn join_capture(
    handle: &mut JoinHandle<std::io::Result<Captured>>,
) -> Result<Captured, ExecutionError> {
    match handle.await {
        Ok(Ok(captured)) => Ok(captured),
        Ok(Err(e)) => Err(ExecutionError::Unknown(format!(
            "failed to read script output: {}",
            e
        ))),
        Err(e) => Err(ExecutionError::Unknown(format!(
            "output reader task failed: {}",
            e
        ))),
    }
}
