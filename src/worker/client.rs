//! Host side of the sandbox channel.

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::sandbox::{parse_report, CodeExecutor, ExecutionError, ExecutionResult};

use super::protocol::{JsonRpcRequest, JsonRpcResponse, METHOD_EXECUTE, METHOD_PING};

type BoxedReader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct Channel {
    reader: BoxedReader,
    writer: BoxedWriter,
}

/// Talks to a persistent sandbox worker over its stdio.
///
/// Calls are serialized: one request is in flight at a time.
pub struct WorkerClient {
    channel: Mutex<Channel>,
    next_id: AtomicU64,
    child: Option<Child>,
}

impl WorkerClient {
    /// Starts `program` with `args` as a worker process.
    pub fn spawn(program: &Path, args: &[String]) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Worker(format!("failed to start {}: {}", program.display(), e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Worker("worker stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Worker("worker stdout unavailable".to_string()))?;

        tracing::info!(program = %program.display(), pid = ?child.id(), "started sandbox worker");

        let mut client = Self::from_streams(stdout, stdin);
        client.child = Some(child);
        Ok(client)
    }

    /// Starts this executable's `worker` subcommand.
    pub fn spawn_current(config: Option<&Path>) -> Result<Self> {
        let exe = std::env::current_exe()?;
        let mut args = vec!["worker".to_string()];
        if let Some(config) = config {
            args.push("--config".to_string());
            args.push(config.display().to_string());
        }
        Self::spawn(&exe, &args)
    }

    /// Wraps an already connected pair of streams.
    pub fn from_streams<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
        Self {
            channel: Mutex::new(Channel {
                reader: BufReader::new(reader),
                writer: Box::new(writer),
            }),
            next_id: AtomicU64::new(1),
            child: None,
        }
    }

    /// Sends one request and waits for its response.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);
        let mut line = serde_json::to_string(&request).map_err(|e| Error::Protocol(e.to_string()))?;
        line.push('\n');

        let mut channel = self.channel.lock().await;
        channel.writer.write_all(line.as_bytes()).await?;
        channel.writer.flush().await?;

        let expected = Value::from(id);
        loop {
            let mut buf = String::new();
            let n = channel.reader.read_line(&mut buf).await?;
            if n == 0 {
                return Err(Error::Worker("worker closed its output".to_string()));
            }
            if buf.trim().is_empty() {
                continue;
            }

            let response: JsonRpcResponse = serde_json::from_str(&buf)
                .map_err(|e| Error::Protocol(format!("invalid response line: {e}")))?;
            if response.id.as_ref() != Some(&expected) {
                tracing::warn!(expected = id, got = ?response.id, "discarding unmatched worker response");
                continue;
            }

            if let Some(err) = response.error {
                return Err(Error::Protocol(format!("{} ({})", err.message, err.code)));
            }
            return response
                .result
                .ok_or_else(|| Error::Protocol("response carried neither result nor error".to_string()));
        }
    }

    /// Checks that the worker answers.
    pub async fn ping(&self) -> Result<()> {
        match self.call(METHOD_PING, None).await? {
            Value::String(s) if s == "pong" => Ok(()),
            other => Err(Error::Protocol(format!("unexpected ping answer: {other}"))),
        }
    }

    /// Executes `code` in the worker and returns the raw report text.
    pub async fn execute_report(&self, code: &str) -> Result<String> {
        match self.call(METHOD_EXECUTE, Some(json!({ "code": code }))).await? {
            Value::String(text) => Ok(text),
            other => Err(Error::Protocol(format!("expected report text, got {other}"))),
        }
    }

    /// Closes the worker's input and waits for it to exit.
    pub async fn shutdown(self) -> Result<()> {
        let WorkerClient { channel, child, .. } = self;
        drop(channel);

        if let Some(mut child) = child {
            let status = child.wait().await?;
            tracing::info!(status = %status, "sandbox worker exited");
        }
        Ok(())
    }
}

#[async_trait]
impl CodeExecutor for WorkerClient {
    async fn execute(&self, code: &str) -> std::result::Result<ExecutionResult, ExecutionError> {
        let start = Instant::now();
        let text = self
            .execute_report(code)
            .await
            .map_err(|e| ExecutionError::Unknown(e.to_string()))?;

        let mut result = parse_report(&text)?;
        result.duration = start.elapsed();
        Ok(result)
    }

    fn name(&self) -> &str {
        "sandbox-worker"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{SandboxConfig, SandboxRunner};
    use crate::safety::{DenyList, SafetyAnalyzer};
    use crate::worker::WorkerServer;
    use tempfile::TempDir;

    fn connect(dir: &Path) -> WorkerClient {
        let runner = SandboxRunner::new(
            SandboxConfig::new(dir).with_interpreter("codeloop-no-such-python"),
            SafetyAnalyzer::new(DenyList::default()),
        );
        let (client_side, server_side) = tokio::io::duplex(64 * 1024);

        tokio::spawn(async move {
            let (reader, writer) = tokio::io::split(server_side);
            WorkerServer::new(runner)
                .serve(BufReader::new(reader), writer)
                .await
        });

        let (reader, writer) = tokio::io::split(client_side);
        WorkerClient::from_streams(reader, writer)
    }

    #[tokio::test]
    async fn ping_round_trips() {
        let dir = TempDir::new().unwrap();
        let client = connect(dir.path());

        client.ping().await.unwrap();
        client.ping().await.unwrap();
    }

    #[tokio::test]
    async fn blocked_code_comes_back_as_safety_violation() {
        let dir = TempDir::new().unwrap();
        let client = connect(dir.path());

        let err = client.execute("import subprocess").await.unwrap_err();

        assert_eq!(
            err,
            ExecutionError::SafetyViolation("Unsafe import detected: 'subprocess'".to_string())
        );
    }

    #[tokio::test]
    async fn missing_interpreter_comes_back_as_spawn_failure() {
        let dir = TempDir::new().unwrap();
        let client = connect(dir.path());

        let err = client.execute("print('hi')").await.unwrap_err();

        assert!(matches!(err, ExecutionError::SpawnFailure(msg) if msg.contains("codeloop-no-such-python")));
    }

    #[tokio::test]
    async fn unknown_method_is_protocol_error() {
        let dir = TempDir::new().unwrap();
        let client = connect(dir.path());

        let err = client.call("rm_rf", None).await.unwrap_err();

        assert!(matches!(err, Error::Protocol(msg) if msg.contains("-32601")));
    }

    #[tokio::test]
    async fn closed_worker_is_reported() {
        let (client_side, server_side) = tokio::io::duplex(1024);
        drop(server_side);
        let (reader, writer) = tokio::io::split(client_side);
        let client = WorkerClient::from_streams(reader, writer);

        assert!(client.ping().await.is_err());
        let err = client.execute("print(1)").await.unwrap_err();
        assert!(matches!(err, ExecutionError::Unknown(_)));
    }
}
