//! Integration tests for the sandbox worker channel.
//!
//! The worker and its client talk over an in-memory duplex pipe, so these
//! tests exercise the wire protocol without spawning a second process.

use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::BufReader;
use tokio_test::assert_ok;

use codeloop::worker::protocol::{INVALID_PARAMS, METHOD_EXECUTE, PARSE_ERROR};
use codeloop::{
    CodeExecutor, DenyList, ExecutionError, ModelRole, Orchestrator, RunRequest, RunStatus,
    SafetyAnalyzer, SandboxConfig, SandboxRunner, ScriptedModelService, WorkerClient,
    WorkerServer,
};

fn runner(dir: &TempDir) -> SandboxRunner {
    SandboxRunner::new(
        SandboxConfig::new(dir.path()).with_interpreter("codeloop-missing-interpreter"),
        SafetyAnalyzer::new(DenyList::default()),
    )
}

fn connect(dir: &TempDir) -> WorkerClient {
    let server = WorkerServer::new(runner(dir));
    let (client_side, server_side) = tokio::io::duplex(64 * 1024);

    tokio::spawn(async move {
        let (reader, writer) = tokio::io::split(server_side);
        server.serve(BufReader::new(reader), writer).await
    });

    let (reader, writer) = tokio::io::split(client_side);
    WorkerClient::from_streams(reader, writer)
}

#[tokio::test]
async fn ping_and_blocked_execution_round_trip() {
    let dir = TempDir::new().unwrap();
    let client = connect(&dir);

    assert_ok!(client.ping().await);

    let err = client.execute("import socket").await.unwrap_err();
    assert_eq!(
        err,
        ExecutionError::SafetyViolation("Unsafe import detected: 'socket'".to_string())
    );
    assert_eq!(client.name(), "sandbox-worker");
}

#[tokio::test]
async fn execute_without_code_is_invalid_params() {
    let dir = TempDir::new().unwrap();
    let client = connect(&dir);

    let err = client
        .call(METHOD_EXECUTE, Some(json!({ "source": "print(1)" })))
        .await
        .unwrap_err();

    assert!(err.to_string().contains(&INVALID_PARAMS.to_string()), "{err}");
    // the channel stays usable after an error response
    assert_ok!(client.ping().await);
}

#[tokio::test]
async fn sequential_calls_keep_their_ids_apart() {
    let dir = TempDir::new().unwrap();
    let client = Arc::new(connect(&dir));

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.execute("eval('1')").await })
        })
        .collect();

    for task in tasks {
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, ExecutionError::SafetyViolation(_)), "{err:?}");
    }
}

#[test]
fn malformed_line_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let server = WorkerServer::new(runner(&dir));

    let response = tokio_test::block_on(server.handle_line("{not json"));

    assert_eq!(response.id, None);
    assert_eq!(response.error.map(|e| e.code), Some(PARSE_ERROR));
}

#[test]
fn raw_ping_line_gets_pong() {
    let dir = TempDir::new().unwrap();
    let server = WorkerServer::new(runner(&dir));

    let response = tokio_test::block_on(
        server.handle_line(r#"{"jsonrpc":"2.0","method":"ping","id":7}"#),
    );

    assert_eq!(response.id, Some(Value::from(7)));
    assert_eq!(response.result, Some(Value::from("pong")));
}

#[tokio::test]
async fn orchestrator_runs_through_a_worker() {
    let dir = TempDir::new().unwrap();
    let executor = Arc::new(connect(&dir));
    let models = Arc::new(
        ScriptedModelService::new()
            .with_response(ModelRole::Planner, r#"{"plan": ["open a socket"]}"#)
            .with_response(ModelRole::Coder, "```python\nimport socket\n```"),
    );

    let report = Orchestrator::new(models, executor)
        .run(RunRequest::new("talk to the network").unwrap())
        .await;

    assert_eq!(report.status, RunStatus::Failed);
    let err = report.error().unwrap();
    assert_eq!(err.kind(), "safety_violation");
    assert!(err.to_string().contains("'socket'"));
    assert_eq!(report.state.current_step(), 0);
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}
