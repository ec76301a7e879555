//! Worker side of the sandbox channel.

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::sandbox::{render_report, CodeExecutor};

use super::protocol::{
    json_rpc_error, json_rpc_ok, JsonRpcRequest, JsonRpcResponse, INVALID_PARAMS,
    INVALID_REQUEST, JSONRPC_VERSION, METHOD_EXECUTE, METHOD_NOT_FOUND, METHOD_PING, PARSE_ERROR,
};

/// Serves execution requests read line by line from a stream.
pub struct WorkerServer<E: CodeExecutor> {
    executor: E,
}

impl<E: CodeExecutor> WorkerServer<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    /// Answers requests until `reader` reaches end of input.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!(executor = %self.executor.name(), "sandbox worker ready");

        let mut lines = reader.lines();
        let mut served = 0u64;
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let response = self.handle_line(&line).await;
            let mut text =
                serde_json::to_string(&response).map_err(|e| Error::Protocol(e.to_string()))?;
            text.push('\n');
            writer.write_all(text.as_bytes()).await?;
            writer.flush().await?;
            served += 1;
        }

        tracing::info!(served, "sandbox worker input closed");
        Ok(())
    }

    /// Handles one raw request line.
    pub async fn handle_line(&self, line: &str) -> JsonRpcResponse {
        match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(req) => self.handle_request(&req).await,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse worker request");
                json_rpc_error(None, PARSE_ERROR, format!("Parse error: {e}"))
            }
        }
    }

    /// Dispatches a parsed request.
    pub async fn handle_request(&self, req: &JsonRpcRequest) -> JsonRpcResponse {
        if req.jsonrpc != JSONRPC_VERSION {
            return json_rpc_error(
                req.id.clone(),
                INVALID_REQUEST,
                format!("unsupported jsonrpc version '{}'", req.jsonrpc),
            );
        }

        match req.method.as_str() {
            METHOD_PING => json_rpc_ok(req.id.clone(), Value::from("pong")),
            METHOD_EXECUTE => {
                let Some(code) = req.str_param("code") else {
                    return json_rpc_error(req.id.clone(), INVALID_PARAMS, "missing 'code' parameter");
                };

                let outcome = self.executor.execute(code).await;
                match &outcome {
                    Ok(result) => tracing::info!(exit_code = result.exit_code, "worker executed code"),
                    Err(e) => tracing::info!(kind = e.kind(), "worker execution failed"),
                }
                json_rpc_ok(req.id.clone(), Value::from(render_report(&outcome)))
            }
            other => json_rpc_error(
                req.id.clone(),
                METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{ExecutionError, ExecutionResult};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::BufReader;

    struct EchoExecutor;

    #[async_trait]
    impl CodeExecutor for EchoExecutor {
        async fn execute(&self, code: &str) -> std::result::Result<ExecutionResult, ExecutionError> {
            if code.contains("import os") {
                return Err(ExecutionError::SafetyViolation("Unsafe import detected: 'os'".into()));
            }
            Ok(ExecutionResult {
                exit_code: 0,
                stdout: code.to_string(),
                stderr: String::new(),
                duration: Duration::from_millis(1),
                truncated: false,
            })
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn server() -> WorkerServer<EchoExecutor> {
        WorkerServer::new(EchoExecutor)
    }

    #[tokio::test]
    async fn ping_answers_pong() {
        let resp = server()
            .handle_request(&JsonRpcRequest::new(1, METHOD_PING, None))
            .await;
        assert_eq!(resp.result, Some(json!("pong")));
        assert_eq!(resp.id, Some(json!(1)));
    }

    #[tokio::test]
    async fn execute_returns_report_text() {
        let req = JsonRpcRequest::new(2, METHOD_EXECUTE, Some(json!({"code": "print(1)"})));
        let resp = server().handle_request(&req).await;

        let text = resp.result.unwrap();
        let text = text.as_str().unwrap();
        assert!(text.starts_with("Execution Result (code 0):"));
        assert!(text.contains("[stdout]\nprint(1)\n[stderr]"));
    }

    #[tokio::test]
    async fn blocked_code_is_a_result_not_an_rpc_error() {
        let req = JsonRpcRequest::new(3, METHOD_EXECUTE, Some(json!({"code": "import os"})));
        let resp = server().handle_request(&req).await;

        assert!(resp.error.is_none());
        assert_eq!(
            resp.result,
            Some(json!("Execution Blocked by Static Analysis: Unsafe import detected: 'os'"))
        );
    }

    #[tokio::test]
    async fn protocol_errors_use_json_rpc_codes() {
        let server = server();

        let parse = server.handle_line("{not json").await;
        assert_eq!(parse.error.unwrap().code, PARSE_ERROR);

        let unknown = server
            .handle_request(&JsonRpcRequest::new(4, "shell", None))
            .await;
        assert_eq!(unknown.error.unwrap().code, METHOD_NOT_FOUND);

        let missing = server
            .handle_request(&JsonRpcRequest::new(5, METHOD_EXECUTE, Some(json!({}))))
            .await;
        assert_eq!(missing.error.unwrap().code, INVALID_PARAMS);

        let mut old = JsonRpcRequest::new(6, METHOD_PING, None);
        old.jsonrpc = "1.0".to_string();
        assert_eq!(server.handle_request(&old).await.error.unwrap().code, INVALID_REQUEST);
    }

    #[tokio::test]
    async fn serve_answers_each_line_and_stops_at_eof() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","method":"ping","id":1}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"execute_python_code","params":{"code":"x = 1"},"id":2}"#,
            "\n",
            "garbage\n",
        );
        let mut output = Vec::new();

        server()
            .serve(BufReader::new(input.as_bytes()), &mut output)
            .await
            .unwrap();

        let responses: Vec<JsonRpcResponse> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0].result, Some(json!("pong")));
        assert_eq!(responses[1].id, Some(json!(2)));
        assert_eq!(responses[2].error.as_ref().unwrap().code, PARSE_ERROR);
    }
}
