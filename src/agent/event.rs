//! Progress events emitted while a run advances.

use serde::{Deserialize, Serialize};

use crate::sandbox::ExecutionResult;

/// Envelope serialized as `{"type": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum AgentEvent {
    /// Planning succeeded.
    Plan { steps: Vec<String> },

    /// Code was generated for a step.
    Code { step: usize, code: String },

    /// A step finished executing.
    Result {
        step: usize,
        result: ExecutionResult,
    },

    /// The run failed.
    Error { kind: String, message: String },
}

impl AgentEvent {
    /// Returns the envelope type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            AgentEvent::Plan { .. } => "plan",
            AgentEvent::Code { .. } => "code",
            AgentEvent::Result { .. } => "result",
            AgentEvent::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn events_use_type_and_data_envelope() {
        let event = AgentEvent::Plan {
            steps: vec!["a".to_string()],
        };
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "plan");
        assert_eq!(json["data"]["steps"][0], "a");
        assert_eq!(event.event_type(), "plan");
    }

    #[test]
    fn result_event_nests_execution_result() {
        let event = AgentEvent::Result {
            step: 1,
            result: ExecutionResult {
                exit_code: 0,
                stdout: "hi".to_string(),
                stderr: String::new(),
                duration: Duration::from_millis(3),
                truncated: false,
            },
        };
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "result");
        assert_eq!(json["data"]["step"], 1);
        assert_eq!(json["data"]["result"]["exit_code"], 0);
        assert_eq!(json["data"]["result"]["stdout"], "hi");

        let back: AgentEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn error_event_round_trips() {
        let text = r#"{"type":"error","data":{"kind":"timeout","message":"too slow"}}"#;
        let event: AgentEvent = serde_json::from_str(text).unwrap();
        assert_eq!(
            event,
            AgentEvent::Error {
                kind: "timeout".to_string(),
                message: "too slow".to_string()
            }
        );
    }
}
