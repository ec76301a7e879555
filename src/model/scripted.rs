//! Canned model responses for tests and scenario fixtures.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ChatPrompt, ModelError, ModelRole, ModelService};

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedCall {
    pub role: ModelRole,
    pub prompt: ChatPrompt,
}

/// A [`ModelService`] that replays queued responses per role.
///
/// Each call pops the next response for its role. An exhausted queue answers
/// with [`ModelError::Response`].
#[derive(Debug, Default)]
pub struct ScriptedModelService {
    queues: Mutex<HashMap<ModelRole, VecDeque<Result<String, ModelError>>>>,
    calls: Mutex<Vec<ScriptedCall>>,
}

impl ScriptedModelService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful response for `role`.
    pub fn with_response(self, role: ModelRole, text: impl Into<String>) -> Self {
        self.push(role, Ok(text.into()));
        self
    }

    /// Queues several successful responses for `role`.
    pub fn with_responses<I, S>(self, role: ModelRole, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for text in texts {
            self.push(role, Ok(text.into()));
        }
        self
    }

    /// Queues a failure for `role`.
    pub fn with_error(self, role: ModelRole, err: ModelError) -> Self {
        self.push(role, Err(err));
        self
    }

    /// Queues a response after construction.
    pub fn push(&self, role: ModelRole, response: Result<String, ModelError>) {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues.entry(role).or_default().push_back(response);
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<ScriptedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Calls made for one role.
    pub fn calls_for(&self, role: ModelRole) -> Vec<ScriptedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.role == role)
            .collect()
    }

    /// Responses still queued for `role`.
    pub fn remaining(&self, role: ModelRole) -> usize {
        let queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues.get(&role).map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl ModelService for ScriptedModelService {
    async fn invoke(&self, role: ModelRole, prompt: &ChatPrompt) -> Result<String, ModelError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ScriptedCall {
                role,
                prompt: prompt.clone(),
            });

        let next = self
            .queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&role)
            .and_then(VecDeque::pop_front);

        next.unwrap_or_else(|| {
            Err(ModelError::Response(format!(
                "no scripted response left for role '{role}'"
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn responses_replay_in_order_per_role() {
        let service = ScriptedModelService::new()
            .with_responses(ModelRole::Coder, ["a", "b"])
            .with_response(ModelRole::Planner, "plan");
        let prompt = ChatPrompt::new("sys", "go");

        assert_eq!(service.invoke(ModelRole::Coder, &prompt).await.unwrap(), "a");
        assert_eq!(service.invoke(ModelRole::Planner, &prompt).await.unwrap(), "plan");
        assert_eq!(service.invoke(ModelRole::Coder, &prompt).await.unwrap(), "b");
        assert_eq!(service.remaining(ModelRole::Coder), 0);
    }

    #[tokio::test]
    async fn exhausted_queue_is_response_error() {
        let service = ScriptedModelService::new();
        let err = service
            .invoke(ModelRole::Router, &ChatPrompt::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Response(msg) if msg.contains("router")));
    }

    #[tokio::test]
    async fn queued_errors_are_returned_and_calls_recorded() {
        let service = ScriptedModelService::new()
            .with_error(ModelRole::Planner, ModelError::ModelUnavailable("x".into()));
        let prompt = ChatPrompt::new("sys", "make a plan");

        let err = service.invoke(ModelRole::Planner, &prompt).await.unwrap_err();

        assert_eq!(err, ModelError::ModelUnavailable("x".into()));
        let calls = service.calls_for(ModelRole::Planner);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].prompt.user_content(), Some("make a plan"));
        assert!(service.calls_for(ModelRole::Coder).is_empty());
    }
}
