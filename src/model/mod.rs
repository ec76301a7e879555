//! Role-keyed access to a text-generation backend.
//!
//! The orchestrator only sees [`ModelService`]. Production code goes through a
//! [`ModelRegistry`], which maps each [`ModelRole`] to a configured model and
//! caches one connected handle per role; tests use [`ScriptedModelService`].

mod ollama;
mod registry;
mod scripted;

pub use ollama::{HealthReport, OllamaBackend, OllamaModel, RoleHealth};
pub use registry::{ModelBackend, ModelHandle, ModelRegistry, ModelsConfig};
pub use scripted::{ScriptedCall, ScriptedModelService};

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The task a model is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    /// Turns a request into a step list.
    Planner,
    /// Writes code for one step.
    Coder,
    /// Reserved for model-assisted routing.
    Router,
}

impl ModelRole {
    /// All roles, in configuration order.
    pub const ALL: [ModelRole; 3] = [ModelRole::Planner, ModelRole::Coder, ModelRole::Router];

    /// Returns the lowercase role name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelRole::Planner => "planner",
            ModelRole::Coder => "coder",
            ModelRole::Router => "router",
        }
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message of a structured prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// A structured prompt sent to a model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPrompt {
    /// Messages in conversation order.
    pub messages: Vec<ChatMessage>,
    /// Ask the backend to constrain output to JSON.
    #[serde(default)]
    pub json_output: bool,
}

impl ChatPrompt {
    /// Creates a prompt from a system and a user message.
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            json_output: false,
        }
    }

    /// Requests JSON output.
    pub fn expect_json(mut self) -> Self {
        self.json_output = true;
        self
    }

    /// Returns the content of the last user message.
    pub fn user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
    }
}

/// Failures of the model service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The backend could not be reached.
    #[error("model service unreachable at {host}: {message}")]
    Connection { host: String, message: String },

    /// The backend does not serve the requested model.
    #[error("model '{0}' is not available")]
    ModelUnavailable(String),

    /// No model is configured for the role.
    #[error("no model configured for role '{0}'")]
    NoModelForRole(ModelRole),

    /// The backend answered with something unusable.
    #[error("unusable model response: {0}")]
    Response(String),
}

/// Asynchronous, role-keyed text generation.
#[async_trait]
pub trait ModelService: Send + Sync {
    /// Sends a prompt to the model configured for `role` and returns its text.
    async fn invoke(&self, role: ModelRole, prompt: &ChatPrompt) -> Result<String, ModelError>;
}
