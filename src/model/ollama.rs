//! Ollama HTTP backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::registry::{ModelBackend, ModelHandle, ModelsConfig};
use super::{ChatMessage, ChatPrompt, ModelError, ModelRole};

const TAGS_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Connects to models served by an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    client: reqwest::Client,
    host: String,
    verify_connection: bool,
}

impl OllamaBackend {
    /// Creates a backend for the server at `host`.
    pub fn new(host: impl Into<String>, request_timeout: Duration) -> Result<Self, ModelError> {
        let host = host.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ModelError::Connection {
                host: host.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            host,
            verify_connection: true,
        })
    }

    /// Sets whether `connect` checks the server and model first.
    pub fn with_verify_connection(mut self, verify: bool) -> Self {
        self.verify_connection = verify;
        self
    }

    /// Base URL of the server.
    pub fn host(&self) -> &str {
        &self.host
    }

    fn connection_error(&self, err: impl std::fmt::Display) -> ModelError {
        ModelError::Connection {
            host: self.host.clone(),
            message: err.to_string(),
        }
    }

    /// Lists the models the server has pulled.
    pub async fn list_models(&self) -> Result<Vec<String>, ModelError> {
        let url = format!("{}/api/tags", self.host);
        let resp = self
            .client
            .get(&url)
            .timeout(TAGS_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.connection_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(self.connection_error(format!("GET /api/tags returned {status}")));
        }

        let tags: TagsResponse = resp
            .json()
            .await
            .map_err(|e| ModelError::Response(format!("invalid /api/tags body: {e}")))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Reports server reachability and per-role model availability.
    ///
    /// Never fails: an unreachable server is reported, not returned as an error.
    pub async fn health_check(&self, models: &ModelsConfig) -> HealthReport {
        let available = match self.list_models().await {
            Ok(available) => Some(available),
            Err(e) => {
                tracing::warn!(host = %self.host, error = %e, "model server health check failed");
                None
            }
        };

        let roles = ModelRole::ALL
            .iter()
            .map(|&role| {
                let model = models.model_for(role).map(str::to_string);
                let available = match (&model, &available) {
                    (Some(model), Some(list)) => is_model_listed(list, model),
                    _ => false,
                };
                RoleHealth {
                    role,
                    model,
                    available,
                }
            })
            .collect();

        HealthReport {
            host: self.host.clone(),
            server_reachable: available.is_some(),
            available_models: available.unwrap_or_default(),
            roles,
        }
    }
}

#[async_trait]
impl ModelBackend for OllamaBackend {
    type Handle = OllamaModel;

    async fn connect(&self, model: &str) -> Result<OllamaModel, ModelError> {
        if self.verify_connection {
            let available = self.list_models().await?;
            if !is_model_listed(&available, model) {
                return Err(ModelError::ModelUnavailable(model.to_string()));
            }
        }

        Ok(OllamaModel {
            client: self.client.clone(),
            host: self.host.clone(),
            model: model.to_string(),
        })
    }
}

/// Handle to one model on an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaModel {
    client: reqwest::Client,
    host: String,
    model: String,
}

#[async_trait]
impl ModelHandle for OllamaModel {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &ChatPrompt) -> Result<String, ModelError> {
        let url = format!("{}/api/chat", self.host);
        let body = chat_request(&self.model, prompt);

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Connection {
                host: self.host.clone(),
                message: e.to_string(),
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| ModelError::Connection {
            host: self.host.clone(),
            message: e.to_string(),
        })?;

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ModelError::ModelUnavailable(self.model.clone()));
        }
        if !status.is_success() {
            return Err(ModelError::Response(format!("ollama returned {status}: {text}")));
        }

        parse_chat_response(&text)
    }
}

fn chat_request<'a>(model: &'a str, prompt: &'a ChatPrompt) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: &prompt.messages,
        stream: false,
        format: prompt.json_output.then_some("json"),
    }
}

fn parse_chat_response(text: &str) -> Result<String, ModelError> {
    let parsed: ChatResponse = serde_json::from_str(text)
        .map_err(|e| ModelError::Response(format!("invalid /api/chat body: {e}")))?;
    Ok(parsed.message.content)
}

/// Ollama reports untagged pulls as `name:latest`.
fn is_model_listed(available: &[String], model: &str) -> bool {
    available
        .iter()
        .any(|name| name == model || name.strip_suffix(":latest") == Some(model))
}

/// Availability of one role's model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleHealth {
    pub role: ModelRole,
    pub model: Option<String>,
    pub available: bool,
}

/// Result of [`OllamaBackend::health_check`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub host: String,
    pub server_reachable: bool,
    pub available_models: Vec<String>,
    pub roles: Vec<RoleHealth>,
}

impl HealthReport {
    /// True when the server is up and every configured role model is pulled.
    pub fn is_healthy(&self) -> bool {
        self.server_reachable && self.roles.iter().all(|r| r.available)
    }
}
