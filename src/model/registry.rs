//! Explicit registry of model handles keyed by role.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{ChatPrompt, ModelError, ModelRole, ModelService};

/// Model identifiers per role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_model")]
    pub planner: String,
    #[serde(default = "default_model")]
    pub coder: String,
    #[serde(default = "default_model")]
    pub router: String,
}

fn default_model() -> String {
    "llama3.2".to_string()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            planner: default_model(),
            coder: default_model(),
            router: default_model(),
        }
    }
}

impl ModelsConfig {
    /// Uses the same model for every role.
    pub fn uniform(model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            planner: model.clone(),
            coder: model.clone(),
            router: model,
        }
    }

    /// Returns the configured model for `role`, or `None` if blank.
    pub fn model_for(&self, role: ModelRole) -> Option<&str> {
        let model = match role {
            ModelRole::Planner => &self.planner,
            ModelRole::Coder => &self.coder,
            ModelRole::Router => &self.router,
        };
        let model = model.trim();
        (!model.is_empty()).then_some(model)
    }

    /// Replaces the model for `role`.
    pub fn set(&mut self, role: ModelRole, model: impl Into<String>) {
        let model = model.into();
        match role {
            ModelRole::Planner => self.planner = model,
            ModelRole::Coder => self.coder = model,
            ModelRole::Router => self.router = model,
        }
    }
}

/// A connected model ready to generate text.
#[async_trait]
pub trait ModelHandle: Send + Sync {
    /// Model identifier this handle talks to.
    fn model(&self) -> &str;

    /// Generates a response to `prompt`.
    async fn generate(&self, prompt: &ChatPrompt) -> Result<String, ModelError>;
}

/// Creates handles for model identifiers.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Handle type produced by this backend.
    type Handle: ModelHandle + 'static;

    /// Connects to `model`, verifying availability if the backend supports it.
    async fn connect(&self, model: &str) -> Result<Self::Handle, ModelError>;
}

/// Lazily connected, per-role cache of model handles.
///
/// The registry is an ordinary value handed to whoever needs it, so tests and
/// individual runs can build their own with different backends or overrides.
pub struct ModelRegistry<B: ModelBackend> {
    backend: B,
    models: ModelsConfig,
    handles: RwLock<HashMap<ModelRole, Arc<B::Handle>>>,
}

impl<B: ModelBackend> ModelRegistry<B> {
    /// Creates an empty registry.
    pub fn new(backend: B, models: ModelsConfig) -> Self {
        Self {
            backend,
            models,
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Overrides the model for one role.
    pub fn with_override(mut self, role: ModelRole, model: impl Into<String>) -> Self {
        self.models.set(role, model);
        self
    }

    /// Returns the role-to-model mapping.
    pub fn models(&self) -> &ModelsConfig {
        &self.models
    }

    /// Returns the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the handle for `role`, connecting on first use.
    pub async fn handle(&self, role: ModelRole) -> Result<Arc<B::Handle>, ModelError> {
        if let Some(handle) = self.handles.read().await.get(&role) {
            return Ok(Arc::clone(handle));
        }

        let model = self
            .models
            .model_for(role)
            .ok_or(ModelError::NoModelForRole(role))?;

        tracing::info!(role = %role, model = %model, "initializing model handle");
        let handle = Arc::new(self.backend.connect(model).await?);

        // another task may have connected meanwhile; keep whichever landed first
        let mut handles = self.handles.write().await;
        let handle = handles.entry(role).or_insert(handle);
        Ok(Arc::clone(handle))
    }

    /// Returns the number of cached handles.
    pub async fn cached(&self) -> usize {
        self.handles.read().await.len()
    }

    /// Returns true if a handle for `role` is cached.
    pub async fn is_cached(&self, role: ModelRole) -> bool {
        self.handles.read().await.contains_key(&role)
    }

    /// Drops all cached handles.
    pub async fn clear(&self) {
        self.handles.write().await.clear();
        tracing::info!("model handle cache cleared");
    }
}

#[async_trait]
impl<B: ModelBackend> ModelService for ModelRegistry<B> {
    async fn invoke(&self, role: ModelRole, prompt: &ChatPrompt) -> Result<String, ModelError> {
        let handle = self.handle(role).await?;
        tracing::debug!(role = %role, model = %handle.model(), "invoking model");
        handle.generate(prompt).await
    }
}
