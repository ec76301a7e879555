//! Agent configuration: loading, environment overrides and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{ModelRole, ModelsConfig};
use crate::safety::DenyList;
use crate::sandbox::SandboxConfig;

/// Environment variable overriding the Ollama host.
pub const ENV_OLLAMA_HOST: &str = "OLLAMA_HOST";
/// Environment variable setting the model for every role.
pub const ENV_LLM_MODEL: &str = "LLM_MODEL";
/// Environment variable overriding the sandbox interpreter.
pub const ENV_PYTHON: &str = "CODELOOP_PYTHON";

/// Per-role model environment variables; applied after [`ENV_LLM_MODEL`].
pub const ENV_ROLE_MODELS: &[(ModelRole, &str)] = &[
    (ModelRole::Planner, "PLANNER_MODEL"),
    (ModelRole::Coder, "CODER_MODEL"),
    (ModelRole::Router, "ROUTER_MODEL"),
];

/// Where generated code is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorMode {
    /// A sandbox runner inside this process.
    #[default]
    Inline,
    /// A persistent `codeloop worker` child process.
    Worker,
}

/// Connection settings for the Ollama server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// Per-request timeout, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Check server and model availability before first use.
    #[serde(default = "default_verify_connection")]
    pub verify_connection: bool,
}

fn default_host() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_verify_connection() -> bool {
    true
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            request_timeout_secs: default_request_timeout_secs(),
            verify_connection: default_verify_connection(),
        }
    }
}

impl OllamaConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Complete configuration of the agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub safety: DenyList,
    #[serde(default)]
    pub executor: ExecutorMode,
}

impl AgentConfig {
    /// Loads a configuration file, choosing the format by extension.
    ///
    /// `.toml` is parsed as TOML; `.yaml` and `.yml` as YAML.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let config = match ext.as_deref() {
            Some("toml") => Self::from_toml(&text)?,
            Some("yaml") | Some("yml") => Self::from_yaml(&text)?,
            _ => return Err(Error::UnsupportedConfigFormat(path.to_path_buf())),
        };

        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(format!("invalid TOML: {e}")))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| Error::Config(format!("invalid YAML: {e}")))
    }

    /// Loads `path` if given, otherwise the defaults, then applies the
    /// process environment.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary variable lookup.
    ///
    /// Empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = get(ENV_OLLAMA_HOST) {
            self.ollama.host = normalize_host(&host);
        }
        if let Some(model) = get(ENV_LLM_MODEL) {
            self.models = ModelsConfig::uniform(model);
        }
        for (role, key) in ENV_ROLE_MODELS {
            if let Some(model) = get(key) {
                self.models.set(*role, model);
            }
        }
        if let Some(python) = get(ENV_PYTHON) {
            self.sandbox.interpreter = PathBuf::from(python);
        }
    }
}

/// Adds a scheme to bare `host:port` values, as the Ollama CLI accepts them.
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Merges another validation result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

impl Validate for ModelsConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        for role in [ModelRole::Planner, ModelRole::Coder] {
            if self.model_for(role).is_none() {
                result.add_error(format!("no model configured for role '{role}'"));
            }
        }
        // reserved role; only used once model-assisted routing exists
        if self.model_for(ModelRole::Router).is_none() {
            result.add_warning("no model configured for role 'router'");
        }

        result
    }
}

impl Validate for OllamaConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if !(self.host.starts_with("http://") || self.host.starts_with("https://")) {
            result.add_error(format!("ollama host '{}' must be an http(s) URL", self.host));
        }
        if self.request_timeout_secs == 0 {
            result.add_error("ollama request_timeout_secs must be at least 1");
        }

        result
    }
}

impl Validate for SandboxConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.interpreter.as_os_str().is_empty() {
            result.add_error("sandbox interpreter cannot be empty");
        }
        if self.workspace_dir.as_os_str().is_empty() {
            result.add_error("sandbox workspace_dir cannot be empty");
        }
        if self.timeout_secs == 0 {
            result.add_error("sandbox timeout_secs must be at least 1");
        }
        if self.timeout_secs > 600 {
            result.add_warning("sandbox timeout over 10 minutes may indicate a misconfiguration");
        }
        if self.max_output_bytes == 0 {
            result.add_warning("sandbox max_output_bytes = 0 discards all output");
        }
        if !self.isolated {
            result.add_warning("sandbox isolated mode is off; PYTHON* variables reach the child");
        }

        result
    }
}

impl Validate for DenyList {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.is_empty() {
            result.add_warning("safety deny list is empty; every parseable fragment is accepted");
        } else if self.modules.is_empty() {
            result.add_warning("safety deny list denies no modules");
        }

        result
    }
}

impl Validate for AgentConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();
        result.merge(self.models.validate());
        result.merge(self.ollama.validate());
        result.merge(self.sandbox.validate());
        result.merge(self.safety.validate());
        result
    }
}
