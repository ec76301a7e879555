//! YAML scenario fixtures for end-to-end runs against scripted models.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agent::{RunReport, RunStatus};
use crate::config::ValidationResult;
use crate::error::{Error, Result};
use crate::model::{ModelRole, ScriptedModelService};

/// What a scenario's run must look like when it finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expectation {
    pub status: RunStatus,

    /// `RunError::kind()` of the terminal error, if the run must fail.
    #[serde(default)]
    pub error_kind: Option<String>,

    /// Substring the error message must contain.
    #[serde(default)]
    pub error_contains: Option<String>,

    #[serde(default)]
    pub current_step: Option<usize>,

    /// Number of recorded execution results.
    #[serde(default)]
    pub results: Option<usize>,

    /// Substrings the last step's stdout must contain.
    #[serde(default)]
    pub stdout_contains: Vec<String>,
}

/// A scripted end-to-end run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    pub prompt: String,

    /// Raw planner output.
    pub planner_response: String,

    /// Raw coder outputs, one per step.
    #[serde(default)]
    pub coder_responses: Vec<String>,

    /// Whether the scenario actually runs code and needs an interpreter.
    #[serde(default)]
    pub requires_python: bool,

    pub expect: Expectation,
}

impl Scenario {
    /// Loads a scenario from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse scenario: {}", e)))
    }

    /// Loads every `.yaml`/`.yml` file in `dir`, sorted by file name.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Vec<Self>> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            let is_yaml = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            );
            if is_yaml {
                paths.push(path);
            }
        }
        paths.sort();
        paths.iter().map(Self::load).collect()
    }

    /// Builds a model service that replays this scenario's responses.
    pub fn model_service(&self) -> ScriptedModelService {
        ScriptedModelService::new()
            .with_response(ModelRole::Planner, self.planner_response.clone())
            .with_responses(ModelRole::Coder, self.coder_responses.iter().cloned())
    }

    /// Compares a finished run against the expectation.
    pub fn check(&self, report: &RunReport) -> ValidationResult {
        let mut result = ValidationResult::default();
        let expect = &self.expect;
        let state = &report.state;

        if report.status != expect.status {
            result.add_error(format!(
                "status: expected {:?}, got {:?} (error: {:?})",
                expect.status,
                report.status,
                report.error().map(ToString::to_string)
            ));
        }

        match (&expect.error_kind, report.error()) {
            (Some(kind), Some(err)) if err.kind() != kind.as_str() => {
                result.add_error(format!("error kind: expected {kind}, got {}", err.kind()))
            }
            (Some(kind), None) => result.add_error(format!("error kind: expected {kind}, got none")),
            (None, Some(err)) if expect.status == RunStatus::Done => {
                result.add_error(format!("unexpected error: {err}"))
            }
            _ => {}
        }

        if let Some(needle) = &expect.error_contains {
            let message = report.error().map(ToString::to_string).unwrap_or_default();
            if !message.contains(needle.as_str()) {
                result.add_error(format!("error message '{message}' does not contain '{needle}'"));
            }
        }

        if let Some(step) = expect.current_step {
            if state.current_step() != step {
                result.add_error(format!(
                    "current_step: expected {step}, got {}",
                    state.current_step()
                ));
            }
        }

        if let Some(count) = expect.results {
            if state.history().len() != count {
                result.add_error(format!(
                    "results: expected {count}, got {}",
                    state.history().len()
                ));
            }
        }

        if !expect.stdout_contains.is_empty() {
            let stdout = state
                .execution_result()
                .map(|r| r.stdout.as_str())
                .unwrap_or_default();
            for needle in &expect.stdout_contains {
                if !stdout.contains(needle.as_str()) {
                    result.add_error(format!("stdout does not contain '{needle}'"));
                }
            }
        }

        if self.coder_responses.len() > state.history().len() + usize::from(report.error().is_some()) {
            result.add_warning("scenario has unused coder responses");
        }

        result
    }
}
