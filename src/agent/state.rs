//! Run context threaded through the orchestrator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{Error, Result};
use crate::sandbox::{ExecutionError, ExecutionResult};

/// A natural-language request accepted for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    prompt: String,
}

impl RunRequest {
    /// Accepts `prompt` unless it is blank.
    pub fn new(prompt: impl Into<String>) -> Result<Self> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(Error::InvalidRequest("prompt is empty".to_string()));
        }
        Ok(Self { prompt })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

/// Why a plan could not be constructed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("plan contains no steps")]
    Empty,

    #[error("plan step {0} is blank")]
    BlankStep(usize),
}

/// Ordered, immutable list of step descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    steps: Vec<String>,
}

impl Plan {
    /// Builds a plan, rejecting empty lists and blank steps.
    pub fn new<I, S>(steps: I) -> std::result::Result<Self, PlanError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let steps: Vec<String> = steps.into_iter().map(Into::into).collect();
        if steps.is_empty() {
            return Err(PlanError::Empty);
        }
        if let Some(idx) = steps.iter().position(|s| s.trim().is_empty()) {
            return Err(PlanError::BlankStep(idx));
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, index: usize) -> Option<&str> {
        self.steps.get(index).map(String::as_str)
    }
}

impl<'de> Deserialize<'de> for Plan {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            steps: Vec<String>,
        }
        let raw = Raw::deserialize(deserializer)?;
        Plan::new(raw.steps).map_err(serde::de::Error::custom)
    }
}

/// Terminal failure of a run, with a message suitable for direct display.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum RunError {
    /// The planner produced no usable plan.
    #[error("The AI planner failed to create a valid plan: {0}")]
    #[serde(rename = "planning_error")]
    Planning(String),

    /// The coder produced no usable code.
    #[error("Code generation failed: {0}")]
    #[serde(rename = "generation_error")]
    Generation(String),

    /// The safety gate rejected the generated code.
    #[error("Execution blocked by static analysis: {0}")]
    SafetyViolation(String),

    /// The code ran past its time budget.
    #[error("Code execution timed out: {0}")]
    Timeout(String),

    /// The interpreter could not be started.
    #[error("Failed to start the sandbox interpreter: {0}")]
    #[serde(rename = "spawn_failure")]
    Spawn(String),

    /// The environment refused access.
    #[error("Permission denied while executing code: {0}")]
    #[serde(rename = "permission_failure")]
    Permission(String),

    /// Unclassified execution failure.
    #[error("Failed to execute code: {0}")]
    #[serde(rename = "unknown_execution_error")]
    UnknownExecution(String),
}

impl RunError {
    /// Stable short name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Planning(_) => "planning_error",
            Self::Generation(_) => "generation_error",
            Self::SafetyViolation(_) => "safety_violation",
            Self::Timeout(_) => "timeout",
            Self::Spawn(_) => "spawn_failure",
            Self::Permission(_) => "permission_failure",
            Self::UnknownExecution(_) => "unknown_execution_error",
        }
    }
}

impl From<ExecutionError> for RunError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::SafetyViolation(reason) => Self::SafetyViolation(reason),
            ExecutionError::Timeout(d) => {
                Self::Timeout(format!("exceeded {} seconds", d.as_secs_f64()))
            }
            ExecutionError::SpawnFailure(msg) => Self::Spawn(msg),
            ExecutionError::PermissionFailure(msg) => Self::Permission(msg),
            ExecutionError::Unknown(msg) => Self::UnknownExecution(msg),
        }
    }
}

/// One executed step of the trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: usize,
    pub description: String,
    pub code: String,
    pub result: ExecutionResult,
}

/// Mutable context of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub original_prompt: String,
    plan: Option<Plan>,
    current_step: usize,
    generated_code: Option<String>,
    execution_result: Option<ExecutionResult>,
    error: Option<RunError>,
    history: Vec<StepRecord>,
}

impl AgentState {
    /// Creates the initial state for a request.
    pub fn new(request: &RunRequest) -> Self {
        Self {
            original_prompt: request.prompt().to_string(),
            plan: None,
            current_step: 0,
            generated_code: None,
            execution_result: None,
            error: None,
            history: Vec::new(),
        }
    }

    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn generated_code(&self) -> Option<&str> {
        self.generated_code.as_deref()
    }

    pub fn execution_result(&self) -> Option<&ExecutionResult> {
        self.execution_result.as_ref()
    }

    pub fn error(&self) -> Option<&RunError> {
        self.error.as_ref()
    }

    /// Executed steps, in order.
    pub fn history(&self) -> &[StepRecord] {
        &self.history
    }

    /// Number of steps in the plan, zero when there is none.
    pub fn plan_len(&self) -> usize {
        self.plan.as_ref().map_or(0, Plan::len)
    }

    /// Description of the step at `current_step`.
    pub fn current_step_description(&self) -> Option<&str> {
        self.plan.as_ref()?.step(self.current_step)
    }

    /// Installs the plan. A plan is set once; later calls are ignored.
    pub fn set_plan(&mut self, plan: Plan) {
        if self.plan.is_some() {
            tracing::warn!("ignoring attempt to replace the run plan");
            return;
        }
        self.plan = Some(plan);
    }

    /// Records the code generated for the current step.
    pub fn record_code(&mut self, code: impl Into<String>) {
        self.generated_code = Some(code.into());
    }

    /// Records a completed execution and advances to the next step.
    ///
    /// Does nothing once an error is set.
    pub fn record_execution(&mut self, result: ExecutionResult) {
        if self.error.is_some() {
            return;
        }

        let record = StepRecord {
            step: self.current_step,
            description: self.current_step_description().unwrap_or_default().to_string(),
            code: self.generated_code.clone().unwrap_or_default(),
            result: result.clone(),
        };
        self.history.push(record);
        self.execution_result = Some(result);
        self.current_step += 1;
    }

    /// Marks the run as failed. The first error wins.
    pub fn fail(&mut self, error: RunError) {
        if let Some(existing) = &self.error {
            tracing::warn!(
                existing = %existing,
                ignored = %error,
                "run already failed; keeping first error"
            );
            return;
        }
        self.error = Some(error);
    }
}

/// Stage of the orchestrator loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Planning,
    Coding,
    Executing { code: String },
    Routing,
    Done,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Planning => "planning",
            Phase::Coding => "coding",
            Phase::Executing { .. } => "executing",
            Phase::Routing => "routing",
            Phase::Done => "done",
            Phase::Failed => "failed",
        }
    }
}

/// Routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Generate code for `current_step`.
    Coding,
    /// Stop the run.
    End,
}

/// Decides whether the run continues. Pure.
pub fn route(state: &AgentState) -> Route {
    if state.error().is_some() {
        return Route::End;
    }
    if state.current_step() >= state.plan_len() {
        return Route::End;
    }
    Route::Coding
}
