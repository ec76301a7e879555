//! The plan, code, execute loop.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::model::{ModelRole, ModelService};
use crate::sandbox::CodeExecutor;

use super::event::AgentEvent;
use super::parse::{parse_plan, strip_code_fences};
use super::prompts::{CoderPromptBuilder, PlannerPromptBuilder};
use super::state::{route, AgentState, Phase, Route, RunError, RunRequest};

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Done,
    Failed,
}

/// Everything a caller gets back from a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    pub state: AgentState,
    /// RFC 3339 timestamp.
    pub started_at: String,
    /// RFC 3339 timestamp.
    pub finished_at: String,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Done
    }

    pub fn error(&self) -> Option<&RunError> {
        self.state.error()
    }
}

/// Drives a run through planning, code generation, execution and routing.
///
/// A run is strictly sequential. Model calls are the suspension points, so a
/// caller may interleave several runs on one runtime.
pub struct Orchestrator<M: ?Sized, E: ?Sized> {
    models: Arc<M>,
    executor: Arc<E>,
    events: Option<mpsc::Sender<AgentEvent>>,
}

impl<M, E> Orchestrator<M, E>
where
    M: ModelService + ?Sized,
    E: CodeExecutor + ?Sized,
{
    /// Creates an orchestrator over a model service and an executor.
    pub fn new(models: Arc<M>, executor: Arc<E>) -> Self {
        Self {
            models,
            executor,
            events: None,
        }
    }

    /// Sends progress events to `sender`.
    pub fn with_events(mut self, sender: mpsc::Sender<AgentEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Runs a request to completion.
    ///
    /// Never returns an error: failures are recorded on the returned state.
    pub async fn run(&self, request: RunRequest) -> RunReport {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = chrono::Utc::now().to_rfc3339();
        let mut state = AgentState::new(&request);

        tracing::info!(run_id = %run_id, executor = %self.executor.name(), "starting run");

        let mut phase = Phase::Planning;
        let status = loop {
            tracing::debug!(run_id = %run_id, phase = phase.name(), step = state.current_step(), "entering phase");
            phase = match phase {
                Phase::Planning => self.plan(&mut state).await,
                Phase::Coding => self.generate(&mut state).await,
                Phase::Executing { code } => self.execute(&mut state, code).await,
                Phase::Routing => match route(&state) {
                    Route::Coding => Phase::Coding,
                    Route::End if state.error().is_some() => Phase::Failed,
                    Route::End => Phase::Done,
                },
                Phase::Done => break RunStatus::Done,
                Phase::Failed => {
                    if let Some(err) = state.error() {
                        tracing::error!(run_id = %run_id, kind = err.kind(), error = %err, "run failed");
                        let event = AgentEvent::Error {
                            kind: err.kind().to_string(),
                            message: err.to_string(),
                        };
                        self.emit(event).await;
                    }
                    break RunStatus::Failed;
                }
            };
        };

        if status == RunStatus::Done {
            tracing::info!(run_id = %run_id, steps = state.current_step(), "run complete");
        }

        RunReport {
            run_id,
            status,
            state,
            started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    async fn plan(&self, state: &mut AgentState) -> Phase {
        let prompt = PlannerPromptBuilder::new(&state.original_prompt).build();

        let output = match self.models.invoke(ModelRole::Planner, &prompt).await {
            Ok(output) => output,
            Err(e) => {
                state.fail(RunError::Planning(e.to_string()));
                return Phase::Failed;
            }
        };

        match parse_plan(&output) {
            Ok(plan) => {
                tracing::info!(steps = plan.len(), "plan created");
                self.emit(AgentEvent::Plan {
                    steps: plan.steps().to_vec(),
                })
                .await;
                state.set_plan(plan);
                Phase::Coding
            }
            Err(reason) => {
                tracing::warn!(reason = %reason, raw = %output, "planner output rejected");
                state.fail(RunError::Planning(reason));
                Phase::Failed
            }
        }
    }

    async fn generate(&self, state: &mut AgentState) -> Phase {
        let step = state.current_step();
        let prompt = match state.plan() {
            Some(plan) if step < plan.len() => {
                let mut builder = CoderPromptBuilder::new(plan, step);
                if let Some(previous) = state.execution_result() {
                    builder = builder.with_previous_output(previous.stdout.clone());
                }
                builder.build()
            }
            _ => {
                state.fail(RunError::Generation(format!("no plan step at index {step}")));
                return Phase::Routing;
            }
        };

        let code = match self.models.invoke(ModelRole::Coder, &prompt).await {
            Ok(output) => strip_code_fences(&output),
            Err(e) => {
                state.fail(RunError::Generation(e.to_string()));
                return Phase::Routing;
            }
        };

        if code.is_empty() {
            state.fail(RunError::Generation("the model returned no code".to_string()));
            return Phase::Routing;
        }

        tracing::info!(step, bytes = code.len(), "generated code");
        state.record_code(code.clone());
        self.emit(AgentEvent::Code {
            step,
            code: code.clone(),
        })
        .await;

        Phase::Executing { code }
    }

    async fn execute(&self, state: &mut AgentState, code: String) -> Phase {
        let step = state.current_step();

        match self.executor.execute(&code).await {
            Ok(result) => {
                tracing::info!(
                    step,
                    exit_code = result.exit_code,
                    duration_ms = result.duration.as_millis() as u64,
                    "step executed"
                );
                state.record_execution(result.clone());
                self.emit(AgentEvent::Result { step, result }).await;
            }
            Err(e) => {
                tracing::warn!(step, kind = e.kind(), error = %e, "execution failed");
                state.fail(RunError::from(e));
            }
        }

        Phase::Routing
    }

    async fn emit(&self, event: AgentEvent) {
        if let Some(sender) = &self.events {
            if sender.send(event).await.is_err() {
                tracing::debug!("event receiver dropped");
            }
        }
    }
}
