//! codeloop - plan, generate and execute Python code step by step
//!
//! Given a natural-language request, a planner model produces a list of steps,
//! a coder model writes Python for each step, and every fragment passes a
//! static safety gate before it runs in an isolated interpreter process.

pub mod agent;
pub mod config;
pub mod error;
pub mod fixture;
pub mod model;
pub mod safety;
pub mod sandbox;
pub mod worker;

pub use error::{Error, Result};

pub use agent::{
    AgentEvent, AgentState, Orchestrator, Phase, Plan, Route, RunError, RunReport, RunRequest,
    RunStatus, StepRecord,
};
pub use config::{AgentConfig, ExecutorMode, OllamaConfig, Validate, ValidationResult};
pub use fixture::Scenario;
pub use model::{
    ChatPrompt, ModelError, ModelRegistry, ModelRole, ModelService, ModelsConfig, OllamaBackend,
    ScriptedModelService,
};
pub use safety::{DenyList, SafetyAnalyzer, SafetyVerdict};
pub use sandbox::{CodeExecutor, ExecutionError, ExecutionResult, SandboxConfig, SandboxRunner};
pub use worker::{WorkerClient, WorkerServer};
