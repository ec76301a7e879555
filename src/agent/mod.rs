//! Agent orchestration.
//!
//! A run moves through an explicit [`Phase`] state machine:
//!
//! ```text
//! Planning ──► Coding ──► Executing ──► Routing ──► Coding ...
//!    │                                     │
//!    └──► Failed ◄─────── error ───────────┤
//!                                          └──► Done
//! ```
//!
//! [`route`] is the only place that decides whether a run continues.

mod event;
mod orchestrator;
mod parse;
mod prompts;
mod state;

pub use event::AgentEvent;
pub use orchestrator::{Orchestrator, RunReport, RunStatus};
pub use parse::{parse_plan, strip_code_fences};
pub use prompts::{CoderPromptBuilder, PlannerPromptBuilder};
pub use state::{route, AgentState, Phase, Plan, PlanError, Route, RunError, RunRequest, StepRecord};
