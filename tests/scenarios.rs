//! Scenario tests: full runs against scripted models and the real sandbox.
//!
//! Each YAML file in `tests/fixtures/` scripts the planner and coder output and
//! states what the finished run must look like. Scenarios that execute code
//! are skipped when no Python interpreter is available.
//!
//! Run with: `cargo test --test scenarios`

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use codeloop::{
    ModelRole, Orchestrator, RunRequest, SafetyAnalyzer, SandboxConfig, SandboxRunner, Scenario,
};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn python_available() -> bool {
    std::process::Command::new(SandboxConfig::default().interpreter)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

async fn run_scenario(scenario: &Scenario, workspace: &TempDir) -> Vec<String> {
    let models = Arc::new(scenario.model_service());
    let runner = Arc::new(SandboxRunner::new(
        SandboxConfig::new(workspace.path()).with_timeout(std::time::Duration::from_secs(20)),
        SafetyAnalyzer::default(),
    ));

    let report = Orchestrator::new(Arc::clone(&models), runner)
        .run(RunRequest::new(&scenario.prompt).unwrap())
        .await;

    let mut problems: Vec<String> = scenario
        .check(&report)
        .errors
        .into_iter()
        .map(|e| format!("{}: {}", scenario.name, e))
        .collect();

    // planning failures must never reach the coder
    if report.error().map(|e| e.kind()) == Some("planning_error")
        && !models.calls_for(ModelRole::Coder).is_empty()
    {
        problems.push(format!("{}: coder invoked after planning failed", scenario.name));
    }

    problems
}

#[tokio::test]
async fn all_fixtures_pass() {
    let scenarios = Scenario::load_dir(fixtures_dir()).expect("failed to load fixtures");
    assert!(scenarios.len() >= 5, "expected the bundled fixtures");

    let have_python = python_available();
    let mut failures = Vec::new();

    for scenario in &scenarios {
        if scenario.requires_python && !have_python {
            eprintln!("skipping {}: no python interpreter", scenario.name);
            continue;
        }

        let workspace = TempDir::new().unwrap();
        failures.extend(run_scenario(scenario, &workspace).await);

        let leftovers = std::fs::read_dir(workspace.path()).unwrap().count();
        if leftovers != 0 {
            failures.push(format!("{}: {} files left in workspace", scenario.name, leftovers));
        }
    }

    assert!(failures.is_empty(), "scenario failures:\n{}", failures.join("\n"));
}

#[tokio::test]
async fn denied_import_stops_at_first_step() {
    let scenario = Scenario::load(fixtures_dir().join("denied_import.yaml")).unwrap();
    let workspace = TempDir::new().unwrap();

    let problems = run_scenario(&scenario, &workspace).await;

    assert!(problems.is_empty(), "{problems:?}");
}

#[tokio::test]
async fn empty_plan_never_generates_code() {
    let scenario = Scenario::load(fixtures_dir().join("empty_plan.yaml")).unwrap();
    let models = Arc::new(scenario.model_service());
    let workspace = TempDir::new().unwrap();
    let runner = Arc::new(SandboxRunner::new(
        SandboxConfig::new(workspace.path().join("ws")),
        SafetyAnalyzer::default(),
    ));

    let report = Orchestrator::new(Arc::clone(&models), runner)
        .run(RunRequest::new(&scenario.prompt).unwrap())
        .await;

    assert_eq!(report.error().unwrap().kind(), "planning_error");
    assert!(models.calls_for(ModelRole::Coder).is_empty());
    assert!(!workspace.path().join("ws").exists());
}
