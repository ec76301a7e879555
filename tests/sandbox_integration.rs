//! Integration tests for the sandbox runner against a real interpreter.
//!
//! Tests that need Python skip themselves when `python3` cannot be started.

use std::time::{Duration, Instant};

use tempfile::TempDir;

use codeloop::sandbox::report::{parse_report, render_report};
use codeloop::{
    CodeExecutor, DenyList, ExecutionError, SafetyAnalyzer, SandboxConfig, SandboxRunner,
};

fn python_available() -> bool {
    std::process::Command::new(SandboxConfig::default().interpreter)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

macro_rules! require_python {
    () => {
        if !python_available() {
            eprintln!("skipping: no python interpreter");
            return;
        }
    };
}

fn runner(dir: &TempDir) -> SandboxRunner {
    SandboxRunner::new(SandboxConfig::new(dir.path()), SafetyAnalyzer::default())
}

/// A runner whose gate only parses, for probing the interpreter itself.
fn unguarded_runner(dir: &TempDir) -> SandboxRunner {
    SandboxRunner::new(
        SandboxConfig::new(dir.path()),
        SafetyAnalyzer::new(DenyList::empty()),
    )
}

fn workspace_is_empty(dir: &TempDir) -> bool {
    std::fs::read_dir(dir.path()).unwrap().count() == 0
}

#[tokio::test]
async fn stdout_and_stderr_are_captured_separately() {
    require_python!();
    let dir = TempDir::new().unwrap();

    let result = runner(&dir)
        .execute("import warnings\nprint('to stdout')\nwarnings.warn('to stderr')")
        .await
        .unwrap();

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "to stdout");
    assert!(result.stderr.contains("to stderr"));
    assert!(workspace_is_empty(&dir));
}

#[tokio::test]
async fn runtime_exception_is_a_result() {
    require_python!();
    let dir = TempDir::new().unwrap();

    let result = runner(&dir).execute("print(1 / 0)").await.unwrap();

    assert_eq!(result.exit_code, 1);
    assert!(result.stderr.contains("ZeroDivisionError"));
    assert!(workspace_is_empty(&dir));
}

#[tokio::test]
async fn timeout_kills_the_child_and_cleans_up() {
    require_python!();
    let dir = TempDir::new().unwrap();
    let runner = runner(&dir);

    let start = Instant::now();
    let err = runner
        .run_with_timeout("import time\ntime.sleep(30)", Duration::from_secs(1))
        .await
        .unwrap_err();

    assert_eq!(err, ExecutionError::Timeout(Duration::from_secs(1)));
    assert!(start.elapsed() < Duration::from_secs(10));
    assert!(workspace_is_empty(&dir));
}

/// Whether `pid` names a live process; zombies count as gone.
#[cfg(target_os = "linux")]
fn process_is_running(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        // the state field follows the parenthesized command name
        Ok(stat) => stat
            .rsplit_once(") ")
            .map(|(_, rest)| !rest.starts_with('Z') && !rest.starts_with('X'))
            .unwrap_or(false),
        Err(_) => false,
    }
}

#[cfg(target_os = "linux")]
async fn wait_until_gone(pid: u32) -> bool {
    for _ in 0..40 {
        if !process_is_running(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[cfg(target_os = "linux")]
fn read_pids(dir: &TempDir, name: &str) -> Vec<u32> {
    std::fs::read_to_string(dir.path().join(name))
        .unwrap()
        .split_whitespace()
        .map(|p| p.parse().unwrap())
        .collect()
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn timeout_leaves_no_live_processes() {
    require_python!();
    let dir = TempDir::new().unwrap();
    let code = "\
import os, subprocess, time
sleeper = subprocess.Popen(['sleep', '30'])
with open('pids.txt', 'w') as f:
    f.write(f'{os.getpid()} {sleeper.pid}')
time.sleep(30)
";

    let start = Instant::now();
    let err = unguarded_runner(&dir)
        .run_with_timeout(code, Duration::from_secs(2))
        .await
        .unwrap_err();

    assert_eq!(err, ExecutionError::Timeout(Duration::from_secs(2)));
    assert!(start.elapsed() < Duration::from_secs(6), "took {:?}", start.elapsed());
    for pid in read_pids(&dir, "pids.txt") {
        assert!(wait_until_gone(pid).await, "process {pid} outlived the timeout");
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn background_process_cannot_hold_the_call_open() {
    require_python!();
    let dir = TempDir::new().unwrap();
    let code = "\
import subprocess
sleeper = subprocess.Popen(['sleep', '30'])
with open('pids.txt', 'w') as f:
    f.write(str(sleeper.pid))
print('parent done')
";

    let start = Instant::now();
    let result = unguarded_runner(&dir)
        .run_with_timeout(code, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "parent done");
    assert!(start.elapsed() < Duration::from_secs(4), "took {:?}", start.elapsed());
    for pid in read_pids(&dir, "pids.txt") {
        assert!(wait_until_gone(pid).await, "background process {pid} survived the run");
    }
}

#[tokio::test]
async fn isolated_mode_ignores_python_environment() {
    require_python!();
    let dir = TempDir::new().unwrap();

    let result = unguarded_runner(&dir)
        .execute("import sys\nprint(sys.flags.isolated, sys.flags.dont_write_bytecode)")
        .await
        .unwrap();

    assert_eq!(result.stdout, "1 1");
}

#[tokio::test]
async fn concurrent_runs_share_a_workspace_without_collisions() {
    require_python!();
    let dir = TempDir::new().unwrap();
    let runner = std::sync::Arc::new(runner(&dir));

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let runner = std::sync::Arc::clone(&runner);
            tokio::spawn(async move { runner.execute(&format!("print({i} * 10)")).await })
        })
        .collect();

    let mut outputs = Vec::new();
    for task in tasks {
        outputs.push(task.await.unwrap().unwrap().stdout);
    }

    assert_eq!(outputs, vec!["0", "10", "20", "30"]);
    assert!(workspace_is_empty(&dir));
}

#[tokio::test]
async fn live_reports_parse_back() {
    require_python!();
    let dir = TempDir::new().unwrap();

    let outcome = unguarded_runner(&dir)
        .execute("import sys\nprint('out')\nprint('err', file=sys.stderr)\nraise SystemExit(4)")
        .await;
    let text = render_report(&outcome);
    let parsed = parse_report(&text).unwrap();

    assert!(text.contains("[stdout]\nout\n[stderr]\nerr"));
    assert_eq!(parsed.exit_code, 4);
    assert_eq!(parsed.stdout, "out");
    assert_eq!(parsed.stderr, "err");
}

#[tokio::test]
async fn blocked_code_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let workspace = dir.path().join("ws");
    let runner = SandboxRunner::new(SandboxConfig::new(&workspace), SafetyAnalyzer::default());

    for code in [
        "import shutil\nshutil.rmtree('/')",
        "from subprocess import run",
        "eval('1 + 1')",
        "x.system('ls')",
        "print(__builtins__)",
        "exec = print",
    ] {
        let err = runner.execute(code).await.unwrap_err();
        assert!(
            matches!(err, ExecutionError::SafetyViolation(_)),
            "{code:?} gave {err:?}"
        );
    }

    assert!(!workspace.exists());
}
