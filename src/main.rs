//! codeloop CLI
//!
//! Runs the plan, code, execute loop against an Ollama server, serves the
//! sandbox worker, and exposes the safety gate and a health check.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tokio::sync::mpsc;

use codeloop::{
    AgentConfig, AgentEvent, CodeExecutor, Error, ExecutorMode, ModelRegistry, OllamaBackend,
    Orchestrator, Result, RunReport, RunRequest, SafetyAnalyzer, SandboxRunner, Validate,
    WorkerClient, WorkerServer,
};

#[derive(Parser)]
#[command(
    name = "codeloop",
    version,
    about = "Plan, generate and execute Python code in a guarded sandbox"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a request through planning, coding and execution.
    Run {
        /// The natural-language request.
        prompt: String,
        /// Configuration file (.toml, .yaml or .yml).
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print events and the final report as JSON lines.
        #[arg(long)]
        json: bool,
    },
    /// Serve sandbox executions over stdin/stdout.
    Worker {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Run the safety gate on a file, or stdin when no file is given.
    Check {
        file: Option<PathBuf>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Check the model server and configured models.
    Health {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // stdout belongs to the worker protocol and JSON output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Run {
            prompt,
            config,
            json,
        } => cmd_run(prompt, config.as_deref(), json).await,
        Command::Worker { config } => cmd_worker(config.as_deref()).await,
        Command::Check { file, config } => cmd_check(file.as_deref(), config.as_deref()),
        Command::Health { config } => cmd_health(config.as_deref()).await,
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AgentConfig> {
    let config = AgentConfig::resolve(path)?;
    for warning in config.validate().into_result()? {
        tracing::warn!("{warning}");
    }
    Ok(config)
}

fn sandbox_runner(config: &AgentConfig) -> SandboxRunner {
    SandboxRunner::new(
        config.sandbox.clone(),
        SafetyAnalyzer::new(config.safety.clone()),
    )
}

fn model_registry(config: &AgentConfig) -> Result<ModelRegistry<OllamaBackend>> {
    let backend = OllamaBackend::new(&config.ollama.host, config.ollama.request_timeout())?
        .with_verify_connection(config.ollama.verify_connection);
    Ok(ModelRegistry::new(backend, config.models.clone()))
}

async fn cmd_run(prompt: String, config_path: Option<&Path>, json: bool) -> Result<bool> {
    let config = load_config(config_path)?;
    let request = RunRequest::new(prompt)?;
    let models = Arc::new(model_registry(&config)?);

    let mut worker = None;
    let executor: Arc<dyn CodeExecutor> = match config.executor {
        ExecutorMode::Inline => Arc::new(sandbox_runner(&config)),
        ExecutorMode::Worker => {
            let client = Arc::new(WorkerClient::spawn_current(config_path)?);
            client.ping().await?;
            worker = Some(Arc::clone(&client));
            client
        }
    };

    let (tx, mut rx) = mpsc::channel::<AgentEvent>(32);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event, json);
        }
    });

    let report = Orchestrator::new(models, executor)
        .with_events(tx)
        .run(request)
        .await;
    // the orchestrator and its sender are gone; the printer drains and stops
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "event printer failed");
    }

    print_report(&report, json)?;

    if let Some(client) = worker.and_then(|c| Arc::try_unwrap(c).ok()) {
        client.shutdown().await?;
    }

    Ok(report.is_success())
}

fn print_event(event: &AgentEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "failed to encode event"),
        }
        return;
    }

    match event {
        AgentEvent::Plan { steps } => {
            println!("Plan:");
            for (i, step) in steps.iter().enumerate() {
                println!("  {}. {}", i + 1, step);
            }
        }
        AgentEvent::Code { step, code } => {
            println!("\n--- step {} code ---\n{}", step + 1, code);
        }
        AgentEvent::Result { step, result } => {
            println!("--- step {} exit code {} ---", step + 1, result.exit_code);
            if !result.stdout.is_empty() {
                println!("{}", result.stdout);
            }
            if !result.stderr.is_empty() {
                println!("[stderr]\n{}", result.stderr);
            }
        }
        AgentEvent::Error { message, .. } => println!("\nError: {message}"),
    }
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        let line = serde_json::to_string(report).map_err(|e| Error::Protocol(e.to_string()))?;
        println!("{line}");
        return Ok(());
    }

    println!("\n{}", "=".repeat(60));
    println!("Run {}: {:?}", report.run_id, report.status);
    println!(
        "Steps completed: {}/{}",
        report.state.current_step(),
        report.state.plan_len()
    );
    println!("{}", "=".repeat(60));
    Ok(())
}

async fn cmd_worker(config_path: Option<&Path>) -> Result<bool> {
    let config = load_config(config_path)?;
    let server = WorkerServer::new(sandbox_runner(&config));

    server
        .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;
    Ok(true)
}

fn cmd_check(file: Option<&Path>, config_path: Option<&Path>) -> Result<bool> {
    let config = load_config(config_path)?;
    let code = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut code = String::new();
            std::io::stdin().read_to_string(&mut code)?;
            code
        }
    };

    let verdict = SafetyAnalyzer::new(config.safety).check(&code);
    if verdict.accepted {
        println!("accepted");
    } else {
        println!("rejected: {}", verdict.reason);
    }
    Ok(verdict.accepted)
}

async fn cmd_health(config_path: Option<&Path>) -> Result<bool> {
    let config = load_config(config_path)?;
    let backend = OllamaBackend::new(&config.ollama.host, config.ollama.request_timeout())?;
    let report = backend.health_check(&config.models).await;

    println!(
        "{}",
        serde_json::to_string_pretty(&report).map_err(|e| Error::Protocol(e.to_string()))?
    );
    Ok(report.is_healthy())
}
