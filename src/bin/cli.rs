//! Reagent terminal runner
//!
//! Runs tasks against a session from the command line, printing streamed
//! engine events as they happen.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use reagent::agent::{
    cancel_pair, ActivityStatus, AgentEvent, ErrorMemory, EventSink, ExecutionMode, LlmClient,
    Orchestrator, Planner, ReactEngine,
};
use reagent::config::Config;
use reagent::session::{Session, SessionManager};
use reagent::tools::session_registry;

#[derive(Parser)]
#[command(name = "reagent", about = "Reagent agent runtime CLI")]
struct Args {
    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a task in a new or resumed session
    Run {
        /// The task to execute
        task: String,

        /// Resume this session id instead of creating a new one
        #[arg(long)]
        session: Option<String>,

        /// Plan first and execute step by step
        #[arg(long)]
        planned: bool,
    },
    /// Write a default reagent.toml in the current directory
    Init,
    /// List persisted sessions
    Sessions,
    /// Delete a session and its workspace
    Delete {
        /// Session id to delete
        session_id: String,
    },
}

/// Prints streamed events to stdout.
struct ConsoleSink;

#[async_trait]
impl EventSink for ConsoleSink {
    async fn emit(&self, event: AgentEvent) {
        match event {
            AgentEvent::Status { status } => println!("[{:?}]", status),
            AgentEvent::Thought { content } => println!("Thought: {}", content),
            AgentEvent::Activity {
                tool,
                status,
                result,
                error,
                ..
            } => match status {
                ActivityStatus::Running => println!("-> {} ...", tool),
                ActivityStatus::Completed => {
                    println!("<- {}: {}", tool, result.unwrap_or_default())
                }
                ActivityStatus::Failed => {
                    println!("<- {} FAILED: {}", tool, error.unwrap_or_default())
                }
            },
            AgentEvent::Recovery { description } => println!("Recovery: {}", description),
            AgentEvent::FinalAnswer { content } => println!("\n{}", content),
            AgentEvent::Interrupted => println!("(interrupted)"),
            AgentEvent::Error { message } => eprintln!("error: {}", message),
            AgentEvent::StepStarted { step } => {
                println!("== step {} ==", step["id"]);
            }
            AgentEvent::StepCompleted { result } => {
                println!("== step {} {} ==", result["step_id"], if result["success"].as_bool().unwrap_or(false) { "ok" } else { "failed" });
            }
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    config.validate()?;

    match args.command {
        Command::Init => {
            let path = std::path::Path::new("reagent.toml");
            if path.exists() {
                anyhow::bail!("reagent.toml already exists");
            }
            std::fs::write(path, Config::default().to_toml()?)?;
            println!("wrote reagent.toml");
        }
        Command::Sessions => {
            let manager = SessionManager::new(&config)?;
            for info in manager.list_sessions() {
                println!(
                    "{}  updated {}  ({} messages, {} files)",
                    info.session_id, info.updated_at, info.message_count, info.file_count
                );
            }
        }
        Command::Delete { session_id } => {
            let manager = SessionManager::new(&config)?;
            if manager.delete_session(&session_id) {
                println!("deleted {}", session_id);
            } else {
                eprintln!("session {} not found", session_id);
            }
        }
        Command::Run {
            task,
            session,
            planned,
        } => {
            let manager = SessionManager::new(&config)?;
            let session = match session {
                Some(id) if manager.session_exists(&id) => {
                    Session::resume(&config, &id).await?
                }
                Some(id) => anyhow::bail!("session {} not found", id),
                None => Session::create_new(&config).await?,
            };
            println!("session: {}", session.session_id);

            let llm = Arc::new(LlmClient::new(config.provider.clone())?);
            let registry = Arc::new(session_registry(
                session.container.clone(),
                session.context.clone(),
            ));
            let error_memory = Arc::new(ErrorMemory::open(
                config.sandbox.workspace_root.join("error_memory.json"),
            ));

            let engine = ReactEngine::new(llm.clone(), registry.clone(), config.agent.clone())
                .with_context(session.context.clone())
                .with_error_memory(error_memory)
                .with_temperature(config.provider.temperature);

            let (handle, mut cancel) = cancel_pair();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    handle.cancel();
                }
            });

            if planned {
                let planner = Planner::new(llm, registry.description_lines());
                let orchestrator = Orchestrator::new(engine, planner, ExecutionMode::Planned);
                let result = orchestrator
                    .execute(&task, &ConsoleSink, &mut cancel)
                    .await;
                if !result.success && !result.interrupted {
                    eprintln!("task finished with failures");
                }
            } else {
                engine.run(&task, &ConsoleSink, cancel).await;
            }

            session.close().await;
        }
    }

    Ok(())
}
