//! Todo Ledger CLI
//!
//! Drives the task ledger and sync orchestrator from the command line.
//!
//! ## Usage
//!
//! ```bash
//! # Add a task (publishes text, then appends a ledger record)
//! todo-ledger add "Learn Rust"
//!
//! # List tasks with resolved text
//! todo-ledger list
//!
//! # Complete a task (owner only)
//! todo-ledger complete 0
//!
//! # Print the record count
//! todo-ledger count
//!
//! # Tail creation events
//! todo-ledger watch
//!
//! # Offline mode with the in-memory content store
//! todo-ledger --memory add "No gateway needed"
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use todo_ledger::{
    Config, ContentStore, DisplayTask, MemoryContentStore, PinningGateway, RecordStore,
    SyncOrchestrator, TaskLedger, TaskText,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "todo-ledger")]
#[command(about = "Decentralized to-do list client")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory for the ledger database
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Owner identity for completion rights
    #[arg(long, env = "TODO_LEDGER_OWNER")]
    owner: Option<String>,

    /// Pinning gateway API key
    #[arg(long, env = "PINATA_API_KEY")]
    api_key: Option<String>,

    /// Pinning gateway API secret
    #[arg(long, env = "PINATA_SECRET_KEY")]
    api_secret: Option<String>,

    /// Use the in-memory content store instead of the pinning gateway.
    /// Refs from previous runs will show as unavailable.
    #[arg(long)]
    memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish task text and append a ledger record
    Add { text: String },
    /// List all tasks with resolved text
    List,
    /// Mark the task at the given index completed
    Complete { index: u64 },
    /// Print the current record count
    Count,
    /// Tail creation events as they are appended
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => {
            let default_path = Config::default().config_path();
            if default_path.exists() {
                Config::load(&default_path)
                    .with_context(|| format!("loading config {}", default_path.display()))?
            } else {
                Config::default()
            }
        }
    };

    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(owner) = args.owner {
        config.owner_id = owner;
    }
    if let Some(api_key) = args.api_key {
        config.gateway.api_key = api_key;
    }
    if let Some(api_secret) = args.api_secret {
        config.gateway.api_secret = api_secret;
    }

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;

    let ledger = Arc::new(TaskLedger::open(config.ledger_db_path(), &config.owner_id)?);

    let content: Arc<dyn ContentStore> = if args.memory {
        info!("Using in-memory content store");
        Arc::new(MemoryContentStore::new())
    } else {
        Arc::new(PinningGateway::new(config.gateway.clone())?)
    };

    let orchestrator = SyncOrchestrator::new(ledger.clone(), content, &config.owner_id);

    match args.command {
        Command::Add { text } => {
            let tasks = orchestrator.submit_task(&text).await?;
            print_tasks(&tasks);
        }
        Command::List => {
            let tasks = orchestrator.reload_tasks().await?;
            print_tasks(&tasks);
        }
        Command::Complete { index } => {
            let tasks = orchestrator.complete_task(index).await?;
            print_tasks(&tasks);
        }
        Command::Count => {
            println!("{}", ledger.record_count().await?);
        }
        Command::Watch => {
            let mut events = ledger.subscribe();
            info!("Watching for new records (Ctrl-C to stop)");
            loop {
                match events.recv().await {
                    Ok(event) => {
                        println!("record {} created -> {}", event.index, event.content_ref)
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        println!("(lagged, {} events skipped)", skipped)
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    Ok(())
}

fn print_tasks(tasks: &[DisplayTask]) {
    if tasks.is_empty() {
        println!("no tasks");
        return;
    }
    for task in tasks {
        let mark = if task.completed { "x" } else { " " };
        match &task.text {
            TaskText::Loaded(text) => println!("[{}] {} {}", mark, task.index, text),
            TaskText::Unavailable(reason) => {
                println!("[{}] {} (unavailable: {})", mark, task.index, reason)
            }
        }
    }
}
