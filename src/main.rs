use anyhow::Result;
use clap::{Parser, Subcommand};

use pagewatch::config::PagewatchConfig;
use pagewatch::tasks::{NewTask, TaskRegistry};

#[derive(Parser)]
#[command(
    name = "pagewatch",
    about = "Scheduled web-page analysis with robots.txt consent and LLM summaries",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + task scheduler)
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        bind: Option<String>,

        /// SQLite database path (overrides config)
        #[arg(long)]
        db: Option<String>,
    },

    /// Pre-flight a URL against its robots.txt
    CheckRobots {
        /// Fully-qualified URL to check
        url: String,
    },

    /// Manage analysis tasks
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Show recorded execution results
    Results {
        /// Restrict to one task id
        #[arg(long)]
        task: Option<String>,

        /// Maximum number of results
        #[arg(long, default_value = "50")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// List all tasks
    List,

    /// Register a new task
    Add {
        /// Page URL to analyze
        #[arg(long)]
        url: String,

        /// Question to ask about the page
        #[arg(long)]
        question: String,

        /// Cron expression (5- or 6-field)
        #[arg(long)]
        cron: String,

        /// Model API key
        #[arg(long, env = "PAGEWATCH_API_KEY")]
        api_key: String,

        /// Human-readable name (defaults to "Task for {host}")
        #[arg(long)]
        name: Option<String>,
    },

    /// Pause a task (keeps counters and history)
    Pause {
        id: String,
    },

    /// Resume a paused task
    Resume {
        id: String,
    },

    /// Delete a task and all of its results
    Remove {
        id: String,
    },
}

fn open_registry(cfg: &PagewatchConfig) -> Result<TaskRegistry> {
    let pool = pagewatch::storage::open_pool(&cfg.storage.db_path)?;
    Ok(TaskRegistry::from_config(pool, cfg))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut cfg = PagewatchConfig::load_or_default();

    match cli.command {
        Commands::Serve { bind, db } => {
            if let Some(bind) = bind {
                cfg.server.bind = bind;
            }
            if let Some(db) = db {
                cfg.storage.db_path = db;
            }
            tracing::info!(bind = %cfg.server.bind, "Starting pagewatch daemon");
            pagewatch::serve(cfg).await?;
        }
        Commands::CheckRobots { url } => {
            let checker = pagewatch::robots::ConsentChecker::new(cfg.robots.clone());
            let decision = checker.check(&url).await;
            println!(
                "{}: {}",
                if decision.allowed { "ALLOWED" } else { "DISALLOWED" },
                decision.message
            );
            if let Some(robots_url) = decision.robots_url {
                println!("robots.txt: {robots_url}");
            }
        }
        Commands::Task { action } => {
            let registry = open_registry(&cfg)?;
            match action {
                TaskAction::List => {
                    let tasks = registry.list_tasks()?;
                    if tasks.is_empty() {
                        println!("No tasks found.");
                    } else {
                        println!(
                            "{:<36} | {:<8} | {:<14} | {:<5}/{:<5} | URL",
                            "Id", "Status", "Cron", "Ok", "Err"
                        );
                        println!("{:-<36}-|-{:-<8}-|-{:-<14}-|-{:-<11}-|-{:-<30}", "", "", "", "", "");
                        for t in tasks {
                            println!(
                                "{:<36} | {:<8} | {:<14} | {:<5}/{:<5} | {}",
                                t.id,
                                t.status.as_str(),
                                t.cron_expr,
                                t.success_count,
                                t.error_count,
                                t.url
                            );
                        }
                    }
                }
                TaskAction::Add {
                    url,
                    question,
                    cron,
                    api_key,
                    name,
                } => {
                    let task = registry
                        .create_task(NewTask {
                            url,
                            task_description: question,
                            cron_expr: cron,
                            api_key,
                            name,
                        })
                        .await?;
                    println!("Task '{}' created ({}).", task.name, task.id);
                    if let Some(next) = task.next_execution {
                        println!("Next execution: {}", next.to_rfc3339());
                    }
                }
                TaskAction::Pause { id } => {
                    registry.pause_task(&id)?;
                    println!("Task '{id}' paused.");
                }
                TaskAction::Resume { id } => {
                    registry.resume_task(&id)?;
                    println!("Task '{id}' resumed.");
                }
                TaskAction::Remove { id } => {
                    let removed = registry.delete_task(&id)?;
                    println!("Task '{id}' deleted. {removed} results removed.");
                }
            }
        }
        Commands::Results { task, limit } => {
            let registry = open_registry(&cfg)?;
            let results = registry.list_results(task.as_deref(), limit)?;
            if results.is_empty() {
                println!("No results found.");
            } else {
                for r in results {
                    println!(
                        "[{}] {} {} - {}",
                        r.executed_at.to_rfc3339(),
                        r.status.as_str(),
                        r.url,
                        match r.status {
                            pagewatch::tasks::ResultStatus::Success =>
                                r.analysis.unwrap_or_default(),
                            pagewatch::tasks::ResultStatus::Error =>
                                r.error_message.unwrap_or_default(),
                        }
                    );
                }
            }
        }
    }

    Ok(())
}
