//! # TaskClaw
//!
//! Persistent task scheduler: cron, interval, one-shot and manual tasks, each
//! a pipeline of conditional actions.
//!
//! Usage:
//!   taskclaw run                         # Start the scheduler (Ctrl-C saves and exits)
//!   taskclaw validate tasks.json         # Check a task batch without importing it
//!   taskclaw import tasks.json           # Validate and merge into the task store
//!   taskclaw list --group ops            # Show stored tasks
//!   taskclaw trigger disk-report         # Run one task now and print the result
//!   taskclaw next "*/15 9-17 * * 1-5" -n 5

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use taskclaw_actions::{ActionPipeline, LogMessenger, WebhookMessenger};
use taskclaw_core::TaskclawConfig;
use taskclaw_core::cron::CronExpr;
use taskclaw_core::task::TaskResult;
use taskclaw_core::timezone;
use taskclaw_core::traits::Messenger;
use taskclaw_scheduler::{MessengerNotifier, Scheduler, TaskManager, TaskStore};
use taskclaw_security::{ConfigValidator, import_tasks};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taskclaw", version, about = "⏰ TaskClaw: persistent task scheduler")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: ~/.taskclaw/config.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Start the scheduler loop
    Run,
    /// Validate a task batch file
    Validate {
        file: PathBuf,
    },
    /// Validate a task batch file and merge it into the store
    Import {
        file: PathBuf,
    },
    /// List stored tasks
    List {
        #[arg(short, long)]
        group: Option<String>,
        /// Only tasks whose task and schedule are enabled
        #[arg(long)]
        enabled_only: bool,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Run one task immediately and print its report
    Trigger {
        id: String,
    },
    /// Show the next occurrences of a cron expression
    Next {
        expression: String,
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,
        /// UTC or a fixed offset such as +08:00
        #[arg(long, default_value = "UTC")]
        timezone: String,
    },
}

const LOG_TARGETS: &str = "taskclaw,taskclaw_core,taskclaw_security,taskclaw_actions,taskclaw_scheduler";

fn init_logging(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let directives: Vec<String> = LOG_TARGETS.split(',').map(|t| format!("{t}={level}")).collect();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives.join(",")));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    }
}

fn load_config(path: Option<&str>) -> Result<TaskclawConfig> {
    let config = match path {
        Some(p) => {
            let expanded = shellexpand::tilde(p).into_owned();
            TaskclawConfig::load_from(Path::new(&expanded))?
        }
        None => TaskclawConfig::load()?,
    };
    Ok(config)
}

fn messenger(config: &TaskclawConfig) -> Result<Arc<dyn Messenger>> {
    let messenger: Arc<dyn Messenger> = match &config.messaging.webhook_url {
        Some(url) if !url.trim().is_empty() => Arc::new(WebhookMessenger::new(url)?),
        _ => Arc::new(LogMessenger),
    };
    Ok(messenger)
}

async fn load_manager(config: &TaskclawConfig, store: &TaskStore) -> Result<Arc<TaskManager>> {
    let manager = Arc::new(TaskManager::new(&config.scheduler));
    let tasks = store.load()?;
    manager.add_all(tasks).await?;
    Ok(manager)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Run => run(config).await,
        Command::Validate { file } => validate(&config, &file),
        Command::Import { file } => import(&config, &file).await,
        Command::List { group, enabled_only, json } => list(&config, group.as_deref(), enabled_only, json).await,
        Command::Trigger { id } => trigger(&config, &id).await,
        Command::Next { expression, count, timezone } => next(&expression, count, &timezone),
    }
}

async fn run(config: TaskclawConfig) -> Result<()> {
    let store = TaskStore::from_config(&config);
    let manager = load_manager(&config, &store).await?;
    let messenger = messenger(&config)?;
    let pipeline = ActionPipeline::from_config(&config, messenger.clone())?;
    let notifier = MessengerNotifier::new(messenger, &config.notify);

    let scheduler = Scheduler::new(manager.clone(), Arc::new(pipeline), Arc::new(notifier), config.scheduler.clone());
    println!("⏰ TaskClaw scheduler running with {} task(s)", manager.len().await);
    println!("   Store: {}", store.path().display());
    println!("   Press Ctrl-C to stop\n");
    scheduler.start();

    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    tracing::info!("🛑 Shutting down");
    scheduler.stop().await;
    store.save(&manager.snapshot().await)?;
    println!("💾 Saved {} task(s) to {}", manager.len().await, store.path().display());
    Ok(())
}

fn validate(config: &TaskclawConfig, file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let doc = ConfigValidator::new(&config.security).validate_str(&text)?;
    let count = doc.get("tasks").and_then(|t| t.as_array()).map_or(0, Vec::len);
    println!("✅ {} is valid ({} task(s))", file.display(), count);
    Ok(())
}

async fn import(config: &TaskclawConfig, file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let tasks = import_tasks(&text, &config.security)?;

    let store = TaskStore::from_config(config);
    let manager = load_manager(config, &store).await?;
    for task in &tasks {
        if manager.contains(&task.id).await {
            bail!("task id '{}' already exists in {}", task.id, store.path().display());
        }
    }
    if manager.len().await + tasks.len() > config.security.max_tasks {
        bail!(
            "import would exceed the task limit ({} stored + {} new > {})",
            manager.len().await,
            tasks.len(),
            config.security.max_tasks
        );
    }

    let imported = manager.add_all(tasks).await?;
    store.save(&manager.snapshot().await)?;
    println!("✅ Imported {} task(s) into {}", imported, store.path().display());
    Ok(())
}

async fn list(config: &TaskclawConfig, group: Option<&str>, enabled_only: bool, json: bool) -> Result<()> {
    let store = TaskStore::from_config(config);
    let manager = load_manager(config, &store).await?;
    let tasks = manager.list(group, enabled_only).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(());
    }
    if tasks.is_empty() {
        println!("No tasks in {}", store.path().display());
        return Ok(());
    }

    for task in &tasks {
        let state = &task.state;
        let next = state.next_run.map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M UTC").to_string());
        println!(
            "{} {:<24} {:<32} prio {:>3}  runs {}/{}  next {}",
            if task.is_active() { "🟢" } else { "⚪" },
            task.id,
            task.schedule.describe(),
            task.priority,
            state.success_count,
            state.run_count,
            next
        );
    }

    let stats = manager.stats().await;
    println!(
        "\n📊 {} task(s), {} enabled, {} execution(s), success rate {:.2}%, groups: {}",
        stats.total_tasks,
        stats.enabled_tasks,
        stats.total_executions,
        stats.success_rate,
        stats.groups.join(", ")
    );
    Ok(())
}

async fn trigger(config: &TaskclawConfig, id: &str) -> Result<()> {
    let store = TaskStore::from_config(config);
    let manager = load_manager(config, &store).await?;
    let Some(task) = manager.get(id).await else {
        bail!("task '{id}' not found in {}", store.path().display());
    };

    let pipeline = ActionPipeline::from_config(config, messenger(config)?)?;
    let timestamp = Utc::now();
    let started = std::time::Instant::now();
    let report = pipeline.run(&task).await;

    manager
        .record(TaskResult {
            task_id: task.id.clone(),
            success: report.success,
            message: report.message.clone(),
            timestamp,
            duration: started.elapsed().as_secs_f64(),
            error: report.error.clone(),
            attempt: 1,
        })
        .await;
    store.save(&manager.snapshot().await)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.success {
        bail!("task '{}' failed: {}", task.name, report.message);
    }
    Ok(())
}

fn next(expression: &str, count: usize, timezone_label: &str) -> Result<()> {
    let expr = CronExpr::parse(expression)?;
    let Some(offset) = timezone::parse_offset(timezone_label) else {
        bail!("unknown timezone '{timezone_label}'");
    };

    println!("🗓️  {} ({})", expr.describe(), timezone_label);
    let mut from = Utc::now();
    for _ in 0..count {
        let Some(at) = expr.next_after_in(from, offset) else {
            println!("   no further occurrence within a year");
            break;
        };
        println!("   {}", at.with_timezone(&offset).format("%Y-%m-%d %H:%M %:z (%a)"));
        from = at;
    }
    Ok(())
}
