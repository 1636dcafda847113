//! DevFlow CLI - development flow simulator.

mod sample;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use devflow_core::Event;
use devflow_execution::{
    Dice, EngineConfig, ImmediateTimer, RunSummary, SchedulerConfig, SeededDice,
    SimulationEngine, StageTimer, TaskManager, TaskNode, TokioStageTimer,
};
use devflow_progress::FlowLog;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "devflow")]
#[command(about = "Development flow simulator", long_about = None)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sample project until every task settles
    Run {
        /// Max ticks to run
        #[arg(long, default_value = "1000")]
        ticks: u64,
        /// Milliseconds between ticks
        #[arg(long, default_value = "50")]
        tick_ms: u64,
        /// Simulated time per tick
        #[arg(long, default_value = "5.0")]
        delta: f64,
        /// Seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Finish pipeline stages on the next tick instead of waiting
        #[arg(long)]
        instant: bool,
        /// Print the final state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the sample task tree
    Tree,
    /// Print the default configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Run {
            ticks,
            tick_ms,
            delta,
            seed,
            config,
            instant,
            json,
        } => {
            let config = load_config(config.as_deref())?;
            let dice: Box<dyn Dice> = match seed {
                Some(seed) => Box::new(SeededDice::new(seed)),
                None => Box::new(SeededDice::from_entropy()),
            };
            let timer: Box<dyn StageTimer> = if instant {
                Box::new(ImmediateTimer)
            } else {
                Box::new(TokioStageTimer::new(tokio::runtime::Handle::current()))
            };

            let mut manager = TaskManager::new(config, dice, timer)?;
            let flow_log = Arc::new(Mutex::new(FlowLog::default()));
            let sink = Arc::clone(&flow_log);
            manager.on_any(move |event| {
                if let Some(message) = describe(event) {
                    sink.lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .add_message(message);
                }
            });
            sample::populate(&mut manager)?;
            flow_log
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .add_message("Development flow initialised");

            let mut engine = SimulationEngine::new(manager).with_config(EngineConfig {
                tick_interval: Duration::from_millis(tick_ms.max(1)),
                delta,
                max_ticks: Some(ticks),
            });
            let summary = engine.run().await;
            info!("Run finished after {} ticks", summary.ticks);

            let flow_log = flow_log.lock().unwrap_or_else(|e| e.into_inner());
            if json {
                let manager = engine.manager();
                let snapshot = serde_json::json!({
                    "summary": summary,
                    "tree": manager.tree(),
                    "tasks": manager.tasks().collect::<Vec<_>>(),
                    "flowLog": flow_log.entries().collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_tree(&engine.manager().tree());
                print_summary(&summary);
                println!();
                println!("Recent activity");
                for entry in flow_log.entries() {
                    println!("  {} {}", entry.timestamp.format("%H:%M:%S"), entry.message);
                }
            }
        }
        Commands::Tree => {
            let mut manager =
                TaskManager::new(SchedulerConfig::default(), SeededDice::new(0), ImmediateTimer)?;
            sample::populate(&mut manager)?;
            print_tree(&manager.tree());
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&SchedulerConfig::default())?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<SchedulerConfig> {
    let Some(path) = path else {
        return Ok(SchedulerConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = SchedulerConfig::from_json(&text)
        .with_context(|| format!("loading config {}", path.display()))?;
    Ok(config)
}

/// Flow log line for an event, if it is worth one.
fn describe(event: &Event) -> Option<String> {
    let message = match event {
        Event::TaskCreated { .. } | Event::MetricsUpdated(_) => return None,
        Event::TaskStarted { task_id } => format!("{} started", task_id),
        Event::TaskEligible { task_id } => format!("{} is ready to start", task_id),
        Event::ReviewFeedback {
            task_id,
            severity,
            iteration,
        } => format!("{}: {:?} review comment (round {})", task_id, severity, iteration + 1),
        Event::TaskCompleted { task_id } => format!("{} completed", task_id),
        Event::TaskFailed { task_id, stage } => format!("{} failed in {}", task_id, stage),
        Event::TaskBlocked { task_id, stage } => {
            format!("{}: {} waiting for resources", task_id, stage)
        }
        Event::PipelineStarted { task_id, .. } => format!("{}: pipeline started", task_id),
        Event::StageStarted { task_id, stage } => format!("{}: {} started", task_id, stage),
        Event::StageSucceeded { task_id, stage } => format!("{}: {} succeeded", task_id, stage),
        Event::StageFailed { task_id, stage } => format!("{}: {} failed", task_id, stage),
    };
    Some(message)
}

fn print_tree(nodes: &[TaskNode]) {
    fn walk(node: &TaskNode, depth: usize) {
        println!(
            "{}{:<10} {:<24} {:<14} {:>5.1}%",
            "  ".repeat(depth),
            node.id,
            node.name,
            node.status,
            node.progress
        );
        for child in &node.children {
            walk(child, depth + 1);
        }
    }

    println!("Tasks");
    for node in nodes {
        walk(node, 1);
    }
}

fn print_summary(summary: &RunSummary) {
    let m = &summary.metrics;
    println!();
    println!("Run finished ({:?}) after {} ticks", summary.reason, summary.ticks);
    println!(
        "  Completed: {}  Failed: {}  Unfinished: {}",
        summary.completed, summary.failed, summary.unfinished
    );
    println!("  Average code quality: {:.1}", m.average_code_quality);
    println!("  Technical debt: {:.1}", m.total_technical_debt);
    println!("  Review iterations: {}", m.total_review_iterations);
    if let Some(lead) = m.average_lead_time_secs {
        println!("  Average lead time: {:.1}s", lead);
    }
    println!("  Build success rate: {:.0}%", m.build_success_rate);
    println!("  Deploy success rate: {:.0}%", m.deploy_success_rate);
    println!("  Deployments (24h): {}", m.deployments_last_24h);
    println!(
        "  Resources in use: cpu {} / memory {} / developers {} / build {} / test {}",
        m.resource_usage.cpu,
        m.resource_usage.memory,
        m.resource_usage.developers,
        m.resource_usage.build_servers,
        m.resource_usage.test_environments
    );
}
