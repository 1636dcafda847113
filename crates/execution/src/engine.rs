//! The simulation engine - drives the task manager on a fixed interval.

use crate::TaskManager;
use devflow_core::{ProjectMetrics, TaskStatus};
use serde::Serialize;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

/// Configuration for the simulation engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Wall-clock time between ticks
    pub tick_interval: Duration,
    /// Simulated time passed to each tick
    pub delta: f64,
    /// Max ticks before stopping (None = until settled)
    pub max_ticks: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(1000),
            delta: 1.0,
            max_ticks: None,
        }
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// No task can change any more
    Settled,
    /// Reached the configured tick limit
    TickLimit,
}

/// Outcome of a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Why the run ended
    pub reason: StopReason,
    /// Ticks run
    pub ticks: u64,
    /// Tasks completed
    pub completed: usize,
    /// Tasks failed in their pipeline
    pub failed: usize,
    /// Tasks neither completed nor failed
    pub unfinished: usize,
    /// Metrics at the last tick
    pub metrics: ProjectMetrics,
}

/// Runs the tick loop:
/// ```text
/// Apply completions → Progress → Review → Admit → Metrics
/// ```
pub struct SimulationEngine {
    manager: TaskManager,
    config: EngineConfig,
}

impl SimulationEngine {
    /// Create a new engine around a prepared task manager.
    pub fn new(manager: TaskManager) -> Self {
        Self {
            manager,
            config: EngineConfig::default(),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Run one tick.
    pub fn step(&mut self) {
        self.manager.tick(self.config.delta);
        debug!("Tick {} done", self.manager.ticks());
    }

    /// Tick on the configured interval until the manager settles or the tick
    /// limit is reached.
    pub async fn run(&mut self) -> RunSummary {
        let mut interval = time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            if let Some(max) = self.config.max_ticks {
                if self.manager.ticks() >= max {
                    info!("Reached max ticks ({})", max);
                    break StopReason::TickLimit;
                }
            }

            interval.tick().await;
            self.step();

            if self.manager.is_settled() {
                info!("All tasks settled after {} ticks", self.manager.ticks());
                break StopReason::Settled;
            }
        };

        self.summary(reason)
    }

    fn summary(&self, reason: StopReason) -> RunSummary {
        let count = |status: TaskStatus| self.manager.tasks().filter(|t| t.status == status).count();
        let completed = count(TaskStatus::Completed);
        let failed = count(TaskStatus::Failed);

        RunSummary {
            reason,
            ticks: self.manager.ticks(),
            completed,
            failed,
            unfinished: self.manager.tasks().count() - completed - failed,
            metrics: self.manager.metrics().clone(),
        }
    }

    /// Get a reference to the task manager.
    pub fn manager(&self) -> &TaskManager {
        &self.manager
    }

    /// Get a mutable reference to the task manager.
    pub fn manager_mut(&mut self) -> &mut TaskManager {
        &mut self.manager
    }

    /// Consume the engine, returning the task manager.
    pub fn into_manager(self) -> TaskManager {
        self.manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ImmediateTimer, SchedulerConfig, ScriptedDice, TokioStageTimer};
    use devflow_core::{Priority, TaskType};

    #[tokio::test(start_paused = true)]
    async fn test_run_until_settled() {
        let timer = TokioStageTimer::current().unwrap();
        let mut manager =
            TaskManager::new(SchedulerConfig::default(), ScriptedDice::new(vec![]), timer).unwrap();
        manager
            .create_task("code", "Code", TaskType::Implementation, Priority::High)
            .unwrap();
        manager
            .create_task("reqs", "Requirements", TaskType::Requirement, Priority::Medium)
            .unwrap();

        let mut engine = SimulationEngine::new(manager).with_config(EngineConfig {
            tick_interval: Duration::from_millis(100),
            delta: 25.0,
            max_ticks: Some(1000),
        });
        let summary = engine.run().await;

        assert_eq!(summary.reason, StopReason::Settled);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.unfinished, 0);
        assert_eq!(summary.metrics.deployments_last_24h, 1);
        assert!(engine.manager().ledger().used().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_limit() {
        let mut manager =
            TaskManager::new(SchedulerConfig::default(), ScriptedDice::new(vec![]), ImmediateTimer)
                .unwrap();
        manager
            .create_task("slow", "Slow", TaskType::Design, Priority::Low)
            .unwrap();

        let mut engine = SimulationEngine::new(manager).with_config(EngineConfig {
            tick_interval: Duration::from_millis(10),
            delta: 0.1,
            max_ticks: Some(5),
        });
        let summary = engine.run().await;

        assert_eq!(summary.reason, StopReason::TickLimit);
        assert_eq!(summary.ticks, 5);
        assert_eq!(summary.unfinished, 1);
    }
}
