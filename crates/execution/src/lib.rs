//! Execution layer - admission, review, pipelines and the tick loop.

#![warn(missing_docs)]

pub mod bus;
pub mod config;
pub mod dependency;
pub mod dice;
pub mod engine;
pub mod ledger;
pub mod scheduler;
pub mod selector;
pub mod timer;

pub use bus::{EventBus, Handler};
pub use config::{ConfigError, ReviewPolicy, SchedulerConfig};
pub use dependency::{DependencyResolver, Resolution};
pub use dice::{Dice, ScriptedDice, SeededDice};
pub use engine::{EngineConfig, RunSummary, SimulationEngine, StopReason};
pub use ledger::ResourceLedger;
pub use scheduler::{SchedulerError, TaskManager, TaskNode};
pub use selector::PrioritySelector;
pub use timer::{
    CompletionReceiver, CompletionSender, ImmediateTimer, StageCompletion, StageRoll, StageTimer,
    TokioStageTimer,
};
