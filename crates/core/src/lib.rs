//! DevFlow core data models.
//!
//! This crate defines the data structures shared by the scheduler, the
//! pipeline runner and anything observing them: tasks, pipelines, resource
//! bundles, events and aggregate metrics.

#![warn(missing_docs)]

// Identities
mod id;

// Work items
mod task;
mod pipeline;
mod resource;

// Observation
mod event;
mod metrics;

// Re-exports
pub use id::*;

pub use task::{
    Task, TaskType, Priority, TaskStatus, QualityMetrics, ReviewComment, ReviewSeverity,
    TimeMetrics,
};
pub use pipeline::{
    Pipeline, Stage, PipelineStatus, StageConfig, StageConfigs, StageState, Stages,
    PipelineMetrics, PipelineLog, StageAdvance,
};
pub use resource::{Resources, ResourceKind};
pub use event::{Event, EventKind};
pub use metrics::ProjectMetrics;

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;

/// Errors from parsing names of core enums.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Not one of build/test/deploy
    #[error("unknown stage: {0}")]
    UnknownStage(String),

    /// Not a known task type
    #[error("unknown task type: {0}")]
    UnknownTaskType(String),

    /// Not a known priority
    #[error("unknown priority: {0}")]
    UnknownPriority(String),
}
