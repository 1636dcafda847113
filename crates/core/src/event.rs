//! Events published at every task and pipeline transition.

use serde::{Deserialize, Serialize};
use crate::id::{RunId, TaskId};
use crate::metrics::ProjectMetrics;
use crate::pipeline::Stage;
use crate::task::ReviewSeverity;

/// Closed set of event kinds observers can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    /// A task was registered
    TaskCreated,
    /// A task was admitted and started
    TaskStarted,
    /// A pending task's dependencies are now all complete
    TaskEligible,
    /// Review sent a task back to work
    ReviewFeedback,
    /// A task completed
    TaskCompleted,
    /// A task failed in its pipeline
    TaskFailed,
    /// A pipeline stage is waiting for resources
    TaskBlocked,
    /// A pipeline run began
    PipelineStarted,
    /// Build stage started
    BuildStarted,
    /// Build stage succeeded
    BuildSucceeded,
    /// Build stage failed
    BuildFailed,
    /// Test stage started
    TestStarted,
    /// Test stage succeeded
    TestSucceeded,
    /// Test stage failed
    TestFailed,
    /// Deploy stage started
    DeployStarted,
    /// Deploy stage succeeded
    DeploySucceeded,
    /// Deploy stage failed
    DeployFailed,
    /// Aggregate metrics were recomputed
    MetricsUpdated,
}

impl EventKind {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TaskCreated => "taskCreated",
            EventKind::TaskStarted => "taskStarted",
            EventKind::TaskEligible => "taskEligible",
            EventKind::ReviewFeedback => "reviewFeedback",
            EventKind::TaskCompleted => "taskCompleted",
            EventKind::TaskFailed => "taskFailed",
            EventKind::TaskBlocked => "taskBlocked",
            EventKind::PipelineStarted => "pipelineStarted",
            EventKind::BuildStarted => "buildStarted",
            EventKind::BuildSucceeded => "buildSucceeded",
            EventKind::BuildFailed => "buildFailed",
            EventKind::TestStarted => "testStarted",
            EventKind::TestSucceeded => "testSucceeded",
            EventKind::TestFailed => "testFailed",
            EventKind::DeployStarted => "deployStarted",
            EventKind::DeploySucceeded => "deploySucceeded",
            EventKind::DeployFailed => "deployFailed",
            EventKind::MetricsUpdated => "metricsUpdated",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event with its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Event {
    /// A task was registered
    TaskCreated {
        /// New task
        task_id: TaskId,
        /// Its display name
        name: String,
    },
    /// A task was admitted
    TaskStarted {
        /// Admitted task
        task_id: TaskId,
    },
    /// A pending task may now be admitted
    TaskEligible {
        /// Unlocked task
        task_id: TaskId,
    },
    /// Review raised a comment
    ReviewFeedback {
        /// Reviewed task
        task_id: TaskId,
        /// Severity of the comment
        severity: ReviewSeverity,
        /// Review round the comment belongs to
        iteration: u32,
    },
    /// A task completed
    TaskCompleted {
        /// Completed task
        task_id: TaskId,
    },
    /// A task failed in `stage`
    TaskFailed {
        /// Failed task
        task_id: TaskId,
        /// Stage that failed
        stage: Stage,
    },
    /// `stage` could not get its resources
    TaskBlocked {
        /// Waiting task
        task_id: TaskId,
        /// Stage waiting for resources
        stage: Stage,
    },
    /// A pipeline run began
    PipelineStarted {
        /// Owning task
        task_id: TaskId,
        /// The run
        run_id: RunId,
    },
    /// A stage started
    StageStarted {
        /// Owning task
        task_id: TaskId,
        /// Started stage
        stage: Stage,
    },
    /// A stage succeeded
    StageSucceeded {
        /// Owning task
        task_id: TaskId,
        /// Finished stage
        stage: Stage,
    },
    /// A stage failed
    StageFailed {
        /// Owning task
        task_id: TaskId,
        /// Failed stage
        stage: Stage,
    },
    /// Aggregate metrics were recomputed
    MetricsUpdated(ProjectMetrics),
}

impl Event {
    /// The kind this event is delivered under.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::TaskCreated { .. } => EventKind::TaskCreated,
            Event::TaskStarted { .. } => EventKind::TaskStarted,
            Event::TaskEligible { .. } => EventKind::TaskEligible,
            Event::ReviewFeedback { .. } => EventKind::ReviewFeedback,
            Event::TaskCompleted { .. } => EventKind::TaskCompleted,
            Event::TaskFailed { .. } => EventKind::TaskFailed,
            Event::TaskBlocked { .. } => EventKind::TaskBlocked,
            Event::PipelineStarted { .. } => EventKind::PipelineStarted,
            Event::StageStarted { stage, .. } => match stage {
                Stage::Build => EventKind::BuildStarted,
                Stage::Test => EventKind::TestStarted,
                Stage::Deploy => EventKind::DeployStarted,
            },
            Event::StageSucceeded { stage, .. } => match stage {
                Stage::Build => EventKind::BuildSucceeded,
                Stage::Test => EventKind::TestSucceeded,
                Stage::Deploy => EventKind::DeploySucceeded,
            },
            Event::StageFailed { stage, .. } => match stage {
                Stage::Build => EventKind::BuildFailed,
                Stage::Test => EventKind::TestFailed,
                Stage::Deploy => EventKind::DeployFailed,
            },
            Event::MetricsUpdated(_) => EventKind::MetricsUpdated,
        }
    }

    /// The task the event concerns, if any.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Event::TaskCreated { task_id, .. }
            | Event::TaskStarted { task_id }
            | Event::TaskEligible { task_id }
            | Event::ReviewFeedback { task_id, .. }
            | Event::TaskCompleted { task_id }
            | Event::TaskFailed { task_id, .. }
            | Event::TaskBlocked { task_id, .. }
            | Event::PipelineStarted { task_id, .. }
            | Event::StageStarted { task_id, .. }
            | Event::StageSucceeded { task_id, .. }
            | Event::StageFailed { task_id, .. } => Some(task_id),
            Event::MetricsUpdated(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_events_map_to_named_kinds() {
        let id = TaskId::new("code-core");
        let started = Event::StageStarted { task_id: id.clone(), stage: Stage::Build };
        let failed = Event::StageFailed { task_id: id.clone(), stage: Stage::Test };
        let deployed = Event::StageSucceeded { task_id: id, stage: Stage::Deploy };

        assert_eq!(started.kind(), EventKind::BuildStarted);
        assert_eq!(failed.kind(), EventKind::TestFailed);
        assert_eq!(deployed.kind(), EventKind::DeploySucceeded);
        assert_eq!(deployed.kind().as_str(), "deploySucceeded");
    }

    #[test]
    fn test_metrics_event_has_no_task() {
        let event = Event::MetricsUpdated(ProjectMetrics::default());
        assert!(event.task_id().is_none());
        assert_eq!(event.kind(), EventKind::MetricsUpdated);
    }
}
