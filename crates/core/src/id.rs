//! Identifiers for DevFlow entities.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a Task.
///
/// Task ids are chosen by whoever creates the task (`"arch-main"`,
/// `"code-core"`), so this wraps a plain string rather than a generated id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Create a task id from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Key identifying one holder of a resource allocation.
///
/// A task holds its developers as [`ConsumerId::Task`]; a pipeline stage run
/// holds its build server or test environment as [`ConsumerId::Stage`],
/// displayed `<taskId>-<stage>`. Variants never compare equal to each other,
/// whatever the task ids look like.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConsumerId {
    /// A task's own allocation
    Task(TaskId),
    /// One pipeline stage run of a task
    Stage(TaskId, crate::Stage),
    /// Any other holder
    Named(String),
}

impl ConsumerId {
    /// Create a named consumer id.
    pub fn new(id: impl Into<String>) -> Self {
        Self::Named(id.into())
    }

    /// Consumer id for a task's own allocation.
    pub fn task(task_id: &TaskId) -> Self {
        Self::Task(task_id.clone())
    }

    /// Consumer id for one pipeline stage of a task.
    pub fn stage(task_id: &TaskId, stage: crate::Stage) -> Self {
        Self::Stage(task_id.clone(), stage)
    }
}

impl std::fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Task(id) => f.pad(&format!("task:{}", id)),
            Self::Stage(id, stage) => f.pad(&format!("{}-{}", id, stage)),
            Self::Named(name) => f.pad(name),
        }
    }
}

impl From<&str> for ConsumerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Unique identifier for one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Ulid);

impl RunId {
    /// Generate a new RunId
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for RunId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Stage;

    #[test]
    fn test_stage_consumer_id_format() {
        let task = TaskId::new("code-core");
        assert_eq!(ConsumerId::stage(&task, Stage::Build).to_string(), "code-core-build");
        assert_eq!(ConsumerId::stage(&task, Stage::Test).to_string(), "code-core-test");
        assert_eq!(ConsumerId::task(&task).to_string(), "task:code-core");
    }

    #[test]
    fn test_task_and_stage_consumers_never_collide() {
        let deploy_of_api = ConsumerId::stage(&TaskId::new("api"), Stage::Deploy);
        assert_ne!(ConsumerId::task(&TaskId::new("api-deploy")), deploy_of_api);
        assert_ne!(ConsumerId::new("api-deploy"), deploy_of_api);

        let build_of_prefixed = ConsumerId::stage(&TaskId::new("task:a"), Stage::Build);
        let task_a_build = ConsumerId::task(&TaskId::new("a-build"));
        assert_eq!(build_of_prefixed.to_string(), task_a_build.to_string());
        assert_ne!(build_of_prefixed, task_a_build);
    }

    #[test]
    fn test_task_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&TaskId::new("arch-main")).unwrap();
        assert_eq!(json, "\"arch-main\"");
    }

    #[test]
    fn test_run_id_round_trips_through_display() {
        let id = RunId::new();
        let parsed: RunId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
