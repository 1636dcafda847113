//! Pipeline model - the build → test → deploy state machine of an
//! implementation task.

use serde::{Deserialize, Serialize};
use crate::id::{RunId, TaskId};
use crate::resource::Resources;
use crate::Time;

/// One phase of the delivery pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Compile and package
    Build,
    /// Run the test suite
    Test,
    /// Roll out
    Deploy,
}

impl Stage {
    /// Fixed execution order.
    pub const ORDER: [Stage; 3] = [Stage::Build, Stage::Test, Stage::Deploy];

    /// The stage that follows this one, if any.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Build => Some(Stage::Test),
            Stage::Test => Some(Stage::Deploy),
            Stage::Deploy => None,
        }
    }

    /// The stage that precedes this one, if any.
    pub fn previous(self) -> Option<Stage> {
        match self {
            Stage::Build => None,
            Stage::Test => Some(Stage::Build),
            Stage::Deploy => Some(Stage::Test),
        }
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Build => "build",
            Stage::Test => "test",
            Stage::Deploy => "deploy",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = crate::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "build" => Ok(Stage::Build),
            "test" => Ok(Stage::Test),
            "deploy" => Ok(Stage::Deploy),
            other => Err(crate::ParseError::UnknownStage(other.to_string())),
        }
    }
}

/// Status of a stage or of the pipeline as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    /// Not started yet
    Waiting,
    /// Currently executing
    Running,
    /// Finished successfully
    Success,
    /// Finished with a failure (terminal)
    Failed,
}

impl PipelineStatus {
    /// Whether no further transition can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStatus::Success | PipelineStatus::Failed)
    }
}

/// Outcome and timing policy of one stage, plus what it holds while running.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageConfig {
    /// Probability that a run of this stage succeeds
    pub success_rate: f64,
    /// Shortest duration in time units (milliseconds at time scale 1.0)
    pub min_duration: u64,
    /// Longest duration in time units
    pub max_duration: u64,
    /// Resources admitted through the ledger while the stage runs
    #[serde(default)]
    pub requirements: Resources,
}

impl StageConfig {
    /// Default policy for a stage.
    pub fn default_for(stage: Stage) -> Self {
        match stage {
            Stage::Build => Self {
                success_rate: 0.9,
                min_duration: 2000,
                max_duration: 5000,
                requirements: Resources {
                    cpu: 20,
                    memory: 30,
                    build_servers: 1,
                    ..Resources::none()
                },
            },
            Stage::Test => Self {
                success_rate: 0.85,
                min_duration: 1000,
                max_duration: 3000,
                requirements: Resources {
                    cpu: 15,
                    memory: 25,
                    test_environments: 1,
                    ..Resources::none()
                },
            },
            Stage::Deploy => Self {
                success_rate: 0.95,
                min_duration: 1000,
                max_duration: 3000,
                requirements: Resources::none(),
            },
        }
    }
}

/// Per-stage configuration for a whole pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfigs {
    /// Build policy
    pub build: StageConfig,
    /// Test policy
    pub test: StageConfig,
    /// Deploy policy
    pub deploy: StageConfig,
}

impl StageConfigs {
    /// Policy for one stage.
    pub fn get(&self, stage: Stage) -> &StageConfig {
        match stage {
            Stage::Build => &self.build,
            Stage::Test => &self.test,
            Stage::Deploy => &self.deploy,
        }
    }
}

impl Default for StageConfigs {
    fn default() -> Self {
        Self {
            build: StageConfig::default_for(Stage::Build),
            test: StageConfig::default_for(Stage::Test),
            deploy: StageConfig::default_for(Stage::Deploy),
        }
    }
}

/// State of one stage within a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageState {
    /// Current status
    pub status: PipelineStatus,

    /// Policy the stage runs under
    pub config: StageConfig,

    /// When the stage started
    pub start_time: Option<Time>,

    /// When the stage finished
    pub end_time: Option<Time>,

    /// Produced artifacts
    pub artifacts: Vec<String>,
}

impl StageState {
    fn new(config: StageConfig) -> Self {
        Self {
            status: PipelineStatus::Waiting,
            config,
            start_time: None,
            end_time: None,
            artifacts: Vec::new(),
        }
    }
}

/// The three stages of a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stages {
    /// Build stage
    pub build: StageState,
    /// Test stage
    pub test: StageState,
    /// Deploy stage
    pub deploy: StageState,
}

impl Stages {
    /// State of one stage.
    pub fn get(&self, stage: Stage) -> &StageState {
        match stage {
            Stage::Build => &self.build,
            Stage::Test => &self.test,
            Stage::Deploy => &self.deploy,
        }
    }

    fn get_mut(&mut self, stage: Stage) -> &mut StageState {
        match stage {
            Stage::Build => &mut self.build,
            Stage::Test => &mut self.test,
            Stage::Deploy => &mut self.deploy,
        }
    }

    /// Iterate stages in execution order.
    pub fn iter(&self) -> impl Iterator<Item = (Stage, &StageState)> {
        Stage::ORDER.into_iter().map(move |s| (s, self.get(s)))
    }
}

/// Aggregated figures of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineMetrics {
    /// Build duration in time units
    pub build_time: u64,
    /// Coverage reported by the test stage (percent)
    pub test_coverage: f64,
    /// Number of failing tests in the last test run
    pub failed_tests: u32,
    /// Deploy duration in time units
    pub deployment_time: u64,
}

/// One pipeline log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineLog {
    /// When it was written
    pub timestamp: Time,
    /// Message text
    pub message: String,
    /// Stage the message concerns
    pub stage: Stage,
}

/// What the pipeline did after a stage finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageAdvance {
    /// The stage was not running; nothing changed
    Ignored,
    /// The stage failed and the pipeline is now terminally failed
    Failed,
    /// The stage succeeded and this stage is next
    Next(Stage),
    /// The last stage succeeded; the pipeline succeeded
    Finished,
}

/// The build → test → deploy state machine owned by an implementation task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    /// Identifier of this run
    pub run_id: RunId,

    /// Owning task
    pub task_id: TaskId,

    /// Per-stage state
    pub stages: Stages,

    /// Overall status
    pub status: PipelineStatus,

    /// Stage currently running
    pub current_stage: Option<Stage>,

    /// Aggregated metrics
    pub metrics: PipelineMetrics,

    /// Append-only log
    pub logs: Vec<PipelineLog>,
}

impl Pipeline {
    /// Create a waiting pipeline for a task.
    pub fn new(task_id: TaskId, configs: StageConfigs) -> Self {
        Self {
            run_id: RunId::new(),
            task_id,
            stages: Stages {
                build: StageState::new(configs.build),
                test: StageState::new(configs.test),
                deploy: StageState::new(configs.deploy),
            },
            status: PipelineStatus::Waiting,
            current_stage: None,
            metrics: PipelineMetrics::default(),
            logs: Vec::new(),
        }
    }

    /// State of one stage.
    pub fn stage(&self, stage: Stage) -> &StageState {
        self.stages.get(stage)
    }

    /// Whether `stage` may start now.
    ///
    /// Stages run strictly in order: the pipeline must not be finished, the
    /// stage must still be waiting and every earlier stage must have
    /// succeeded.
    pub fn can_start(&self, stage: Stage) -> bool {
        if self.status.is_terminal() || self.current_stage.is_some() {
            return false;
        }
        if self.stages.get(stage).status != PipelineStatus::Waiting {
            return false;
        }
        match stage.previous() {
            Some(prev) => self.stages.get(prev).status == PipelineStatus::Success,
            None => true,
        }
    }

    /// The next stage waiting to start, if the pipeline can still move.
    pub fn next_waiting_stage(&self) -> Option<Stage> {
        Stage::ORDER.into_iter().find(|s| self.can_start(*s))
    }

    /// Start a stage. Returns false (and changes nothing) when the stage may
    /// not start.
    pub fn start_stage(&mut self, stage: Stage, now: Time) -> bool {
        if !self.can_start(stage) {
            return false;
        }

        let state = self.stages.get_mut(stage);
        state.status = PipelineStatus::Running;
        state.start_time = Some(now);
        self.current_stage = Some(stage);
        self.status = PipelineStatus::Running;
        self.log(stage, format!("{} started", stage), now);
        true
    }

    /// Record the result of a running stage without starting the next one.
    ///
    /// On failure the pipeline becomes terminally failed. On success the
    /// caller learns which stage is next and decides when to start it.
    pub fn finish_stage(&mut self, stage: Stage, success: bool, now: Time) -> StageAdvance {
        if self.current_stage != Some(stage)
            || self.stages.get(stage).status != PipelineStatus::Running
        {
            return StageAdvance::Ignored;
        }

        let state = self.stages.get_mut(stage);
        state.end_time = Some(now);
        self.current_stage = None;

        if !success {
            state.status = PipelineStatus::Failed;
            self.status = PipelineStatus::Failed;
            self.log(stage, format!("{} failed", stage), now);
            return StageAdvance::Failed;
        }

        state.status = PipelineStatus::Success;
        self.log(stage, format!("{} succeeded", stage), now);
        match stage.next() {
            Some(next) => StageAdvance::Next(next),
            None => {
                self.status = PipelineStatus::Success;
                StageAdvance::Finished
            }
        }
    }

    /// Record the result of a running stage and, on success, immediately
    /// start the following stage.
    pub fn complete_stage(&mut self, stage: Stage, success: bool, now: Time) -> StageAdvance {
        let advance = self.finish_stage(stage, success, now);
        if let StageAdvance::Next(next) = advance {
            self.start_stage(next, now);
        }
        advance
    }

    /// Attach an artifact to a stage.
    pub fn add_artifact(&mut self, stage: Stage, artifact: impl Into<String>) {
        self.stages.get_mut(stage).artifacts.push(artifact.into());
    }

    /// Append a log line.
    pub fn log(&mut self, stage: Stage, message: impl Into<String>, now: Time) {
        self.logs.push(PipelineLog {
            timestamp: now,
            message: message.into(),
            stage,
        });
    }

    /// Whether the pipeline reached a terminal status.
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn pipeline() -> Pipeline {
        Pipeline::new(TaskId::new("code-core"), StageConfigs::default())
    }

    #[test]
    fn test_stages_run_in_order() {
        let mut p = pipeline();
        let now = Utc::now();

        assert!(!p.start_stage(Stage::Test, now));
        assert!(!p.start_stage(Stage::Deploy, now));
        assert!(p.start_stage(Stage::Build, now));
        assert_eq!(p.status, PipelineStatus::Running);
        assert_eq!(p.current_stage, Some(Stage::Build));

        // Nothing else may start while build runs.
        assert!(!p.start_stage(Stage::Test, now));

        assert_eq!(p.finish_stage(Stage::Build, true, now), StageAdvance::Next(Stage::Test));
        assert_eq!(p.current_stage, None);
        assert!(!p.start_stage(Stage::Build, now));
        assert!(!p.start_stage(Stage::Deploy, now));
        assert!(p.start_stage(Stage::Test, now));
    }

    #[test]
    fn test_complete_stage_starts_next() {
        let mut p = pipeline();
        let now = Utc::now();
        p.start_stage(Stage::Build, now);

        assert_eq!(p.complete_stage(Stage::Build, true, now), StageAdvance::Next(Stage::Test));
        assert_eq!(p.current_stage, Some(Stage::Test));
        assert_eq!(p.stage(Stage::Test).status, PipelineStatus::Running);

        assert_eq!(p.complete_stage(Stage::Test, true, now), StageAdvance::Next(Stage::Deploy));
        assert_eq!(p.complete_stage(Stage::Deploy, true, now), StageAdvance::Finished);
        assert_eq!(p.status, PipelineStatus::Success);
        assert_eq!(p.current_stage, None);
        assert!(p.is_finished());
    }

    #[test]
    fn test_failed_build_is_terminal() {
        let mut p = pipeline();
        let now = Utc::now();
        p.start_stage(Stage::Build, now);

        assert_eq!(p.complete_stage(Stage::Build, false, now), StageAdvance::Failed);
        assert_eq!(p.status, PipelineStatus::Failed);
        assert_eq!(p.stage(Stage::Build).status, PipelineStatus::Failed);

        let before = p.stage(Stage::Test).clone();
        assert!(!p.start_stage(Stage::Test, now));
        let after = p.stage(Stage::Test);
        assert_eq!(after.status, before.status);
        assert_eq!(after.start_time, before.start_time);
        assert!(after.artifacts.is_empty());
        assert_eq!(p.next_waiting_stage(), None);
    }

    #[test]
    fn test_finishing_idle_stage_is_ignored() {
        let mut p = pipeline();
        let now = Utc::now();
        assert_eq!(p.finish_stage(Stage::Deploy, true, now), StageAdvance::Ignored);
        assert_eq!(p.status, PipelineStatus::Waiting);
        assert!(p.logs.is_empty());
    }

    #[test]
    fn test_logs_are_appended_per_transition() {
        let mut p = pipeline();
        let now = Utc::now();
        p.start_stage(Stage::Build, now);
        p.finish_stage(Stage::Build, true, now);

        let messages: Vec<_> = p.logs.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, vec!["build started", "build succeeded"]);
        assert!(p.logs.iter().all(|l| l.stage == Stage::Build));
    }

    #[test]
    fn test_next_waiting_stage_tracks_progress() {
        let mut p = pipeline();
        let now = Utc::now();
        assert_eq!(p.next_waiting_stage(), Some(Stage::Build));
        p.start_stage(Stage::Build, now);
        assert_eq!(p.next_waiting_stage(), None);
        p.finish_stage(Stage::Build, true, now);
        assert_eq!(p.next_waiting_stage(), Some(Stage::Test));
    }

    #[test]
    fn test_stage_parsing() {
        assert_eq!("BUILD".parse::<Stage>().unwrap(), Stage::Build);
        assert!("lint".parse::<Stage>().is_err());
    }
}
