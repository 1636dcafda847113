//! Task model - the core unit of work in DevFlow.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use crate::id::TaskId;
use crate::pipeline::{Pipeline, Stage, StageConfigs};
use crate::resource::Resources;
use crate::Time;

/// A task represents a unit of development work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// Display name
    pub name: String,

    /// Kind of work
    #[serde(rename = "type")]
    pub task_type: TaskType,

    /// Scheduling priority
    pub priority: Priority,

    /// Lifecycle status
    pub status: TaskStatus,

    /// Percentage complete (0-100)
    pub progress: f64,

    /// Resources held while the task is worked on
    pub resource_requirements: Resources,

    /// Quality figures
    pub quality_metrics: QualityMetrics,

    /// Review comments, oldest first
    pub review_comments: Vec<ReviewComment>,

    /// Number of review feedback loops
    pub review_iterations: u32,

    /// Tasks that must be completed before this one starts
    pub dependencies: BTreeSet<TaskId>,

    /// Owning parent task
    pub parent: Option<TaskId>,

    /// Owned child tasks, in insertion order
    pub subtasks: Vec<TaskId>,

    /// Start/completion timestamps
    pub time_metrics: TimeMetrics,

    /// Delivery pipeline (implementation tasks only)
    pub pipeline: Option<Pipeline>,

    /// Creation timestamp
    pub created_at: Time,
}

/// Kind of development work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    /// Requirement analysis
    Requirement,
    /// Design work
    Design,
    /// Writing code
    Implementation,
    /// Code review
    Review,
    /// Writing or running tests
    Test,
    /// Documentation
    Documentation,
    /// Build work
    Build,
    /// Deployment work
    Deployment,
}

impl TaskType {
    /// Base progress rate of this kind of work.
    pub fn base_rate(&self) -> f64 {
        match self {
            TaskType::Requirement => 0.8,
            TaskType::Design => 0.9,
            TaskType::Implementation => 1.0,
            TaskType::Test => 1.2,
            TaskType::Documentation => 1.1,
            TaskType::Review | TaskType::Build | TaskType::Deployment => 1.0,
        }
    }

    /// Whether the task starts with an analysis phase.
    pub fn starts_with_analysis(&self) -> bool {
        matches!(self, TaskType::Requirement | TaskType::Design)
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Requirement => "requirement",
            TaskType::Design => "design",
            TaskType::Implementation => "implementation",
            TaskType::Review => "review",
            TaskType::Test => "test",
            TaskType::Documentation => "documentation",
            TaskType::Build => "build",
            TaskType::Deployment => "deployment",
        }
    }
}

impl std::str::FromStr for TaskType {
    type Err = crate::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "requirement" => Ok(TaskType::Requirement),
            "design" => Ok(TaskType::Design),
            "implementation" => Ok(TaskType::Implementation),
            "review" => Ok(TaskType::Review),
            "test" => Ok(TaskType::Test),
            "documentation" => Ok(TaskType::Documentation),
            "build" => Ok(TaskType::Build),
            "deployment" => Ok(TaskType::Deployment),
            other => Err(crate::ParseError::UnknownTaskType(other.to_string())),
        }
    }
}

/// Scheduling priority. Orders from most to least urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Must go first
    Critical,
    /// High
    High,
    /// Medium
    Medium,
    /// Low
    Low,
}

impl Priority {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = crate::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(crate::ParseError::UnknownPriority(other.to_string())),
        }
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Waiting for admission
    Pending,
    /// Being analysed (requirement/design work)
    Analyzing,
    /// Being worked on
    InProgress,
    /// Waiting on review
    InReview,
    /// Review asked for changes
    ReviewFeedback,
    /// Done
    Completed,
    /// Pipeline created, build not started
    BuildPending,
    /// Build stage running
    Building,
    /// Test stage running
    Testing,
    /// Build and test passed, deploy not started
    DeployPending,
    /// Deploy stage running
    Deploying,
    /// A pipeline stage failed (terminal)
    Failed,
    /// Waiting for pipeline resources
    Blocked,
}

impl TaskStatus {
    /// Whether the task is actively being worked on and accrues progress.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Analyzing | TaskStatus::InProgress)
    }

    /// Whether the task has a pipeline stage in flight or waiting.
    pub fn is_in_pipeline(&self) -> bool {
        matches!(
            self,
            TaskStatus::BuildPending
                | TaskStatus::Building
                | TaskStatus::Testing
                | TaskStatus::DeployPending
                | TaskStatus::Deploying
                | TaskStatus::Blocked
        )
    }

    /// Status of a task while `stage` runs.
    pub fn running(stage: Stage) -> Self {
        match stage {
            Stage::Build => TaskStatus::Building,
            Stage::Test => TaskStatus::Testing,
            Stage::Deploy => TaskStatus::Deploying,
        }
    }

    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Analyzing => "ANALYZING",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::InReview => "IN_REVIEW",
            TaskStatus::ReviewFeedback => "REVIEW_FEEDBACK",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::BuildPending => "BUILD_PENDING",
            TaskStatus::Building => "BUILDING",
            TaskStatus::Testing => "TESTING",
            TaskStatus::DeployPending => "DEPLOY_PENDING",
            TaskStatus::Deploying => "DEPLOYING",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Blocked => "BLOCKED",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Quality figures of a task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    /// Code quality score (0-100)
    pub code_quality: f64,
    /// Test coverage (percent)
    pub test_coverage: f64,
    /// Accumulated technical debt (0-100)
    pub technical_debt: f64,
}

impl Default for QualityMetrics {
    fn default() -> Self {
        Self {
            code_quality: 80.0,
            test_coverage: 0.0,
            technical_debt: 0.0,
        }
    }
}

/// Severity of a review comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewSeverity {
    /// Requires rework
    Major,
    /// Cosmetic
    Minor,
}

impl ReviewSeverity {
    /// Change applied to code quality and technical debt when raised.
    fn quality_impact(&self) -> f64 {
        match self {
            ReviewSeverity::Major => 10.0,
            ReviewSeverity::Minor => 2.0,
        }
    }
}

/// A review comment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewComment {
    /// Reviewer
    pub author: String,
    /// Comment text
    pub text: String,
    /// Severity
    pub severity: ReviewSeverity,
    /// Review round the comment belongs to
    pub iteration: u32,
}

/// Start/completion timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeMetrics {
    /// First admission
    pub start_time: Option<Time>,
    /// Last completion
    pub completion_time: Option<Time>,
}

impl Task {
    /// Create a pending task with default requirements and quality.
    pub fn new(
        id: impl Into<TaskId>,
        name: impl Into<String>,
        task_type: TaskType,
        priority: Priority,
    ) -> Self {
        Self::with_stage_configs(id, name, task_type, priority, StageConfigs::default())
    }

    /// Create a pending task whose pipeline (if any) uses `stages`.
    pub fn with_stage_configs(
        id: impl Into<TaskId>,
        name: impl Into<String>,
        task_type: TaskType,
        priority: Priority,
        stages: StageConfigs,
    ) -> Self {
        let id = id.into();
        let pipeline = (task_type == TaskType::Implementation)
            .then(|| Pipeline::new(id.clone(), stages));

        Self {
            id,
            name: name.into(),
            task_type,
            priority,
            status: TaskStatus::Pending,
            progress: 0.0,
            resource_requirements: Resources::task(10, 10, 1),
            quality_metrics: QualityMetrics::default(),
            review_comments: Vec::new(),
            review_iterations: 0,
            dependencies: BTreeSet::new(),
            parent: None,
            subtasks: Vec::new(),
            time_metrics: TimeMetrics::default(),
            pipeline,
            created_at: chrono::Utc::now(),
        }
    }

    /// Progress gained per unit of time.
    ///
    /// Base rate of the task type, slowed by technical debt and by large
    /// teams (never below half speed for team size).
    pub fn progress_rate(&self) -> f64 {
        let debt_penalty = 1.0 - self.quality_metrics.technical_debt / 200.0;
        let developers = self.resource_requirements.developers as f64;
        let team_penalty = (1.0 - (developers - 1.0) * 0.1).max(0.5);
        self.task_type.base_rate() * debt_penalty * team_penalty
    }

    /// Move from pending to an active state. Returns false when the task is
    /// not pending.
    pub fn start(&mut self, now: Time) -> bool {
        if self.status != TaskStatus::Pending {
            return false;
        }
        self.status = if self.task_type.starts_with_analysis() {
            TaskStatus::Analyzing
        } else {
            TaskStatus::InProgress
        };
        self.time_metrics.start_time.get_or_insert(now);
        true
    }

    /// Accrue progress. Returns true when the task just reached 100 and
    /// entered review.
    pub fn update_progress(&mut self, amount: f64) -> bool {
        if !self.status.is_active() || amount <= 0.0 {
            return false;
        }
        self.progress = (self.progress + amount).min(100.0);
        if self.progress >= 100.0 {
            self.status = TaskStatus::InReview;
            return true;
        }
        false
    }

    /// Record a review comment for the current round and apply its quality
    /// impact.
    pub fn add_review_comment(
        &mut self,
        author: impl Into<String>,
        text: impl Into<String>,
        severity: ReviewSeverity,
    ) {
        let impact = severity.quality_impact();
        let q = &mut self.quality_metrics;
        q.code_quality = (q.code_quality - impact).clamp(0.0, 100.0);
        q.technical_debt = (q.technical_debt + impact).clamp(0.0, 100.0);

        self.review_comments.push(ReviewComment {
            author: author.into(),
            text: text.into(),
            severity,
            iteration: self.review_iterations,
        });
    }

    /// Comments raised in the current review round.
    pub fn current_round_comments(&self) -> impl Iterator<Item = &ReviewComment> {
        let round = self.review_iterations;
        self.review_comments.iter().filter(move |c| c.iteration == round)
    }

    /// Send the task back to work after a major review comment.
    ///
    /// Passes through `ReviewFeedback`, counts the iteration and takes
    /// `penalty` points of progress (never below zero).
    pub fn handle_review_feedback(&mut self, penalty: f64) -> bool {
        if self.status != TaskStatus::InReview {
            return false;
        }
        self.status = TaskStatus::ReviewFeedback;
        self.review_iterations += 1;
        self.progress = (self.progress - penalty.max(0.0)).max(0.0);
        self.status = TaskStatus::InProgress;
        true
    }

    /// Mark the task completed.
    pub fn complete(&mut self, now: Time) {
        self.status = TaskStatus::Completed;
        self.time_metrics.completion_time = Some(now);
    }

    /// Mark the task terminally failed.
    pub fn fail(&mut self, now: Time) {
        self.status = TaskStatus::Failed;
        self.time_metrics.completion_time = Some(now);
    }

    /// Time from first start to last completion.
    pub fn lead_time(&self) -> Option<chrono::Duration> {
        let start = self.time_metrics.start_time?;
        let end = self.time_metrics.completion_time?;
        Some(end - start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_only_implementation_tasks_own_a_pipeline() {
        let imp = Task::new("code-core", "Core", TaskType::Implementation, Priority::Medium);
        let doc = Task::new("doc-api", "API docs", TaskType::Documentation, Priority::Low);
        assert!(imp.pipeline.is_some());
        assert!(doc.pipeline.is_none());
        assert_eq!(imp.status, TaskStatus::Pending);
        assert_eq!(imp.progress, 0.0);
    }

    #[test]
    fn test_progress_rate_factors() {
        let mut task = Task::new("t", "T", TaskType::Test, Priority::Medium);
        task.resource_requirements.developers = 1;
        assert!((task.progress_rate() - 1.2).abs() < 1e-9);

        task.quality_metrics.technical_debt = 50.0;
        assert!((task.progress_rate() - 1.2 * 0.75).abs() < 1e-9);

        task.quality_metrics.technical_debt = 0.0;
        task.resource_requirements.developers = 3;
        assert!((task.progress_rate() - 1.2 * 0.8).abs() < 1e-9);

        // Team penalty bottoms out at half speed.
        task.resource_requirements.developers = 20;
        assert!((task.progress_rate() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_start_picks_analysis_for_design_work() {
        let now = Utc::now();
        let mut design = Task::new("d", "D", TaskType::Design, Priority::High);
        let mut imp = Task::new("i", "I", TaskType::Implementation, Priority::High);
        assert!(design.start(now));
        assert!(imp.start(now));
        assert_eq!(design.status, TaskStatus::Analyzing);
        assert_eq!(imp.status, TaskStatus::InProgress);
        assert!(!imp.start(now));
        assert_eq!(imp.time_metrics.start_time, Some(now));
    }

    #[test]
    fn test_progress_caps_and_enters_review() {
        let mut task = Task::new("t", "T", TaskType::Implementation, Priority::Medium);
        assert!(!task.update_progress(10.0), "pending tasks do not accrue");
        assert_eq!(task.progress, 0.0);

        task.start(Utc::now());
        assert!(!task.update_progress(60.0));
        assert!(task.update_progress(60.0));
        assert_eq!(task.progress, 100.0);
        assert_eq!(task.status, TaskStatus::InReview);
    }

    #[test]
    fn test_review_feedback_reduces_progress_without_going_negative() {
        let mut task = Task::new("t", "T", TaskType::Implementation, Priority::Medium);
        task.start(Utc::now());
        task.update_progress(100.0);

        assert!(task.handle_review_feedback(30.0));
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.review_iterations, 1);
        assert_eq!(task.progress, 70.0);

        task.update_progress(100.0);
        task.progress = 10.0;
        assert!(task.handle_review_feedback(30.0));
        assert_eq!(task.progress, 0.0);
        assert_eq!(task.review_iterations, 2);

        assert!(!task.handle_review_feedback(30.0), "only from review");
    }

    #[test]
    fn test_review_comments_track_rounds_and_quality() {
        let mut task = Task::new("t", "T", TaskType::Implementation, Priority::Medium);
        task.add_review_comment("reviewer1", "needs rework", ReviewSeverity::Major);
        assert_eq!(task.current_round_comments().count(), 1);
        assert_eq!(task.quality_metrics.code_quality, 70.0);
        assert_eq!(task.quality_metrics.technical_debt, 10.0);

        task.review_iterations += 1;
        assert_eq!(task.current_round_comments().count(), 0);
    }

    #[test]
    fn test_lead_time_needs_both_timestamps() {
        let start = Utc::now();
        let mut task = Task::new("t", "T", TaskType::Design, Priority::Low);
        assert!(task.lead_time().is_none());
        task.start(start);
        task.complete(start + chrono::Duration::seconds(42));
        assert_eq!(task.lead_time(), Some(chrono::Duration::seconds(42)));
    }

    #[test]
    fn test_priority_orders_most_urgent_first() {
        let mut p = vec![Priority::Low, Priority::Critical, Priority::Medium, Priority::High];
        p.sort();
        assert_eq!(p, vec![Priority::Critical, Priority::High, Priority::Medium, Priority::Low]);
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
    }

    #[test]
    fn test_task_serializes_with_type_key() {
        let task = Task::new("doc-api", "API docs", TaskType::Documentation, Priority::Low);
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["type"], "documentation");
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["resourceRequirements"]["developers"], 1);
    }
}
