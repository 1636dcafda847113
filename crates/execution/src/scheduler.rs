//! The task manager - registry, admission control and the tick loop.

use crate::bus::EventBus;
use crate::config::{ConfigError, SchedulerConfig};
use crate::dependency::DependencyResolver;
use crate::dice::Dice;
use crate::ledger::ResourceLedger;
use crate::selector::PrioritySelector;
use crate::timer::{
    CompletionReceiver, CompletionSender, StageCompletion, StageRoll, StageTimer,
};
use chrono::Utc;
use devflow_core::{
    ConsumerId, Event, EventKind, Pipeline, Priority, ProjectMetrics, ReviewSeverity, Resources,
    Stage, StageAdvance, StageConfig, Task, TaskId, TaskStatus, TaskType, Time,
};
use devflow_progress::MetricsTracker;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Coverage range reported by successful and failed test runs (percent).
const COVERAGE_RANGE: (u64, u64) = (60, 95);

/// Failing test count range reported by a failed test run.
const FAILED_TESTS_RANGE: (u64, u64) = (1, 5);

/// Errors from task manager operations.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// A task with this id is already registered
    #[error("task {0} already exists")]
    DuplicateTask(TaskId),

    /// The configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Read-only view of one task and its subtree.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskNode {
    /// Task id
    pub id: TaskId,
    /// Display name
    pub name: String,
    /// Kind of work
    #[serde(rename = "type")]
    pub task_type: TaskType,
    /// Priority
    pub priority: Priority,
    /// Current status
    pub status: TaskStatus,
    /// Percentage complete
    pub progress: f64,
    /// Child subtrees
    pub children: Vec<TaskNode>,
}

/// Orchestrates task activation, review, pipelines and metrics.
///
/// A single instance owns every task and is driven by calling
/// [`tick`](Self::tick). Stage completions produced by the [`StageTimer`]
/// come back through a channel that is drained at the start of each tick, so
/// all task and pipeline mutation happens on the ticking caller.
pub struct TaskManager {
    config: SchedulerConfig,
    tasks: HashMap<TaskId, Task>,
    order: Vec<TaskId>,
    ledger: Arc<ResourceLedger>,
    bus: EventBus,
    dice: Box<dyn Dice>,
    timer: Box<dyn StageTimer>,
    completions_tx: CompletionSender,
    completions_rx: CompletionReceiver,
    resolver: DependencyResolver,
    selector: PrioritySelector,
    tracker: MetricsTracker,
    metrics: ProjectMetrics,
    usage: Resources,
    ticks: u64,
}

impl TaskManager {
    /// Create a task manager.
    pub fn new(
        config: SchedulerConfig,
        dice: impl Dice + 'static,
        timer: impl StageTimer + 'static,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        Ok(Self {
            ledger: Arc::new(ResourceLedger::new(config.capacity)),
            config,
            tasks: HashMap::new(),
            order: Vec::new(),
            bus: EventBus::new(),
            dice: Box::new(dice),
            timer: Box::new(timer),
            completions_tx,
            completions_rx,
            resolver: DependencyResolver::new(),
            selector: PrioritySelector::new(),
            tracker: MetricsTracker::new(),
            metrics: ProjectMetrics::default(),
            usage: Resources::none(),
            ticks: 0,
        })
    }

    /// Subscribe to one kind of event.
    pub fn on<F>(&mut self, kind: EventKind, handler: F)
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.bus.on(kind, handler);
    }

    /// Subscribe to every event.
    pub fn on_any<F>(&mut self, handler: F)
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.bus.on_any(handler);
    }

    // === Registry ===

    /// Register a new pending task.
    pub fn create_task(
        &mut self,
        id: impl Into<TaskId>,
        name: impl Into<String>,
        task_type: TaskType,
        priority: Priority,
    ) -> Result<&Task, SchedulerError> {
        let id = id.into();
        if self.tasks.contains_key(&id) {
            return Err(SchedulerError::DuplicateTask(id));
        }

        let task = Task::with_stage_configs(id.clone(), name, task_type, priority, self.config.stages);
        debug!("Created task {} ({:?}, {:?})", task.id, task_type, priority);
        self.bus.emit(&Event::TaskCreated {
            task_id: id.clone(),
            name: task.name.clone(),
        });

        self.order.push(id.clone());
        Ok(self.tasks.entry(id).or_insert(task))
    }

    /// Set the resources a pending task will hold once admitted.
    pub fn set_requirements(&mut self, id: &TaskId, requirements: Resources) -> bool {
        match self.tasks.get_mut(id) {
            Some(task) if task.status == TaskStatus::Pending => {
                task.resource_requirements = requirements;
                true
            }
            _ => false,
        }
    }

    /// Make `child` a subtask of `parent`.
    ///
    /// Fails on unknown ids, on a child that already has another parent and
    /// on links that would make a task its own ancestor.
    pub fn add_subtask(&mut self, parent: &TaskId, child: &TaskId) -> bool {
        if parent == child || !self.tasks.contains_key(parent) {
            return false;
        }
        match self.tasks.get(child) {
            Some(c) if c.parent.as_ref().map_or(true, |p| p == parent) => {}
            _ => return false,
        }

        // Walk up from the parent; meeting the child means a loop.
        let mut cursor = self.tasks.get(parent).and_then(|t| t.parent.clone());
        while let Some(ancestor) = cursor {
            if &ancestor == child {
                return false;
            }
            cursor = self.tasks.get(&ancestor).and_then(|t| t.parent.clone());
        }

        if let Some(c) = self.tasks.get_mut(child) {
            c.parent = Some(parent.clone());
        }
        if let Some(p) = self.tasks.get_mut(parent) {
            if !p.subtasks.contains(child) {
                p.subtasks.push(child.clone());
            }
        }
        true
    }

    /// Make `task` wait for `dependency` to complete.
    ///
    /// Only pending tasks take new dependencies; unknown ids and edges that
    /// would close a cycle are refused.
    pub fn add_dependency(&mut self, task: &TaskId, dependency: &TaskId) -> bool {
        if !self.tasks.contains_key(dependency) {
            return false;
        }
        if self.resolver.would_create_cycle(&self.tasks, task, dependency) {
            warn!("Refusing dependency {} -> {}: cycle", task, dependency);
            return false;
        }
        match self.tasks.get_mut(task) {
            Some(t) if t.status == TaskStatus::Pending => {
                t.dependencies.insert(dependency.clone());
                true
            }
            _ => false,
        }
    }

    // === Tick loop ===

    /// Advance the simulation by `delta_time`.
    ///
    /// In order: apply stage completions that arrived since the last tick,
    /// retry blocked pipelines, accrue progress of active tasks and resolve
    /// reviews, admit queued tasks, recompute metrics.
    pub fn tick(&mut self, delta_time: f64) {
        let now = Utc::now();
        self.ticks += 1;

        // Only what was queued before this tick; stages started while
        // applying these complete on a later tick.
        let mut arrived = Vec::new();
        while let Ok(completion) = self.completions_rx.try_recv() {
            arrived.push(completion);
        }
        for completion in arrived {
            self.apply_completion(completion);
        }

        let blocked = self
            .selector
            .queue(self.tasks().filter(|t| t.status == TaskStatus::Blocked));
        for id in &blocked {
            self.resume_pipeline(id, now);
        }

        let order = self.order.clone();

        let mut task_load = Resources::none();
        for id in &order {
            match self.status(id) {
                Some(status) if status.is_active() => {
                    if let Some(task) = self.tasks.get_mut(id) {
                        task_load.cpu = task_load.cpu.saturating_add(task.resource_requirements.cpu);
                        task_load.memory =
                            task_load.memory.saturating_add(task.resource_requirements.memory);

                        let amount = delta_time * task.progress_rate();
                        if task.update_progress(amount) {
                            info!("{}: ready for review", task.name);
                        }
                    }
                }
                Some(TaskStatus::InReview) => {
                    self.process_review(id);
                }
                _ => {}
            }
        }

        self.admit_pending(now);

        self.usage = self.ledger.used().saturating_add(&task_load);
        self.metrics = self.tracker.compute(
            self.order.iter().filter_map(|id| self.tasks.get(id)),
            self.usage,
            now,
        );
        self.bus.emit(&Event::MetricsUpdated(self.metrics.clone()));
    }

    /// Admit pending tasks whose dependencies are complete, most urgent
    /// first, while the active limit and the developer pool allow.
    fn admit_pending(&mut self, now: Time) {
        let mut active = self.tasks.values().filter(|t| t.status.is_active()).count();

        let queue = self.selector.queue(self.order.iter().filter_map(|id| {
            self.tasks.get(id).filter(|t| {
                t.status == TaskStatus::Pending && self.resolver.check(&self.tasks, t).is_ready()
            })
        }));

        for id in queue {
            if active >= self.config.active_task_limit {
                break;
            }
            let Some(task) = self.tasks.get_mut(&id) else {
                continue;
            };

            let developers = Resources::developers(task.resource_requirements.developers);
            if !self.ledger.try_allocate(&ConsumerId::task(&id), developers) {
                debug!("{} stays queued: not enough developers", task.name);
                continue;
            }

            task.start(now);
            active += 1;
            info!("{} started", task.name);
            self.bus.emit(&Event::TaskStarted { task_id: id });
        }
    }

    // === Review ===

    /// Resolve the review of a task in `IN_REVIEW`.
    ///
    /// Per round, a comment is raised with the configured chance. A major
    /// comment sends the task back to work with a progress penalty; a minor
    /// comment or a clean review completes it. Returns false when the task is
    /// unknown, not in review, or already has a comment this round.
    pub fn process_review(&mut self, id: &TaskId) -> bool {
        let now = Utc::now();
        let policy = &self.config.review;
        let Some(task) = self.tasks.get_mut(id) else {
            return false;
        };
        if task.status != TaskStatus::InReview || task.current_round_comments().next().is_some() {
            return false;
        }

        if !self.dice.chance(policy.comment_chance) {
            info!("{}: review passed", task.name);
            self.complete_review(id, now);
            return true;
        }

        let severity = if self.dice.chance(policy.major_chance) {
            ReviewSeverity::Major
        } else {
            ReviewSeverity::Minor
        };
        let text = match severity {
            ReviewSeverity::Major => "Significant changes required",
            ReviewSeverity::Minor => "Minor fixes required",
        };
        task.add_review_comment(policy.reviewer.clone(), text, severity);
        let iteration = task.review_iterations;

        match severity {
            ReviewSeverity::Major => {
                task.handle_review_feedback(policy.feedback_penalty);
                info!(
                    "{}: review feedback (iteration {}), back to {:.0}%",
                    task.name, task.review_iterations, task.progress
                );
                self.bus.emit(&Event::ReviewFeedback {
                    task_id: id.clone(),
                    severity,
                    iteration,
                });
            }
            ReviewSeverity::Minor => {
                info!("{}: review passed with minor comments", task.name);
                self.bus.emit(&Event::ReviewFeedback {
                    task_id: id.clone(),
                    severity,
                    iteration,
                });
                self.complete_review(id, now);
            }
        }
        true
    }

    /// Mark a reviewed task completed, hand its developers back and either
    /// start its pipeline or unlock its dependents.
    fn complete_review(&mut self, id: &TaskId, now: Time) {
        let Some(task) = self.tasks.get_mut(id) else {
            return;
        };
        task.complete(now);
        let has_pipeline = task.pipeline.is_some();
        self.ledger.release(&ConsumerId::task(id));

        if has_pipeline {
            self.start_pipeline(id, now);
        } else {
            self.finish_task(id);
        }
    }

    /// Announce a completed task and unlock its dependents.
    fn finish_task(&mut self, id: &TaskId) {
        if let Some(task) = self.tasks.get(id) {
            info!("{} completed", task.name);
        }
        self.bus.emit(&Event::TaskCompleted { task_id: id.clone() });
        self.on_task_completed(id);
    }

    /// React to `id` reaching `COMPLETED`: every pending dependent whose
    /// dependencies are now all complete becomes eligible. Eligible tasks are
    /// not started here; the next admission pass picks them up.
    pub fn on_task_completed(&mut self, id: &TaskId) -> Vec<TaskId> {
        if self.status(id) != Some(TaskStatus::Completed) {
            return Vec::new();
        }

        let eligible: Vec<TaskId> = self
            .resolver
            .dependents(self.order.iter().filter_map(|i| self.tasks.get(i)), id)
            .into_iter()
            .filter(|dep| {
                self.tasks.get(dep).is_some_and(|t| {
                    t.status == TaskStatus::Pending
                        && self.resolver.check(&self.tasks, t).is_ready()
                })
            })
            .collect();

        for dep in &eligible {
            debug!("{} is now eligible", dep);
            self.bus.emit(&Event::TaskEligible { task_id: dep.clone() });
        }
        eligible
    }

    // === Pipeline ===

    fn start_pipeline(&mut self, id: &TaskId, now: Time) {
        let Some(task) = self.tasks.get_mut(id) else {
            return;
        };
        let Some(pipeline) = task.pipeline.as_ref() else {
            return;
        };
        let run_id = pipeline.run_id;
        task.status = TaskStatus::BuildPending;
        info!("{}: pipeline started", task.name);

        self.bus.emit(&Event::PipelineStarted {
            task_id: id.clone(),
            run_id,
        });
        self.try_start_stage(id, Stage::Build, now);
    }

    /// Retry the waiting stage of a blocked pipeline.
    fn resume_pipeline(&mut self, id: &TaskId, now: Time) {
        let next = self
            .tasks
            .get(id)
            .and_then(|t| t.pipeline.as_ref())
            .and_then(Pipeline::next_waiting_stage);
        if let Some(stage) = next {
            self.try_start_stage(id, stage, now);
        }
    }

    /// Admit the stage's resources and start it, or mark the task blocked.
    fn try_start_stage(&mut self, id: &TaskId, stage: Stage, now: Time) -> bool {
        let Some(task) = self.tasks.get_mut(id) else {
            return false;
        };
        let Some(pipeline) = task.pipeline.as_mut() else {
            return false;
        };
        if !pipeline.can_start(stage) {
            return false;
        }

        let config = pipeline.stage(stage).config;
        let consumer = ConsumerId::stage(id, stage);
        if !config.requirements.is_empty()
            && !self.ledger.try_allocate(&consumer, config.requirements)
        {
            if task.status != TaskStatus::Blocked {
                task.status = TaskStatus::Blocked;
                info!("{}: {} waiting for resources", task.name, stage);
                self.bus.emit(&Event::TaskBlocked {
                    task_id: id.clone(),
                    stage,
                });
            }
            return false;
        }

        let roll = roll_stage(self.dice.as_mut(), stage, &config);
        if !pipeline.start_stage(stage, now) {
            self.ledger.release(&consumer);
            return false;
        }
        let run_id = pipeline.run_id;
        task.status = TaskStatus::running(stage);
        info!("{}: {} started", task.name, stage);

        self.bus.emit(&Event::StageStarted {
            task_id: id.clone(),
            stage,
        });
        self.timer.schedule(
            StageCompletion {
                task_id: id.clone(),
                run_id,
                stage,
                roll,
            },
            self.config.stage_delay(roll.duration),
            self.completions_tx.clone(),
        );
        true
    }

    /// Apply a finished stage run.
    ///
    /// Releases the stage's resources, records its metrics, then fails the
    /// task, starts the next stage or completes the task. Completions for
    /// unknown tasks, other runs or stages that are not running are ignored
    /// and return false.
    pub fn apply_completion(&mut self, completion: StageCompletion) -> bool {
        let now = Utc::now();
        let StageCompletion {
            task_id: id,
            run_id,
            stage,
            roll,
        } = completion;

        let Some(task) = self.tasks.get_mut(&id) else {
            warn!("Completion for unknown task {}", id);
            return false;
        };
        let Some(pipeline) = task.pipeline.as_mut() else {
            warn!("Completion for {} which has no pipeline", id);
            return false;
        };
        if pipeline.run_id != run_id {
            warn!("Stale completion for {} (run {})", id, run_id);
            return false;
        }

        let allocated = !pipeline.stage(stage).config.requirements.is_empty();
        let advance = pipeline.finish_stage(stage, roll.success, now);
        if advance == StageAdvance::Ignored {
            warn!("Completion for {} {} which is not running", id, stage);
            return false;
        }
        if allocated {
            self.ledger.release(&ConsumerId::stage(&id, stage));
        }

        match stage {
            Stage::Build => {
                pipeline.metrics.build_time = roll.duration;
                if roll.success {
                    pipeline.add_artifact(stage, format!("{}-{}.tar.gz", id, run_id));
                }
            }
            Stage::Test => {
                pipeline.metrics.failed_tests = roll.failed_tests;
                if let Some(coverage) = roll.coverage {
                    pipeline.metrics.test_coverage = coverage;
                    if roll.success {
                        task.quality_metrics.test_coverage = coverage;
                    }
                }
            }
            Stage::Deploy => {
                pipeline.metrics.deployment_time = roll.duration;
            }
        }

        match advance {
            StageAdvance::Failed => {
                task.fail(now);
                warn!("{}: {} failed", task.name, stage);
                self.bus.emit(&Event::StageFailed {
                    task_id: id.clone(),
                    stage,
                });
                self.bus.emit(&Event::TaskFailed { task_id: id, stage });
            }
            StageAdvance::Next(next) => {
                info!("{}: {} succeeded", task.name, stage);
                if next == Stage::Deploy {
                    task.status = TaskStatus::DeployPending;
                }
                self.bus.emit(&Event::StageSucceeded {
                    task_id: id.clone(),
                    stage,
                });
                self.try_start_stage(&id, next, now);
            }
            StageAdvance::Finished => {
                task.complete(now);
                self.bus.emit(&Event::StageSucceeded {
                    task_id: id.clone(),
                    stage,
                });
                self.finish_task(&id);
            }
            StageAdvance::Ignored => {}
        }
        true
    }

    // === Queries ===

    /// Look up a task.
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Status of a task.
    pub fn status(&self, id: &TaskId) -> Option<TaskStatus> {
        self.tasks.get(id).map(|t| t.status)
    }

    /// All tasks in registration order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    /// Tasks without a parent, in registration order.
    pub fn roots(&self) -> impl Iterator<Item = &Task> {
        self.tasks().filter(|t| t.parent.is_none())
    }

    /// Direct subtasks of a task.
    pub fn children(&self, id: &TaskId) -> Vec<&Task> {
        self.tasks
            .get(id)
            .map(|t| t.subtasks.iter().filter_map(|c| self.tasks.get(c)).collect())
            .unwrap_or_default()
    }

    /// Snapshot of the whole task tree.
    pub fn tree(&self) -> Vec<TaskNode> {
        self.roots().map(|t| self.node(t)).collect()
    }

    fn node(&self, task: &Task) -> TaskNode {
        TaskNode {
            id: task.id.clone(),
            name: task.name.clone(),
            task_type: task.task_type,
            priority: task.priority,
            status: task.status,
            progress: task.progress,
            children: self.children(&task.id).into_iter().map(|c| self.node(c)).collect(),
        }
    }

    /// Pipeline of an implementation task.
    pub fn pipeline(&self, id: &TaskId) -> Option<&Pipeline> {
        self.tasks.get(id).and_then(|t| t.pipeline.as_ref())
    }

    /// Metrics computed at the last tick.
    pub fn metrics(&self) -> &ProjectMetrics {
        &self.metrics
    }

    /// Resource usage computed at the last tick.
    pub fn resource_usage(&self) -> Resources {
        self.usage
    }

    /// The resource ledger.
    pub fn ledger(&self) -> &Arc<ResourceLedger> {
        &self.ledger
    }

    /// The configuration in use.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Whether nothing can change any more.
    ///
    /// True when no task is active, in review or in its pipeline, and no
    /// pending task could ever be admitted (dependencies unfinished or
    /// requirements beyond total capacity).
    pub fn is_settled(&self) -> bool {
        let capacity = self.ledger.capacity();
        self.tasks.values().all(|t| match t.status {
            TaskStatus::Pending => {
                !self.resolver.check(&self.tasks, t).is_ready()
                    || t.resource_requirements.developers > capacity.developers
            }
            TaskStatus::Completed | TaskStatus::Failed => true,
            _ => false,
        })
    }
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("tasks", &self.tasks.len())
            .field("ticks", &self.ticks)
            .field("ledger", &self.ledger)
            .field("bus", &self.bus)
            .finish()
    }
}

/// Draw a stage outcome: success, duration, then for tests the coverage and
/// (on failure) the failing test count.
fn roll_stage(dice: &mut dyn Dice, stage: Stage, config: &StageConfig) -> StageRoll {
    let success = dice.chance(config.success_rate);
    let duration = dice.between(config.min_duration, config.max_duration);
    let (coverage, failed_tests) = if stage == Stage::Test {
        let coverage = dice.between(COVERAGE_RANGE.0, COVERAGE_RANGE.1) as f64;
        let failed = if success {
            0
        } else {
            dice.between(FAILED_TESTS_RANGE.0, FAILED_TESTS_RANGE.1) as u32
        };
        (Some(coverage), failed)
    } else {
        (None, 0)
    };

    StageRoll {
        success,
        duration,
        coverage,
        failed_tests,
    }
}
