//! Aggregate metrics over the task registry.

use chrono::Duration;
use devflow_core::{
    PipelineStatus, ProjectMetrics, Resources, Stage, Task, TaskStatus, TaskType, Time,
};
use tracing::debug;

/// Recomputes [`ProjectMetrics`] from the current task set.
#[derive(Debug, Clone)]
pub struct MetricsTracker {
    deployment_window: Duration,
}

impl MetricsTracker {
    /// Create a tracker counting deployments over the trailing 24 hours.
    pub fn new() -> Self {
        Self {
            deployment_window: Duration::hours(24),
        }
    }

    /// Set the deployment counting window.
    pub fn with_deployment_window(mut self, window: Duration) -> Self {
        self.deployment_window = window;
        self
    }

    /// Compute a metrics snapshot.
    pub fn compute<'a, I>(&self, tasks: I, usage: Resources, now: Time) -> ProjectMetrics
    where
        I: IntoIterator<Item = &'a Task>,
    {
        let mut completed = 0usize;
        let mut total_quality = 0.0;
        let mut total_debt = 0.0;
        let mut total_iterations = 0u32;
        let mut lead_times = Vec::new();
        let mut builds = StageTally::default();
        let mut deploys = StageTally::default();
        let mut recent_deployments = 0usize;
        let window_start = now - self.deployment_window;

        for task in tasks {
            if task.status == TaskStatus::Completed {
                completed += 1;
                total_quality += task.quality_metrics.code_quality;
                total_debt += task.quality_metrics.technical_debt;
                total_iterations += task.review_iterations;
                if let Some(lead) = task.lead_time() {
                    lead_times.push(lead.num_milliseconds() as f64 / 1000.0);
                }
            }

            if task.task_type != TaskType::Implementation {
                continue;
            }
            let Some(pipeline) = &task.pipeline else {
                continue;
            };

            builds.record(pipeline.stage(Stage::Build).status);
            let deploy = pipeline.stage(Stage::Deploy);
            deploys.record(deploy.status);
            if deploy.status == PipelineStatus::Success
                && deploy.end_time.is_some_and(|t| t >= window_start)
            {
                recent_deployments += 1;
            }
        }

        let metrics = ProjectMetrics {
            completed_tasks: completed,
            average_code_quality: if completed > 0 {
                total_quality / completed as f64
            } else {
                100.0
            },
            total_technical_debt: total_debt,
            total_review_iterations: total_iterations,
            average_lead_time_secs: (!lead_times.is_empty())
                .then(|| lead_times.iter().sum::<f64>() / lead_times.len() as f64),
            build_success_rate: builds.rate(),
            deploy_success_rate: deploys.rate(),
            deployments_last_24h: recent_deployments,
            resource_usage: usage,
        };

        debug!(
            "Metrics: {} completed, build rate {:.0}%, {} recent deployments",
            metrics.completed_tasks, metrics.build_success_rate, metrics.deployments_last_24h
        );
        metrics
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Finished runs of one stage.
#[derive(Debug, Default)]
struct StageTally {
    succeeded: u32,
    finished: u32,
}

impl StageTally {
    fn record(&mut self, status: PipelineStatus) {
        match status {
            PipelineStatus::Success => {
                self.succeeded += 1;
                self.finished += 1;
            }
            PipelineStatus::Failed => self.finished += 1,
            PipelineStatus::Waiting | PipelineStatus::Running => {}
        }
    }

    fn rate(&self) -> f64 {
        self.succeeded as f64 / self.finished.max(1) as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use devflow_core::Priority;

    fn completed(id: &str, quality: f64, lead_secs: i64, now: Time) -> Task {
        let mut task = Task::new(id, id, TaskType::Design, Priority::Medium);
        task.start(now - Duration::seconds(lead_secs));
        task.quality_metrics.code_quality = quality;
        task.complete(now);
        task
    }

    fn implementation(id: &str, build_ok: bool, deploy_at: Option<Time>, now: Time) -> Task {
        let mut task = Task::new(id, id, TaskType::Implementation, Priority::Medium);
        let pipeline = task.pipeline.as_mut().unwrap();
        pipeline.start_stage(Stage::Build, now);
        pipeline.finish_stage(Stage::Build, build_ok, now);
        if let Some(at) = deploy_at {
            pipeline.start_stage(Stage::Test, at);
            pipeline.finish_stage(Stage::Test, true, at);
            pipeline.start_stage(Stage::Deploy, at);
            pipeline.finish_stage(Stage::Deploy, true, at);
        }
        task
    }

    #[test]
    fn test_empty_registry_defaults() {
        let metrics = MetricsTracker::new().compute(&Vec::<Task>::new(), Resources::none(), Utc::now());
        assert_eq!(metrics.completed_tasks, 0);
        assert_eq!(metrics.average_code_quality, 100.0);
        assert!(metrics.average_lead_time_secs.is_none());
        assert_eq!(metrics.build_success_rate, 0.0);
    }

    #[test]
    fn test_quality_and_lead_time_average_over_completed() {
        let now = Utc::now();
        let tasks = vec![
            completed("a", 90.0, 10, now),
            completed("b", 70.0, 30, now),
            Task::new("c", "c", TaskType::Test, Priority::Low),
        ];

        let metrics = MetricsTracker::new().compute(&tasks, Resources::none(), now);
        assert_eq!(metrics.completed_tasks, 2);
        assert_eq!(metrics.average_code_quality, 80.0);
        assert_eq!(metrics.average_lead_time_secs, Some(20.0));
    }

    #[test]
    fn test_build_rate_and_deploy_window() {
        let now = Utc::now();
        let tasks = vec![
            implementation("ok-recent", true, Some(now - Duration::hours(1)), now),
            implementation("ok-old", true, Some(now - Duration::hours(30)), now),
            implementation("broken", false, None, now),
            // Never built: does not count towards the rate.
            Task::new("idle", "idle", TaskType::Implementation, Priority::Low),
        ];

        let metrics = MetricsTracker::new().compute(&tasks, Resources::developers(2), now);
        assert!((metrics.build_success_rate - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(metrics.deploy_success_rate, 100.0);
        assert_eq!(metrics.deployments_last_24h, 1);
        assert_eq!(metrics.resource_usage.developers, 2);
    }
}
