//! Aggregate project metrics.

use serde::{Deserialize, Serialize};
use crate::resource::Resources;

/// Snapshot of project-wide figures, recomputed every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetrics {
    /// Tasks in `COMPLETED`
    pub completed_tasks: usize,

    /// Mean code quality of completed tasks (100 when none completed)
    pub average_code_quality: f64,

    /// Technical debt summed over completed tasks
    pub total_technical_debt: f64,

    /// Review iterations summed over completed tasks
    pub total_review_iterations: u32,

    /// Mean start→completion time of completed tasks, in seconds
    pub average_lead_time_secs: Option<f64>,

    /// Successful builds over finished builds of implementation tasks (percent)
    pub build_success_rate: f64,

    /// Successful deploys over finished deploys (percent)
    pub deploy_success_rate: f64,

    /// Successful deployments in the trailing 24 hours
    pub deployments_last_24h: usize,

    /// Resources in use at the last tick
    pub resource_usage: Resources,
}

impl Default for ProjectMetrics {
    fn default() -> Self {
        Self {
            completed_tasks: 0,
            average_code_quality: 100.0,
            total_technical_debt: 0.0,
            total_review_iterations: 0,
            average_lead_time_secs: None,
            build_success_rate: 0.0,
            deploy_success_rate: 0.0,
            deployments_last_24h: 0,
            resource_usage: Resources::none(),
        }
    }
}
