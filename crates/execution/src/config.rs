//! Scheduler configuration.

use devflow_core::{Resources, Stage, StageConfigs};
use serde::{Deserialize, Serialize};

/// Errors from validating a [`SchedulerConfig`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A probability outside `[0, 1]`
    #[error("{field} must be within [0, 1], got {value}")]
    Probability {
        /// Offending field
        field: String,
        /// Offending value
        value: f64,
    },

    /// `min_duration > max_duration`
    #[error("{stage} duration range is inverted ({min} > {max})")]
    DurationRange {
        /// Offending stage
        stage: Stage,
        /// Configured minimum
        min: u64,
        /// Configured maximum
        max: u64,
    },

    /// No task could ever be admitted
    #[error("activeTaskLimit must be at least 1")]
    ZeroActiveLimit,

    /// Non-positive or non-finite time scale
    #[error("timeScale must be a positive number, got {0}")]
    TimeScale(f64),

    /// Could not parse a config document
    #[error("invalid config document: {0}")]
    Parse(String),
}

/// How review resolution draws comments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReviewPolicy {
    /// Chance per review round that a comment is raised
    pub comment_chance: f64,
    /// Chance that a raised comment is major
    pub major_chance: f64,
    /// Progress points taken away by a major comment
    pub feedback_penalty: f64,
    /// Name recorded as the comment author
    pub reviewer: String,
}

impl Default for ReviewPolicy {
    fn default() -> Self {
        Self {
            comment_chance: 0.3,
            major_chance: 0.3,
            feedback_penalty: 30.0,
            reviewer: "reviewer1".to_string(),
        }
    }
}

/// Configuration for the task manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Max tasks analysing or in progress at once
    pub active_task_limit: usize,
    /// System-wide resource totals
    pub capacity: Resources,
    /// Review resolution policy
    pub review: ReviewPolicy,
    /// Per-stage pipeline policies
    pub stages: StageConfigs,
    /// Multiplier from stage time units to milliseconds of wall clock
    pub time_scale: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            active_task_limit: 3,
            capacity: Resources {
                cpu: 100,
                memory: 100,
                developers: 5,
                build_servers: 2,
                test_environments: 2,
            },
            review: ReviewPolicy::default(),
            stages: StageConfigs::default(),
            time_scale: 1.0,
        }
    }
}

impl SchedulerConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the active task limit.
    pub fn with_active_task_limit(mut self, limit: usize) -> Self {
        self.active_task_limit = limit;
        self
    }

    /// Set system capacity.
    pub fn with_capacity(mut self, capacity: Resources) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the review policy.
    pub fn with_review(mut self, review: ReviewPolicy) -> Self {
        self.review = review;
        self
    }

    /// Set the stage policies.
    pub fn with_stages(mut self, stages: StageConfigs) -> Self {
        self.stages = stages;
        self
    }

    /// Set the time scale.
    pub fn with_time_scale(mut self, scale: f64) -> Self {
        self.time_scale = scale;
        self
    }

    /// Check every field for a usable value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.active_task_limit == 0 {
            return Err(ConfigError::ZeroActiveLimit);
        }
        if !(self.time_scale.is_finite() && self.time_scale > 0.0) {
            return Err(ConfigError::TimeScale(self.time_scale));
        }

        check_probability("review.commentChance", self.review.comment_chance)?;
        check_probability("review.majorChance", self.review.major_chance)?;

        for stage in Stage::ORDER {
            let policy = self.stages.get(stage);
            check_probability(&format!("stages.{}.successRate", stage), policy.success_rate)?;
            if policy.min_duration > policy.max_duration {
                return Err(ConfigError::DurationRange {
                    stage,
                    min: policy.min_duration,
                    max: policy.max_duration,
                });
            }
        }
        Ok(())
    }

    /// Wall-clock delay for a stage lasting `units` time units.
    pub fn stage_delay(&self, units: u64) -> std::time::Duration {
        std::time::Duration::from_secs_f64(units as f64 * self.time_scale / 1000.0)
    }
}

fn check_probability(field: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Probability {
            field: field.to_string(),
            value,
        })
    }
}
