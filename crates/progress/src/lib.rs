//! Progress Tracking
//!
//! Aggregate metrics over the task registry and the human-readable flow log.

#![warn(missing_docs)]

pub mod tracker;
pub mod flow_log;

pub use tracker::MetricsTracker;
pub use flow_log::{FlowLog, FlowEntry};
