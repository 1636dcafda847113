//! Delayed delivery of stage completions.
//!
//! A started stage is represented by a [`StageCompletion`] decided up front;
//! a [`StageTimer`] delivers it on the scheduler's completion channel after
//! the stage's duration. The scheduler drains that channel at the start of
//! each tick, so completions never interleave with a tick's own mutations.

use devflow_core::{RunId, Stage, TaskId};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::debug;

/// Randomized result of one stage run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageRoll {
    /// Whether the stage succeeds
    pub success: bool,
    /// Duration in time units
    pub duration: u64,
    /// Coverage reported by a test run
    pub coverage: Option<f64>,
    /// Failing tests reported by a failed test run
    pub failed_tests: u32,
}

/// A stage run finishing.
#[derive(Debug, Clone, PartialEq)]
pub struct StageCompletion {
    /// Owning task
    pub task_id: TaskId,
    /// Pipeline run the stage belongs to
    pub run_id: RunId,
    /// Finished stage
    pub stage: Stage,
    /// Outcome
    pub roll: StageRoll,
}

/// Sending half of the completion channel.
pub type CompletionSender = mpsc::UnboundedSender<StageCompletion>;

/// Receiving half of the completion channel.
pub type CompletionReceiver = mpsc::UnboundedReceiver<StageCompletion>;

/// Schedules delivery of a stage completion.
pub trait StageTimer: Send {
    /// Deliver `completion` on `notify` once `after` has elapsed.
    fn schedule(&mut self, completion: StageCompletion, after: Duration, notify: CompletionSender);
}

impl<T: StageTimer + ?Sized> StageTimer for Box<T> {
    fn schedule(&mut self, completion: StageCompletion, after: Duration, notify: CompletionSender) {
        (**self).schedule(completion, after, notify);
    }
}

/// Real timer on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioStageTimer {
    handle: Handle,
}

impl TokioStageTimer {
    /// Timer spawning onto `handle`.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Timer on the runtime of the calling context, if there is one.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl StageTimer for TokioStageTimer {
    fn schedule(&mut self, completion: StageCompletion, after: Duration, notify: CompletionSender) {
        self.handle.spawn(async move {
            tokio::time::sleep(after).await;
            if notify.send(completion).is_err() {
                debug!("Completion dropped: scheduler is gone");
            }
        });
    }
}

/// Delivers every completion immediately; it is applied on the next tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateTimer;

impl StageTimer for ImmediateTimer {
    fn schedule(&mut self, completion: StageCompletion, _after: Duration, notify: CompletionSender) {
        if notify.send(completion).is_err() {
            debug!("Completion dropped: scheduler is gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion() -> StageCompletion {
        StageCompletion {
            task_id: TaskId::new("code-core"),
            run_id: RunId::new(),
            stage: Stage::Build,
            roll: StageRoll {
                success: true,
                duration: 3000,
                coverage: None,
                failed_tests: 0,
            },
        }
    }

    #[test]
    fn test_immediate_timer_delivers_now() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sent = completion();
        ImmediateTimer.schedule(sent.clone(), Duration::from_secs(3), tx);
        assert_eq!(rx.try_recv().unwrap(), sent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_timer_waits_for_duration() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = TokioStageTimer::current().unwrap();
        let sent = completion();
        timer.schedule(sent.clone(), Duration::from_millis(3000), tx);

        tokio::time::sleep(Duration::from_millis(2999)).await;
        assert!(rx.try_recv().is_err());

        let received = rx.recv().await.unwrap();
        assert_eq!(received, sent);
    }
}
