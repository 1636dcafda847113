//! Typed publish/subscribe for scheduler events.

use devflow_core::{Event, EventKind};
use tracing::trace;

/// Event handler. Runs synchronously on the emitting tick.
pub type Handler = Box<dyn FnMut(&Event) + Send>;

/// Which events a subscription receives.
enum Filter {
    Kind(EventKind),
    Any,
}

/// Delivers events to subscribers in registration order.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<(Filter, Handler)>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one kind of event.
    pub fn on<F>(&mut self, kind: EventKind, handler: F)
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.subscribers.push((Filter::Kind(kind), Box::new(handler)));
    }

    /// Subscribe to every event.
    pub fn on_any<F>(&mut self, handler: F)
    where
        F: FnMut(&Event) + Send + 'static,
    {
        self.subscribers.push((Filter::Any, Box::new(handler)));
    }

    /// Deliver an event to every matching subscriber.
    pub fn emit(&mut self, event: &Event) {
        let kind = event.kind();
        trace!("emit {}", kind);
        for (filter, handler) in &mut self.subscribers {
            let matches = match filter {
                Filter::Kind(k) => *k == kind,
                Filter::Any => true,
            };
            if matches {
                handler(event);
            }
        }
    }

    /// Number of subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devflow_core::{Stage, TaskId};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_handlers_run_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            bus.on(EventKind::TaskCreated, move |_| seen.lock().unwrap().push(tag));
        }

        bus.emit(&Event::TaskCreated {
            task_id: TaskId::new("t"),
            name: "T".into(),
        });
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_kind_filter() {
        let builds = Arc::new(Mutex::new(0));
        let all = Arc::new(Mutex::new(0));
        let mut bus = EventBus::new();
        {
            let builds = Arc::clone(&builds);
            bus.on(EventKind::BuildFailed, move |_| *builds.lock().unwrap() += 1);
        }
        {
            let all = Arc::clone(&all);
            bus.on_any(move |_| *all.lock().unwrap() += 1);
        }

        let id = TaskId::new("code-core");
        bus.emit(&Event::StageFailed { task_id: id.clone(), stage: Stage::Build });
        bus.emit(&Event::StageFailed { task_id: id, stage: Stage::Test });

        assert_eq!(*builds.lock().unwrap(), 1);
        assert_eq!(*all.lock().unwrap(), 2);
        assert_eq!(bus.subscriber_count(), 2);
    }
}
