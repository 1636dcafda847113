//! Admission ordering.

use devflow_core::{Task, TaskId};

/// Orders admission candidates by priority.
///
/// Critical before high before medium before low; equal priorities keep the
/// order they were given in (registration order).
#[derive(Debug, Clone, Copy, Default)]
pub struct PrioritySelector;

impl PrioritySelector {
    /// Create a new selector.
    pub fn new() -> Self {
        Self
    }

    /// Admission queue for `candidates`.
    pub fn queue<'a>(&self, candidates: impl IntoIterator<Item = &'a Task>) -> Vec<TaskId> {
        let mut queue: Vec<&Task> = candidates.into_iter().collect();
        // sort_by_key is stable
        queue.sort_by_key(|t| t.priority);
        queue.into_iter().map(|t| t.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devflow_core::{Priority, TaskType};

    #[test]
    fn test_priority_then_registration_order() {
        let tasks = vec![
            Task::new("low", "L", TaskType::Documentation, Priority::Low),
            Task::new("med-1", "M1", TaskType::Implementation, Priority::Medium),
            Task::new("crit", "C", TaskType::Design, Priority::Critical),
            Task::new("med-2", "M2", TaskType::Test, Priority::Medium),
            Task::new("high", "H", TaskType::Requirement, Priority::High),
        ];

        let ids: Vec<_> = PrioritySelector::new()
            .queue(&tasks)
            .into_iter()
            .map(|id| id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["crit", "high", "med-1", "med-2", "low"]);
    }
}
