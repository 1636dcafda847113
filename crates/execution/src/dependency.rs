//! Dependency resolution for tasks.

use devflow_core::{Task, TaskId, TaskStatus};
use std::collections::{HashMap, HashSet};

/// Result of dependency resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// All dependencies completed, ready to be admitted
    Ready,
    /// Waiting on these tasks
    Blocked(Vec<TaskId>),
}

impl Resolution {
    /// Whether the task may be admitted.
    pub fn is_ready(&self) -> bool {
        matches!(self, Resolution::Ready)
    }
}

/// Resolves task dependencies against the task registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyResolver;

impl DependencyResolver {
    /// Create a new resolver.
    pub fn new() -> Self {
        Self
    }

    /// Check whether every dependency of `task` is completed.
    ///
    /// A dependency missing from the registry counts as not completed.
    pub fn check(&self, tasks: &HashMap<TaskId, Task>, task: &Task) -> Resolution {
        let blocked: Vec<TaskId> = task
            .dependencies
            .iter()
            .filter(|dep| {
                tasks
                    .get(*dep)
                    .map_or(true, |t| t.status != TaskStatus::Completed)
            })
            .cloned()
            .collect();

        if blocked.is_empty() {
            Resolution::Ready
        } else {
            Resolution::Blocked(blocked)
        }
    }

    /// Whether making `task` depend on `dependency` would close a cycle,
    /// i.e. `task` is already reachable from `dependency`.
    pub fn would_create_cycle(
        &self,
        tasks: &HashMap<TaskId, Task>,
        task: &TaskId,
        dependency: &TaskId,
    ) -> bool {
        if task == dependency {
            return true;
        }

        let mut visited = HashSet::new();
        let mut stack = vec![dependency];
        while let Some(current) = stack.pop() {
            if current == task {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(t) = tasks.get(current) {
                stack.extend(t.dependencies.iter());
            }
        }
        false
    }

    /// Tasks that list `id` among their dependencies.
    pub fn dependents<'a>(
        &self,
        tasks: impl IntoIterator<Item = &'a Task>,
        id: &TaskId,
    ) -> Vec<TaskId> {
        tasks
            .into_iter()
            .filter(|t| t.dependencies.contains(id))
            .map(|t| t.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use devflow_core::{Priority, TaskType};

    fn registry(entries: Vec<(&str, Vec<&str>)>) -> HashMap<TaskId, Task> {
        entries
            .into_iter()
            .map(|(id, deps)| {
                let mut task = Task::new(id, id, TaskType::Design, Priority::Medium);
                task.dependencies = deps.into_iter().map(TaskId::new).collect();
                (task.id.clone(), task)
            })
            .collect()
    }

    #[test]
    fn test_check_reports_unfinished_dependencies() {
        let mut tasks = registry(vec![("a", vec![]), ("b", vec!["a", "missing"])]);
        let b = tasks[&TaskId::new("b")].clone();

        assert_eq!(
            DependencyResolver::new().check(&tasks, &b),
            Resolution::Blocked(vec![TaskId::new("a"), TaskId::new("missing")])
        );

        tasks.get_mut(&TaskId::new("a")).unwrap().complete(Utc::now());
        assert_eq!(
            DependencyResolver::new().check(&tasks, &b),
            Resolution::Blocked(vec![TaskId::new("missing")])
        );
    }

    #[test]
    fn test_no_dependencies_is_ready() {
        let tasks = registry(vec![("a", vec![])]);
        let a = &tasks[&TaskId::new("a")];
        assert!(DependencyResolver::new().check(&tasks, a).is_ready());
    }

    #[test]
    fn test_cycle_detection() {
        let tasks = registry(vec![("a", vec![]), ("b", vec!["a"]), ("c", vec!["b"])]);
        let resolver = DependencyResolver::new();

        assert!(resolver.would_create_cycle(&tasks, &"a".into(), &"c".into()));
        assert!(resolver.would_create_cycle(&tasks, &"a".into(), &"a".into()));
        assert!(!resolver.would_create_cycle(&tasks, &"c".into(), &"a".into()));
    }

    #[test]
    fn test_dependents() {
        let tasks = registry(vec![("a", vec![]), ("b", vec!["a"]), ("c", vec!["a", "b"])]);
        let mut found = DependencyResolver::new().dependents(tasks.values(), &"a".into());
        found.sort();
        assert_eq!(found, vec![TaskId::new("b"), TaskId::new("c")]);
    }
}
