//! The sample project: architecture, code, test and documentation phases.

use anyhow::{ensure, Result};
use devflow_core::{Priority, Resources, TaskId, TaskType};
use devflow_execution::TaskManager;

struct SampleTask {
    id: &'static str,
    name: &'static str,
    task_type: TaskType,
    priority: Priority,
    cpu: u32,
    memory: u32,
}

const TASKS: &[SampleTask] = &[
    SampleTask { id: "arch-main", name: "System design", task_type: TaskType::Design, priority: Priority::High, cpu: 30, memory: 20 },
    SampleTask { id: "arch-req", name: "Requirement analysis", task_type: TaskType::Requirement, priority: Priority::High, cpu: 20, memory: 15 },
    SampleTask { id: "arch-sys", name: "System architecture", task_type: TaskType::Design, priority: Priority::High, cpu: 25, memory: 20 },
    SampleTask { id: "code-main", name: "Code generation", task_type: TaskType::Implementation, priority: Priority::Medium, cpu: 40, memory: 30 },
    SampleTask { id: "code-core", name: "Core features", task_type: TaskType::Implementation, priority: Priority::Medium, cpu: 35, memory: 25 },
    SampleTask { id: "code-api", name: "API implementation", task_type: TaskType::Implementation, priority: Priority::Medium, cpu: 30, memory: 20 },
    SampleTask { id: "test-main", name: "Test run", task_type: TaskType::Test, priority: Priority::Medium, cpu: 35, memory: 40 },
    SampleTask { id: "test-unit", name: "Unit tests", task_type: TaskType::Test, priority: Priority::Medium, cpu: 25, memory: 20 },
    SampleTask { id: "test-int", name: "Integration tests", task_type: TaskType::Test, priority: Priority::Medium, cpu: 30, memory: 35 },
    SampleTask { id: "doc-main", name: "Documentation", task_type: TaskType::Documentation, priority: Priority::Low, cpu: 20, memory: 25 },
    SampleTask { id: "doc-api", name: "API reference", task_type: TaskType::Documentation, priority: Priority::Low, cpu: 15, memory: 20 },
    SampleTask { id: "doc-user", name: "User manual", task_type: TaskType::Documentation, priority: Priority::Low, cpu: 15, memory: 20 },
];

/// (parent, child)
const SUBTASKS: &[(&str, &str)] = &[
    ("arch-main", "arch-req"),
    ("arch-main", "arch-sys"),
    ("code-main", "code-core"),
    ("code-main", "code-api"),
    ("test-main", "test-unit"),
    ("test-main", "test-int"),
    ("doc-main", "doc-api"),
    ("doc-main", "doc-user"),
];

/// (task, dependency)
const DEPENDENCIES: &[(&str, &str)] = &[
    ("arch-sys", "arch-req"),
    ("code-main", "arch-main"),
    ("code-api", "code-core"),
    ("test-main", "code-main"),
    ("test-int", "test-unit"),
    ("doc-main", "test-main"),
    ("doc-main", "code-main"),
    ("doc-user", "doc-api"),
];

/// Register the sample project on `manager`.
pub fn populate(manager: &mut TaskManager) -> Result<()> {
    for task in TASKS {
        manager.create_task(task.id, task.name, task.task_type, task.priority)?;
        let id = TaskId::new(task.id);
        ensure!(
            manager.set_requirements(&id, Resources::task(task.cpu, task.memory, 1)),
            "cannot set requirements of {}",
            id
        );
    }

    for (parent, child) in SUBTASKS {
        ensure!(
            manager.add_subtask(&TaskId::new(*parent), &TaskId::new(*child)),
            "cannot make {} a subtask of {}",
            child,
            parent
        );
    }

    for (task, dependency) in DEPENDENCIES {
        ensure!(
            manager.add_dependency(&TaskId::new(*task), &TaskId::new(*dependency)),
            "cannot make {} depend on {}",
            task,
            dependency
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use devflow_execution::{ImmediateTimer, SchedulerConfig, ScriptedDice};

    fn manager() -> TaskManager {
        let mut manager =
            TaskManager::new(SchedulerConfig::default(), ScriptedDice::new(vec![]), ImmediateTimer)
                .unwrap();
        populate(&mut manager).unwrap();
        manager
    }

    #[test]
    fn test_sample_tree_shape() {
        let manager = manager();
        let roots: Vec<_> = manager.roots().map(|t| t.id.as_str().to_string()).collect();
        assert_eq!(roots, vec!["arch-main", "code-main", "test-main", "doc-main"]);
        assert!(manager.tree().iter().all(|node| node.children.len() == 2));
    }

    #[test]
    fn test_sample_runs_to_completion() {
        let mut manager = manager();
        for _ in 0..1000 {
            manager.tick(5.0);
            if manager.is_settled() {
                break;
            }
        }
        assert!(manager.is_settled());
        assert_eq!(manager.metrics().completed_tasks, TASKS.len());
        assert_eq!(manager.metrics().deployments_last_24h, 3);
    }

    #[test]
    fn test_populating_twice_fails() {
        let mut manager = manager();
        assert!(populate(&mut manager).is_err());
    }
}
