//! Task bookkeeping and capability-based matching.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{error, info};

use fabric_primitives::ComponentId;

use crate::task::{Task, TaskStatus};
use crate::{TaskError, TaskResult};

/// Callback invoked with the task id and a task snapshot.
pub type TaskCallback = Arc<dyn Fn(&str, &Task) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    created: Vec<TaskCallback>,
    assigned: Vec<TaskCallback>,
    status_changed: Vec<TaskCallback>,
}

/// In-memory task directory with assignment and status tracking.
pub struct TaskManager {
    tasks: RwLock<HashMap<String, Task>>,
    callbacks: std::sync::RwLock<Callbacks>,
}

impl TaskManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        info!("task manager initialized");
        Self {
            tasks: RwLock::new(HashMap::new()),
            callbacks: std::sync::RwLock::new(Callbacks::default()),
        }
    }

    /// Stores a new task, returning its id.
    pub async fn create_task(&self, task: Task) -> String {
        let id = task.id().to_string();
        let snapshot = task.clone();
        self.tasks.write().await.insert(id.clone(), task);
        info!(task = %id, name = snapshot.name(), "task created");
        self.fire(|cb| &cb.created, &id, &snapshot);
        id
    }

    /// Assigns a task to a component.
    ///
    /// Reassignment is allowed and recorded as a fresh history entry; the
    /// assignee is overwritten only by such an explicit call.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NotFound`] for unknown ids and
    /// [`TaskError::Terminal`] when the task is already finished.
    pub async fn assign_task(&self, task_id: &str, agent: ComponentId) -> TaskResult<()> {
        let snapshot = {
            let mut tasks = self.tasks.write().await;
            let task = tasks.get_mut(task_id).ok_or_else(|| TaskError::NotFound {
                id: task_id.to_string(),
            })?;
            if task.status().is_terminal() {
                return Err(TaskError::Terminal {
                    id: task_id.to_string(),
                    status: task.status(),
                });
            }
            task.record_status(
                TaskStatus::Assigned,
                Some(agent.clone()),
                Some(format!("task assigned to {agent}")),
            );
            task.clone()
        };
        info!(task = %task_id, agent = %agent, "task assigned");
        self.fire(|cb| &cb.assigned, task_id, &snapshot);
        Ok(())
    }

    /// Updates a task's status, optionally recording a result payload.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NotFound`] for unknown ids and
    /// [`TaskError::Terminal`] when the task is already finished.
    pub async fn update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        agent: Option<ComponentId>,
        message: Option<String>,
        result: Option<Value>,
    ) -> TaskResult<()> {
        let snapshot = {
            let mut tasks = self.tasks.write().await;
            let task = tasks.get_mut(task_id).ok_or_else(|| TaskError::NotFound {
                id: task_id.to_string(),
            })?;
            if task.status().is_terminal() {
                return Err(TaskError::Terminal {
                    id: task_id.to_string(),
                    status: task.status(),
                });
            }
            task.record_status(status, agent, message);
            if let Some(result) = result {
                task.set_result(result);
            }
            task.clone()
        };
        info!(task = %task_id, status = %status, "task status updated");
        self.fire(|cb| &cb.status_changed, task_id, &snapshot);
        Ok(())
    }

    /// Returns a task snapshot by id.
    pub async fn get_task(&self, task_id: &str) -> Option<Task> {
        self.tasks.read().await.get(task_id).cloned()
    }

    /// Returns every task currently assigned to a component.
    pub async fn get_agent_tasks(&self, agent: &ComponentId) -> Vec<Task> {
        self.tasks
            .read()
            .await
            .values()
            .filter(|task| task.assigned_to() == Some(agent))
            .cloned()
            .collect()
    }

    /// Returns tasks in the given status.
    pub async fn find_by_status(&self, status: TaskStatus) -> Vec<Task> {
        self.tasks
            .read()
            .await
            .values()
            .filter(|task| task.status() == status)
            .cloned()
            .collect()
    }

    /// Returns unassigned (CREATED) tasks whose requirements intersect the
    /// given capabilities.
    pub async fn find_for_capabilities(&self, capabilities: &[String]) -> Vec<Task> {
        self.tasks
            .read()
            .await
            .values()
            .filter(|task| task.status() == TaskStatus::Created)
            .filter(|task| task.wants_any_capability(capabilities))
            .cloned()
            .collect()
    }

    /// Registers a callback fired when a task is created.
    pub fn on_created(&self, callback: TaskCallback) {
        self.callbacks
            .write()
            .expect("callback lock poisoned")
            .created
            .push(callback);
    }

    /// Registers a callback fired when a task is assigned.
    pub fn on_assigned(&self, callback: TaskCallback) {
        self.callbacks
            .write()
            .expect("callback lock poisoned")
            .assigned
            .push(callback);
    }

    /// Registers a callback fired on every status change.
    pub fn on_status_changed(&self, callback: TaskCallback) {
        self.callbacks
            .write()
            .expect("callback lock poisoned")
            .status_changed
            .push(callback);
    }

    fn fire<F>(&self, select: F, task_id: &str, task: &Task)
    where
        F: Fn(&Callbacks) -> &Vec<TaskCallback>,
    {
        let callbacks: Vec<TaskCallback> = {
            let guard = self.callbacks.read().expect("callback lock poisoned");
            select(&guard).clone()
        };
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(task_id, task))).is_err() {
                error!(task = %task_id, "task callback panicked");
            }
        }
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn agent(raw: &str) -> ComponentId {
        ComponentId::new(raw).unwrap()
    }

    fn task(name: &str, capability: &str) -> Task {
        Task::builder(name)
            .require_capability(capability)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn assignment_sets_assignee_once_then_only_explicitly() {
        let manager = TaskManager::new();
        let id = manager.create_task(task("t", "plan")).await;

        manager.assign_task(&id, agent("athena")).await.unwrap();
        let assigned = manager.get_task(&id).await.unwrap();
        assert_eq!(assigned.assigned_to(), Some(&agent("athena")));

        // A status change by another agent does not steal the assignment.
        manager
            .update_task_status(&id, TaskStatus::InProgress, Some(agent("ergon")), None, None)
            .await
            .unwrap();
        let in_progress = manager.get_task(&id).await.unwrap();
        assert_eq!(in_progress.assigned_to(), Some(&agent("athena")));

        // Explicit reassignment does.
        manager.assign_task(&id, agent("ergon")).await.unwrap();
        let reassigned = manager.get_task(&id).await.unwrap();
        assert_eq!(reassigned.assigned_to(), Some(&agent("ergon")));
        assert_eq!(reassigned.status_history().len(), 4);
    }

    #[tokio::test]
    async fn history_is_append_only_and_ordered() {
        let manager = TaskManager::new();
        let id = manager.create_task(task("t", "plan")).await;
        manager.assign_task(&id, agent("athena")).await.unwrap();
        manager
            .update_task_status(&id, TaskStatus::Accepted, Some(agent("athena")), None, None)
            .await
            .unwrap();
        manager
            .update_task_status(
                &id,
                TaskStatus::Completed,
                Some(agent("athena")),
                Some("done".into()),
                Some(serde_json::json!({"ok": true})),
            )
            .await
            .unwrap();

        let finished = manager.get_task(&id).await.unwrap();
        let history = finished.status_history();
        assert_eq!(history.len(), 4);
        for window in history.windows(2) {
            assert!(window[0].timestamp <= window[1].timestamp);
        }
        assert_eq!(finished.result().unwrap()["ok"], true);
    }

    #[tokio::test]
    async fn terminal_tasks_reject_updates() {
        let manager = TaskManager::new();
        let id = manager.create_task(task("t", "plan")).await;
        manager
            .update_task_status(&id, TaskStatus::Cancelled, None, None, None)
            .await
            .unwrap();

        let err = manager
            .assign_task(&id, agent("athena"))
            .await
            .expect_err("terminal task must reject assignment");
        assert!(matches!(err, TaskError::Terminal { .. }));
    }

    #[tokio::test]
    async fn capability_matching_only_returns_created_tasks() {
        let manager = TaskManager::new();
        let open = manager.create_task(task("open", "plan")).await;
        let taken = manager.create_task(task("taken", "plan")).await;
        manager.create_task(task("other", "render")).await;
        manager.assign_task(&taken, agent("athena")).await.unwrap();

        let matches = manager
            .find_for_capabilities(&["plan".to_string()])
            .await;
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id(), open);

        assert!(
            manager
                .find_for_capabilities(&["unknown".to_string()])
                .await
                .is_empty()
        );
    }

    #[tokio::test]
    async fn callbacks_fire_and_are_isolated() {
        let manager = TaskManager::new();
        let created = Arc::new(AtomicUsize::new(0));
        let status_changes = Arc::new(AtomicUsize::new(0));

        manager.on_created(Arc::new(|_, _| panic!("callback exploded")));
        let counter = Arc::clone(&created);
        manager.on_created(Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let counter = Arc::clone(&status_changes);
        manager.on_status_changed(Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let id = manager.create_task(task("t", "plan")).await;
        manager
            .update_task_status(&id, TaskStatus::InProgress, None, None, None)
            .await
            .unwrap();

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(status_changes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let manager = TaskManager::new();
        let err = manager
            .assign_task("task-missing", agent("athena"))
            .await
            .expect_err("unknown task must fail");
        assert!(matches!(err, TaskError::NotFound { .. }));
        assert!(manager.get_task("task-missing").await.is_none());
    }

    #[tokio::test]
    async fn agent_and_status_queries() {
        let manager = TaskManager::new();
        let a = manager.create_task(task("a", "plan")).await;
        let b = manager.create_task(task("b", "plan")).await;
        manager.assign_task(&a, agent("athena")).await.unwrap();
        manager.assign_task(&b, agent("athena")).await.unwrap();
        manager
            .update_task_status(&b, TaskStatus::InProgress, None, None, None)
            .await
            .unwrap();

        assert_eq!(manager.get_agent_tasks(&agent("athena")).await.len(), 2);
        assert_eq!(manager.find_by_status(TaskStatus::Assigned).await.len(), 1);
        assert_eq!(
            manager.find_by_status(TaskStatus::InProgress).await.len(),
            1
        );
    }
}
