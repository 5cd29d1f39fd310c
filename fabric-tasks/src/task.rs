//! Task records and status history.

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use fabric_primitives::ComponentId;

use crate::{TaskError, TaskResult};

/// Status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task has been created and awaits assignment.
    Created,
    /// Task has been assigned to a component.
    Assigned,
    /// The assignee has accepted the task.
    Accepted,
    /// The assignee has rejected the task.
    Rejected,
    /// Work is in progress.
    InProgress,
    /// Completed successfully. Terminal.
    Completed,
    /// Failed to complete. Terminal.
    Failed,
    /// Cancelled before completion. Terminal.
    Cancelled,
}

impl TaskStatus {
    /// Returns `true` for statuses that end a task's lifecycle.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Assigned => "assigned",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Scheduling priority of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Background work.
    Low,
    /// Default priority.
    #[default]
    Normal,
    /// Time-sensitive work.
    High,
    /// Drop-everything work.
    Urgent,
}

/// One append-only entry in a task's status history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEntry {
    /// Status recorded by this entry.
    pub status: TaskStatus,
    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,
    /// Component responsible for the change, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<ComponentId>,
    /// Free-form context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A unit of work routed to a capable component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    required_capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    preferred_agent: Option<ComponentId>,
    #[serde(default)]
    parameters: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    priority: TaskPriority,
    #[serde(default)]
    metadata: Map<String, Value>,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    assigned_to: Option<ComponentId>,
    status: TaskStatus,
    status_history: Vec<StatusEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
}

impl Task {
    /// Starts building a task with the given name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> TaskBuilder {
        TaskBuilder {
            id: format!("task-{}", Uuid::new_v4()),
            name: name.into(),
            description: String::new(),
            required_capabilities: Vec::new(),
            preferred_agent: None,
            parameters: Map::new(),
            deadline: None,
            priority: TaskPriority::default(),
            metadata: Map::new(),
        }
    }

    /// Returns the task id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the task description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the capabilities a component needs to take this task.
    #[must_use]
    pub fn required_capabilities(&self) -> &[String] {
        &self.required_capabilities
    }

    /// Returns the preferred assignee, if any.
    #[must_use]
    pub fn preferred_agent(&self) -> Option<&ComponentId> {
        self.preferred_agent.as_ref()
    }

    /// Returns task-specific parameters.
    #[must_use]
    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    /// Returns the completion deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    /// Returns the scheduling priority.
    #[must_use]
    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    /// Returns additional metadata.
    #[must_use]
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the current assignee.
    #[must_use]
    pub fn assigned_to(&self) -> Option<&ComponentId> {
        self.assigned_to.as_ref()
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns the append-only status history.
    #[must_use]
    pub fn status_history(&self) -> &[StatusEntry] {
        &self.status_history
    }

    /// Returns the result payload, when recorded.
    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Checks whether the task's requirements intersect the given
    /// capability set.
    #[must_use]
    pub fn wants_any_capability(&self, capabilities: &[String]) -> bool {
        self.required_capabilities
            .iter()
            .any(|required| capabilities.iter().any(|offered| offered == required))
    }

    pub(crate) fn record_status(
        &mut self,
        status: TaskStatus,
        agent: Option<ComponentId>,
        message: Option<String>,
    ) {
        if status == TaskStatus::Assigned {
            if let Some(agent) = &agent {
                self.assigned_to = Some(agent.clone());
            }
        }
        self.status = status;
        self.status_history.push(StatusEntry {
            status,
            timestamp: Utc::now(),
            agent,
            message,
        });
    }

    pub(crate) fn set_result(&mut self, result: Value) {
        self.result = Some(result);
    }
}

/// Builder for [`Task`].
#[derive(Debug)]
pub struct TaskBuilder {
    id: String,
    name: String,
    description: String,
    required_capabilities: Vec<String>,
    preferred_agent: Option<ComponentId>,
    parameters: Map<String, Value>,
    deadline: Option<DateTime<Utc>>,
    priority: TaskPriority,
    metadata: Map<String, Value>,
}

impl TaskBuilder {
    /// Overrides the generated task id.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Adds a required capability.
    #[must_use]
    pub fn require_capability(mut self, capability: impl Into<String>) -> Self {
        self.required_capabilities.push(capability.into());
        self
    }

    /// Sets the preferred assignee.
    #[must_use]
    pub fn preferred_agent(mut self, agent: ComponentId) -> Self {
        self.preferred_agent = Some(agent);
        self
    }

    /// Adds a task parameter.
    #[must_use]
    pub fn parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Sets the completion deadline.
    #[must_use]
    pub fn deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets the scheduling priority.
    #[must_use]
    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Finalises the task in the CREATED state.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Invalid`] when the name is empty.
    pub fn build(self) -> TaskResult<Task> {
        if self.name.trim().is_empty() {
            return Err(TaskError::Invalid {
                reason: "task name cannot be empty".into(),
            });
        }

        let created_at = Utc::now();
        Ok(Task {
            id: self.id,
            name: self.name,
            description: self.description,
            required_capabilities: self.required_capabilities,
            preferred_agent: self.preferred_agent,
            parameters: self.parameters,
            deadline: self.deadline,
            priority: self.priority,
            metadata: self.metadata,
            created_at,
            assigned_to: None,
            status: TaskStatus::Created,
            status_history: vec![StatusEntry {
                status: TaskStatus::Created,
                timestamp: created_at,
                agent: None,
                message: Some("task created".into()),
            }],
            result: None,
        })
    }
}
