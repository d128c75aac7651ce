//! Domain models for projects and their tasks.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::sync::EntityId;

/// A project as cached locally: canonical server state, or an optimistic
/// local projection of it while writes are pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: EntityId,
    pub name: String,
    pub position: Option<i32>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// A task belonging to a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: EntityId,
    pub name: String,
    pub completed: bool,
    pub position: Option<i32>,
    pub project_id: EntityId,
    pub due_date: Option<NaiveDate>,
}

/// Write intent for a new task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub name: String,
    pub project_id: EntityId,
    pub due_date: Option<NaiveDate>,
}

/// Partial update intent for a project. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub position: Option<i32>,
}

/// Partial update intent for a task. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub name: Option<String>,
    pub project_id: Option<EntityId>,
    pub completed: Option<bool>,
    pub due_date: Option<NaiveDate>,
    pub position: Option<i32>,
}

impl Task {
    /// Apply a partial update in place.
    pub fn apply(&mut self, update: &TaskUpdate) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(project_id) = update.project_id {
            self.project_id = project_id;
        }
        if let Some(completed) = update.completed {
            self.completed = completed;
        }
        if let Some(due_date) = update.due_date {
            self.due_date = Some(due_date);
        }
        if let Some(position) = update.position {
            self.position = Some(position);
        }
    }
}

impl Project {
    /// Apply a partial update in place. Tasks are untouched.
    pub fn apply(&mut self, update: &ProjectUpdate) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(position) = update.position {
            self.position = Some(position);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::EntityId;

    fn task() -> Task {
        Task {
            id: EntityId::Remote(7),
            name: "Milk".to_string(),
            completed: false,
            position: Some(1),
            project_id: EntityId::Remote(1),
            due_date: None,
        }
    }

    #[test]
    fn task_update_overwrites_only_given_fields() {
        let mut subject = task();
        subject.apply(&TaskUpdate {
            completed: Some(true),
            ..Default::default()
        });
        assert!(subject.completed);
        assert_eq!(subject.name, "Milk");
        assert_eq!(subject.position, Some(1));
    }

    #[test]
    fn model_serialization_uses_camel_case() {
        let json = serde_json::to_value(task()).expect("serialize task");
        assert!(json.get("projectId").is_some());
        assert!(json.get("dueDate").is_some());
        assert!(json.get("project_id").is_none());
    }
}
