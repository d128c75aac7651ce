//! Wire types for the backend's query/mutation protocol.

use chrono::NaiveDate;
use serde::Deserialize;

use taskstack_core::projects::{Project, Task};
use taskstack_core::sync::EntityId;

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlError {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse<T> {
    pub data: Option<T>,
    pub errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RemoteTask {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub completed: bool,
    pub position: Option<i32>,
    pub project_id: i64,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RemoteProject {
    pub id: i64,
    pub name: String,
    pub position: Option<i32>,
    #[serde(default)]
    pub tasks: Vec<RemoteTask>,
}

impl From<RemoteTask> for Task {
    fn from(task: RemoteTask) -> Self {
        Task {
            id: EntityId::Remote(task.id),
            name: task.name,
            completed: task.completed,
            position: task.position,
            project_id: EntityId::Remote(task.project_id),
            due_date: task.due_date,
        }
    }
}

impl From<RemoteProject> for Project {
    fn from(project: RemoteProject) -> Self {
        Project {
            id: EntityId::Remote(project.id),
            name: project.name,
            position: project.position,
            tasks: project.tasks.into_iter().map(Task::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProjectsData {
    pub projects: Vec<RemoteProject>,
}

/// Mutation envelopes: each mutation answers with the touched entity under
/// a field named after the operation.

#[derive(Debug, Deserialize)]
pub(crate) struct EntityRef {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProjectEnvelope {
    pub project: EntityRef,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TaskEnvelope {
    pub task: EntityRef,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateProjectData {
    pub create_project: ProjectEnvelope,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateProjectData {
    #[allow(dead_code)]
    pub update_project: ProjectEnvelope,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RemoveProjectData {
    #[allow(dead_code)]
    pub remove_project: ProjectEnvelope,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateTaskData {
    pub create_task: TaskEnvelope,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateTaskData {
    #[allow(dead_code)]
    pub update_task: TaskEnvelope,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RemoveTaskData {
    #[allow(dead_code)]
    pub remove_task: TaskEnvelope,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateProjectPositionData {
    #[allow(dead_code)]
    pub update_project_position: ProjectEnvelope,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateTaskPositionData {
    #[allow(dead_code)]
    pub update_task_position: TaskEnvelope,
}
