//! API client for the taskstack backend's query/mutation protocol.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, error};
use serde::de::DeserializeOwned;
use serde_json::json;

use taskstack_core::errors::RemoteError;
use taskstack_core::projects::Project;
use taskstack_core::sync::{RemoteExecutor, RemoteResult};

use crate::error::{RemoteApiError, Result};
use crate::types::{
    CreateProjectData, CreateTaskData, GraphQlResponse, ProjectsData, RemoveProjectData,
    RemoveTaskData, UpdateProjectData, UpdateProjectPositionData, UpdateTaskData,
    UpdateTaskPositionData,
};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;

const GET_PROJECTS: &str = "query { projects { id name position tasks { id name completed position projectId dueDate } } }";

const CREATE_PROJECT: &str = "mutation CreateProject($name: String!) { createProject(input: { name: $name }) { project { id name } } }";

const UPDATE_PROJECT: &str = "mutation UpdateProject($id: Int!, $name: String!) { updateProject(input: { id: $id, name: $name }) { project { id name } } }";

const REMOVE_PROJECT: &str = "mutation RemoveProject($id: Int!) { removeProject(input: { id: $id }) { project { id } } }";

const CREATE_TASK: &str = "mutation CreateTask($name: String!, $projectId: Int!, $dueDate: ISO8601Date) { createTask(input: { name: $name, projectId: $projectId, dueDate: $dueDate }) { task { id name completed dueDate } } }";

const UPDATE_TASK: &str = "mutation UpdateTask($id: Int!, $name: String, $projectId: Int, $completed: Boolean, $dueDate: ISO8601Date) { updateTask(input: { taskInput: { id: $id, name: $name, projectId: $projectId, completed: $completed, dueDate: $dueDate } }) { task { id name projectId completed dueDate } } }";

const REMOVE_TASK: &str = "mutation RemoveTask($id: Int!) { removeTask(input: { id: $id }) { task { id } } }";

const UPDATE_PROJECT_POSITION: &str = "mutation UpdateProjectPosition($id: ID!, $position: Int!) { updateProjectPosition(input: { id: $id, position: $position }) { project { id position } } }";

const UPDATE_TASK_POSITION: &str = "mutation UpdateTaskPosition($id: ID!, $position: Int!) { updateTaskPosition(input: { id: $id, position: $position }) { task { id position } } }";

/// Configuration for the remote client.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Endpoint of the backend's query protocol.
    pub api_url: String,
    /// Bearer token; can be rotated later with `set_auth_token`.
    pub auth_token: Option<String>,
}

/// Client for the taskstack backend API, implementing the sync core's
/// [`RemoteExecutor`] contract.
pub struct RemoteClient {
    client: reqwest::Client,
    api_url: String,
    auth_token: RwLock<Option<String>>,
}

impl RemoteClient {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            auth_token: RwLock::new(config.auth_token),
        })
    }

    /// Swap the bearer token after a re-authentication.
    pub fn set_auth_token(&self, token: Option<String>) {
        *self.auth_token.write().unwrap() = token;
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("API response error ({}): {}", status, preview);
    }

    /// Post one document and parse the enveloped response.
    async fn execute<T: DeserializeOwned>(
        &self,
        document: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        let mut request = self
            .client
            .post(&self.api_url)
            .json(&json!({ "query": document, "variables": variables }));
        let token = self.auth_token.read().unwrap().clone();
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            return Err(RemoteApiError::api(
                status.as_u16(),
                format!("Request failed: {body}"),
            ));
        }

        let parsed: GraphQlResponse<T> = serde_json::from_str(&body).map_err(|e| {
            error!(
                "Failed to deserialize response. Body: {}, Error: {}",
                body, e
            );
            RemoteApiError::from(e)
        })?;

        if let Some(errors) = parsed.errors {
            if !errors.is_empty() {
                let joined = errors
                    .into_iter()
                    .map(|e| e.message)
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(RemoteApiError::GraphQl(joined));
            }
        }

        parsed
            .data
            .ok_or_else(|| RemoteApiError::InvalidResponse("response carried no data".to_string()))
    }
}

#[async_trait]
impl RemoteExecutor for RemoteClient {
    async fn create_project(&self, name: &str) -> RemoteResult<i64> {
        let data: CreateProjectData = self
            .execute(CREATE_PROJECT, json!({ "name": name }))
            .await
            .map_err(RemoteError::from)?;
        Ok(data.create_project.project.id)
    }

    async fn update_project(&self, id: i64, name: &str) -> RemoteResult<()> {
        let _: UpdateProjectData = self
            .execute(UPDATE_PROJECT, json!({ "id": id, "name": name }))
            .await
            .map_err(RemoteError::from)?;
        Ok(())
    }

    async fn remove_project(&self, id: i64) -> RemoteResult<()> {
        let _: RemoveProjectData = self
            .execute(REMOVE_PROJECT, json!({ "id": id }))
            .await
            .map_err(RemoteError::from)?;
        Ok(())
    }

    async fn create_task(
        &self,
        name: &str,
        project_id: i64,
        due_date: Option<NaiveDate>,
    ) -> RemoteResult<i64> {
        let data: CreateTaskData = self
            .execute(
                CREATE_TASK,
                json!({ "name": name, "projectId": project_id, "dueDate": due_date }),
            )
            .await
            .map_err(RemoteError::from)?;
        Ok(data.create_task.task.id)
    }

    async fn update_task(
        &self,
        id: i64,
        name: &str,
        project_id: i64,
        completed: bool,
        due_date: Option<NaiveDate>,
    ) -> RemoteResult<()> {
        let _: UpdateTaskData = self
            .execute(
                UPDATE_TASK,
                json!({
                    "id": id,
                    "name": name,
                    "projectId": project_id,
                    "completed": completed,
                    "dueDate": due_date,
                }),
            )
            .await
            .map_err(RemoteError::from)?;
        Ok(())
    }

    async fn remove_task(&self, id: i64) -> RemoteResult<()> {
        let _: RemoveTaskData = self
            .execute(REMOVE_TASK, json!({ "id": id }))
            .await
            .map_err(RemoteError::from)?;
        Ok(())
    }

    async fn reposition_project(&self, id: i64, position: i32) -> RemoteResult<()> {
        // Position mutations take the identity as an opaque ID string.
        let _: UpdateProjectPositionData = self
            .execute(
                UPDATE_PROJECT_POSITION,
                json!({ "id": id.to_string(), "position": position }),
            )
            .await
            .map_err(RemoteError::from)?;
        Ok(())
    }

    async fn reposition_task(&self, id: i64, position: i32) -> RemoteResult<()> {
        let _: UpdateTaskPositionData = self
            .execute(
                UPDATE_TASK_POSITION,
                json!({ "id": id.to_string(), "position": position }),
            )
            .await
            .map_err(RemoteError::from)?;
        Ok(())
    }

    async fn fetch_projects(&self) -> RemoteResult<Vec<Project>> {
        let data: ProjectsData = self
            .execute(GET_PROJECTS, json!({}))
            .await
            .map_err(RemoteError::from)?;
        Ok(data.projects.into_iter().map(Project::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskstack_core::sync::EntityId;

    #[test]
    fn projects_response_maps_into_domain_models() {
        let body = r#"{
            "data": {
                "projects": [
                    {
                        "id": 4,
                        "name": "Groceries",
                        "position": 1,
                        "tasks": [
                            {
                                "id": 9,
                                "name": "Milk",
                                "completed": true,
                                "position": 2,
                                "projectId": 4,
                                "dueDate": "2026-08-20"
                            }
                        ]
                    }
                ]
            }
        }"#;

        let parsed: GraphQlResponse<ProjectsData> =
            serde_json::from_str(body).expect("parse response");
        let projects: Vec<Project> = parsed
            .data
            .expect("data present")
            .projects
            .into_iter()
            .map(Project::from)
            .collect();

        assert_eq!(projects[0].id, EntityId::Remote(4));
        assert_eq!(projects[0].tasks[0].project_id, EntityId::Remote(4));
        assert!(projects[0].tasks[0].completed);
        assert_eq!(
            projects[0].tasks[0].due_date,
            NaiveDate::from_ymd_opt(2026, 8, 20)
        );
    }

    #[test]
    fn create_response_yields_server_id() {
        let body = r#"{ "data": { "createProject": { "project": { "id": 12, "name": "Inbox" } } } }"#;
        let parsed: GraphQlResponse<CreateProjectData> =
            serde_json::from_str(body).expect("parse response");
        assert_eq!(parsed.data.expect("data present").create_project.project.id, 12);
    }

    #[test]
    fn query_level_errors_are_reported() {
        let body = r#"{ "data": null, "errors": [ { "message": "Unauthorized" } ] }"#;
        let parsed: GraphQlResponse<ProjectsData> =
            serde_json::from_str(body).expect("parse response");
        let errors = parsed.errors.expect("errors present");
        assert_eq!(errors[0].message, "Unauthorized");
    }
}
