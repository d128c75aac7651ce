//! Remote executor contract: the network boundary supplied by the host.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::errors::RemoteError;
use crate::projects::Project;

/// Result type for remote executor calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Per-operation remote calls against the backend.
///
/// Every payload carries canonical server identities only — placeholder
/// tokens are resolved by the engine before a call is made. Creates return
/// the server-assigned identity.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn create_project(&self, name: &str) -> RemoteResult<i64>;

    async fn update_project(&self, id: i64, name: &str) -> RemoteResult<()>;

    async fn remove_project(&self, id: i64) -> RemoteResult<()>;

    async fn create_task(
        &self,
        name: &str,
        project_id: i64,
        due_date: Option<NaiveDate>,
    ) -> RemoteResult<i64>;

    async fn update_task(
        &self,
        id: i64,
        name: &str,
        project_id: i64,
        completed: bool,
        due_date: Option<NaiveDate>,
    ) -> RemoteResult<()>;

    async fn remove_task(&self, id: i64) -> RemoteResult<()>;

    /// Dedicated reposition call, layered after the primary create/update
    /// when a queued record carries a position.
    async fn reposition_project(&self, id: i64, position: i32) -> RemoteResult<()>;

    async fn reposition_task(&self, id: i64, position: i32) -> RemoteResult<()>;

    /// Canonical list query backing cache refetches.
    async fn fetch_projects(&self) -> RemoteResult<Vec<Project>>;
}
