//! Durable store contract for the pending queue and the cached snapshot.

use async_trait::async_trait;

use crate::errors::Result;
use crate::projects::Project;

use super::{MutationPayload, PendingMutation};

/// Crash-tolerant persistence for pending mutations and the entity
/// snapshot.
///
/// Implementations must commit each write before returning, and must
/// degrade to silent no-ops (empty results for reads) when the underlying
/// medium is unavailable — callers never see an error for that case.
#[async_trait]
pub trait OfflineRepositoryTrait: Send + Sync {
    /// Append a mutation with a monotonically non-decreasing timestamp and
    /// return its queue-local key.
    async fn append_mutation(&self, payload: MutationPayload) -> Result<String>;

    /// All queued mutations, ascending by timestamp.
    async fn list_mutations(&self) -> Result<Vec<PendingMutation>>;

    /// Replace the payload of an existing record, keeping its key and
    /// timestamp. No-op when the key is absent.
    async fn update_mutation(&self, id: &str, payload: MutationPayload) -> Result<()>;

    /// Remove a record. Idempotent.
    async fn remove_mutation(&self, id: &str) -> Result<()>;

    /// Wipe the queue. Full resets only, never during normal operation.
    async fn clear_mutations(&self) -> Result<()>;

    /// Replace the persisted snapshot with `projects` (clear-then-insert).
    async fn save_snapshot(&self, projects: &[Project]) -> Result<()>;

    /// Load the persisted snapshot.
    async fn load_snapshot(&self) -> Result<Vec<Project>>;
}
