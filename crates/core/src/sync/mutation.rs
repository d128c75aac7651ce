//! Identities and queued mutation records.

use std::fmt;
use std::sync::Mutex;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Client-minted placeholder token for an entity created while offline.
///
/// Derived from the mint-time epoch milliseconds; a monotonic floor
/// guarantees uniqueness within a session even for same-millisecond mints.
/// Placeholder tokens are correlation state only and are never sent to the
/// backend as identities.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LocalId(pub i64);

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local-{}", self.0)
    }
}

/// Mints session-unique placeholder identities.
#[derive(Debug, Default)]
pub struct LocalIdMinter {
    last: Mutex<i64>,
}

impl LocalIdMinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&self) -> LocalId {
        let mut last = self.last.lock().unwrap();
        let token = Utc::now().timestamp_millis().max(*last + 1);
        *last = token;
        LocalId(token)
    }
}

/// Identity of a domain entity: the backend-assigned identifier, or a
/// session-local placeholder minted for an offline create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityId {
    Remote(i64),
    Local(LocalId),
}

impl EntityId {
    pub fn as_remote(&self) -> Option<i64> {
        match self {
            Self::Remote(id) => Some(*id),
            Self::Local(_) => None,
        }
    }

    pub fn as_local(&self) -> Option<LocalId> {
        match self {
            Self::Remote(_) => None,
            Self::Local(token) => Some(*token),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(id) => write!(f, "remote-{id}"),
            Self::Local(token) => token.fmt(f),
        }
    }
}

/// The six supported mutation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationKind {
    CreateProject,
    UpdateProject,
    RemoveProject,
    CreateTask,
    UpdateTask,
    RemoveTask,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateProject => "createProject",
            Self::UpdateProject => "updateProject",
            Self::RemoveProject => "removeProject",
            Self::CreateTask => "createTask",
            Self::UpdateTask => "updateTask",
            Self::RemoveTask => "removeTask",
        }
    }
}

/// Queued write payload, one concrete shape per mutation kind.
///
/// `client_id` on the create variants is the correlation token for an
/// entity minted offline; it is resolved to a server identity during drain.
/// Update variants carry the full desired state so a single surviving
/// record is sufficient to replay the final outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum MutationPayload {
    CreateProject {
        client_id: LocalId,
        name: String,
        position: Option<i32>,
    },
    UpdateProject {
        id: EntityId,
        name: String,
        position: Option<i32>,
    },
    RemoveProject {
        id: EntityId,
    },
    CreateTask {
        client_id: LocalId,
        project_id: EntityId,
        name: String,
        completed: bool,
        due_date: Option<NaiveDate>,
        position: Option<i32>,
    },
    UpdateTask {
        id: EntityId,
        name: String,
        project_id: EntityId,
        completed: bool,
        due_date: Option<NaiveDate>,
        position: Option<i32>,
    },
    RemoveTask {
        id: EntityId,
    },
}

impl MutationPayload {
    pub fn kind(&self) -> MutationKind {
        match self {
            Self::CreateProject { .. } => MutationKind::CreateProject,
            Self::UpdateProject { .. } => MutationKind::UpdateProject,
            Self::RemoveProject { .. } => MutationKind::RemoveProject,
            Self::CreateTask { .. } => MutationKind::CreateTask,
            Self::UpdateTask { .. } => MutationKind::UpdateTask,
            Self::RemoveTask { .. } => MutationKind::RemoveTask,
        }
    }

    /// The placeholder token a `Create*` payload owns, if any.
    pub fn owned_client_id(&self) -> Option<LocalId> {
        match self {
            Self::CreateProject { client_id, .. } | Self::CreateTask { client_id, .. } => {
                Some(*client_id)
            }
            _ => None,
        }
    }

    /// Rewrite references to a resolved placeholder, returning the new
    /// payload when anything changed.
    pub fn resolve_placeholder(&self, token: LocalId, server_id: i64) -> Option<MutationPayload> {
        let target = EntityId::Local(token);
        let replacement = EntityId::Remote(server_id);
        let mut payload = self.clone();
        let changed = match &mut payload {
            Self::CreateProject { .. } => false,
            Self::UpdateProject { id, .. } | Self::RemoveProject { id } | Self::RemoveTask { id } => {
                if *id == target {
                    *id = replacement;
                    true
                } else {
                    false
                }
            }
            Self::CreateTask { project_id, .. } => {
                if *project_id == target {
                    *project_id = replacement;
                    true
                } else {
                    false
                }
            }
            Self::UpdateTask { id, project_id, .. } => {
                let mut changed = false;
                if *id == target {
                    *id = replacement;
                    changed = true;
                }
                if *project_id == target {
                    *project_id = replacement;
                    changed = true;
                }
                changed
            }
        };
        changed.then_some(payload)
    }
}

/// A durable queue record for a write performed while offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMutation {
    /// Queue-local key, assigned by the store.
    pub id: String,
    pub payload: MutationPayload,
    /// Insertion order. A coalesced record keeps the timestamp of the
    /// original create.
    pub timestamp: i64,
}

impl PendingMutation {
    pub fn kind(&self) -> MutationKind {
        self.payload.kind()
    }
}
