//! Repository implementing the core durable-store contract over sqlite.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use log::warn;
use uuid::Uuid;

use taskstack_core::errors::Result;
use taskstack_core::projects::Project;
use taskstack_core::sync::{MutationPayload, OfflineRepositoryTrait, PendingMutation};

use crate::db::{self, get_connection, spawn_writer, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{pending_mutations, snapshot_projects};

use super::model::{PendingMutationDB, SnapshotProjectDB};

struct StoreInner {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

/// SQLite-backed durable store for the pending queue and the cached
/// snapshot.
///
/// When the medium cannot be opened the store runs degraded: every
/// operation silently no-ops and reads come back empty, so the rest of the
/// system keeps working without durability.
pub struct OfflineRepository {
    inner: Option<StoreInner>,
    /// Floor for the next append timestamp, seeded from the stored queue
    /// so ordering stays non-decreasing across restarts.
    last_timestamp: Mutex<i64>,
}

impl OfflineRepository {
    /// Open (or create) the store under `app_data_dir`.
    pub fn open(app_data_dir: &str) -> Self {
        match Self::try_open(app_data_dir) {
            Ok((inner, last_timestamp)) => Self {
                inner: Some(inner),
                last_timestamp: Mutex::new(last_timestamp),
            },
            Err(err) => {
                warn!("offline store unavailable, running without durability: {err}");
                Self::unavailable()
            }
        }
    }

    /// A store with no usable medium: every operation no-ops.
    pub fn unavailable() -> Self {
        Self {
            inner: None,
            last_timestamp: Mutex::new(0),
        }
    }

    fn try_open(app_data_dir: &str) -> std::result::Result<(StoreInner, i64), StorageError> {
        let db_path = db::init(app_data_dir)?;
        db::run_migrations(&db_path)?;
        let pool = db::create_pool(&db_path)?;

        let mut conn = get_connection(&pool)?;
        let last_timestamp = pending_mutations::table
            .select(diesel::dsl::max(pending_mutations::timestamp))
            .first::<Option<i64>>(&mut conn)?
            .unwrap_or(0);

        let writer = spawn_writer(pool.as_ref().clone());
        Ok((StoreInner { pool, writer }, last_timestamp))
    }

    fn next_timestamp(&self) -> i64 {
        let mut last = self.last_timestamp.lock().unwrap();
        // Strictly increasing so same-millisecond appends keep a total
        // order even under clock adjustments.
        let timestamp = Utc::now().timestamp_millis().max(*last + 1);
        *last = timestamp;
        timestamp
    }
}

fn to_pending_mutation(row: PendingMutationDB) -> Result<PendingMutation> {
    let payload: MutationPayload = serde_json::from_str(&row.payload)?;
    Ok(PendingMutation {
        id: row.id,
        payload,
        timestamp: row.timestamp,
    })
}

#[async_trait]
impl OfflineRepositoryTrait for OfflineRepository {
    async fn append_mutation(&self, payload: MutationPayload) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        let Some(inner) = &self.inner else {
            return Ok(id);
        };

        let row = PendingMutationDB {
            id: id.clone(),
            kind: payload.kind().as_str().to_string(),
            payload: serde_json::to_string(&payload)?,
            timestamp: self.next_timestamp(),
        };
        inner
            .writer
            .exec(move |conn| {
                diesel::insert_into(pending_mutations::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await?;
        Ok(id)
    }

    async fn list_mutations(&self) -> Result<Vec<PendingMutation>> {
        let Some(inner) = &self.inner else {
            return Ok(Vec::new());
        };

        let mut conn = get_connection(&inner.pool)?;
        let rows = pending_mutations::table
            .order((
                pending_mutations::timestamp.asc(),
                pending_mutations::id.asc(),
            ))
            .load::<PendingMutationDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(to_pending_mutation).collect()
    }

    async fn update_mutation(&self, id: &str, payload: MutationPayload) -> Result<()> {
        let Some(inner) = &self.inner else {
            return Ok(());
        };

        let id = id.to_string();
        inner
            .writer
            .exec(move |conn| {
                let payload_json = serde_json::to_string(&payload)?;
                diesel::update(pending_mutations::table.find(&id))
                    .set((
                        pending_mutations::kind.eq(payload.kind().as_str()),
                        pending_mutations::payload.eq(payload_json),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn remove_mutation(&self, id: &str) -> Result<()> {
        let Some(inner) = &self.inner else {
            return Ok(());
        };

        let id = id.to_string();
        inner
            .writer
            .exec(move |conn| {
                diesel::delete(pending_mutations::table.find(&id))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn clear_mutations(&self) -> Result<()> {
        let Some(inner) = &self.inner else {
            return Ok(());
        };

        inner
            .writer
            .exec(move |conn| {
                diesel::delete(pending_mutations::table)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn save_snapshot(&self, projects: &[Project]) -> Result<()> {
        let Some(inner) = &self.inner else {
            return Ok(());
        };

        let rows = projects
            .iter()
            .enumerate()
            .map(|(ord, project)| {
                Ok(SnapshotProjectDB {
                    id: project.id.to_string(),
                    ord: ord as i32,
                    payload: serde_json::to_string(project)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        inner
            .writer
            .exec(move |conn| {
                diesel::delete(snapshot_projects::table)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                diesel::insert_into(snapshot_projects::table)
                    .values(&rows)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn load_snapshot(&self) -> Result<Vec<Project>> {
        let Some(inner) = &self.inner else {
            return Ok(Vec::new());
        };

        let mut conn = get_connection(&inner.pool)?;
        let rows = snapshot_projects::table
            .order(snapshot_projects::ord.asc())
            .load::<SnapshotProjectDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter()
            .map(|row| Ok(serde_json::from_str(&row.payload)?))
            .collect()
    }
}
