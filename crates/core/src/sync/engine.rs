//! Sync engine: write admission, offline coalescing, and queue drain.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::errors::{Error, Result};
use crate::projects::{NewTask, Project, ProjectUpdate, Task, TaskUpdate};

use super::projection;
use super::{
    ConnectivityMonitor, EntityId, LocalId, LocalIdMinter, MutationPayload,
    OfflineRepositoryTrait, PendingMutation, ProjectionCache, RemoteExecutor,
};

/// How a write intent was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Executed against the backend while online.
    Executed,
    /// Applied locally and queued for replay.
    Queued,
}

/// Aggregate result of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub synced: usize,
    pub failed: usize,
}

/// Outcome of replaying one queued record.
enum Replayed {
    Done,
    CreatedProject(LocalId, i64),
    CreatedTask(LocalId, i64),
}

/// The policy layer of the sync core.
///
/// Owns the pending queue and the projection exclusively: UI collaborators
/// read the projection through [`get_projects`] and request writes through
/// the six write intents, never touching either directly. All state
/// transitions are serialized on `op_lock`, so coalescing and drain
/// ordering never observe interleaved queue mutations.
///
/// [`get_projects`]: SyncEngine::get_projects
pub struct SyncEngine {
    store: Arc<dyn OfflineRepositoryTrait>,
    executor: Arc<dyn RemoteExecutor>,
    monitor: Arc<ConnectivityMonitor>,
    projection: ProjectionCache,
    minter: LocalIdMinter,
    /// Serializes admission and per-record drain steps.
    op_lock: Mutex<()>,
    /// At most one drain pass; re-entrant triggers are dropped.
    drain_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn OfflineRepositoryTrait>,
        executor: Arc<dyn RemoteExecutor>,
        monitor: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self {
            store,
            executor,
            monitor,
            projection: ProjectionCache::new(),
            minter: LocalIdMinter::new(),
            op_lock: Mutex::new(()),
            drain_lock: Mutex::new(()),
        }
    }

    /// Read intent: the current projection, orphaned tasks filtered out.
    pub fn get_projects(&self) -> Vec<Project> {
        self.projection.projects()
    }

    // ────────────────────────────────────────────────────────────────────
    // Write intents
    // ────────────────────────────────────────────────────────────────────

    pub async fn create_project(&self, name: &str) -> Result<WriteOutcome> {
        let _guard = self.op_lock.lock().await;

        if self.monitor.is_online() {
            let server_id = self.executor.create_project(name).await?;
            self.projection.mutate(|projects| {
                projection::insert_project(
                    projects,
                    Project {
                        id: EntityId::Remote(server_id),
                        name: name.to_string(),
                        position: None,
                        tasks: Vec::new(),
                    },
                );
            });
            self.refetch_canonical().await;
            return Ok(WriteOutcome::Executed);
        }

        let client_id = self.minter.mint();
        self.projection.mutate(|projects| {
            projection::insert_project(
                projects,
                Project {
                    id: EntityId::Local(client_id),
                    name: name.to_string(),
                    position: None,
                    tasks: Vec::new(),
                },
            );
        });
        self.store
            .append_mutation(MutationPayload::CreateProject {
                client_id,
                name: name.to_string(),
                position: None,
            })
            .await?;
        self.after_offline_write().await;
        Ok(WriteOutcome::Queued)
    }

    pub async fn update_project(&self, id: EntityId, update: ProjectUpdate) -> Result<WriteOutcome> {
        let _guard = self.op_lock.lock().await;

        if self.monitor.is_online() {
            if let Some(server_id) = id.as_remote() {
                return self.update_project_online(server_id, update).await;
            }
            // Placeholder still awaiting drain: treat like an offline write
            // so the pending create picks the change up.
        }
        self.update_project_offline(id, update).await
    }

    pub async fn remove_project(&self, id: EntityId) -> Result<WriteOutcome> {
        let _guard = self.op_lock.lock().await;

        if self.monitor.is_online() {
            if let Some(server_id) = id.as_remote() {
                return self.remove_project_online(server_id).await;
            }
        }
        self.remove_project_offline(id).await
    }

    pub async fn create_task(&self, draft: NewTask) -> Result<WriteOutcome> {
        let _guard = self.op_lock.lock().await;

        if self.monitor.is_online() {
            if let Some(project_server_id) = draft.project_id.as_remote() {
                let server_id = self
                    .executor
                    .create_task(&draft.name, project_server_id, draft.due_date)
                    .await?;
                self.projection.mutate(|projects| {
                    projection::insert_task(
                        projects,
                        Task {
                            id: EntityId::Remote(server_id),
                            name: draft.name.clone(),
                            completed: false,
                            position: None,
                            project_id: draft.project_id,
                            due_date: draft.due_date,
                        },
                    );
                });
                self.refetch_canonical().await;
                return Ok(WriteOutcome::Executed);
            }
            // Owning project exists only locally; the create has to wait
            // for the project's own create to drain.
        }
        self.create_task_offline(draft).await
    }

    pub async fn update_task(&self, id: EntityId, update: TaskUpdate) -> Result<WriteOutcome> {
        let _guard = self.op_lock.lock().await;

        if self.monitor.is_online() {
            if let Some(server_id) = id.as_remote() {
                return self.update_task_online(server_id, update).await;
            }
        }
        self.update_task_offline(id, update).await
    }

    pub async fn remove_task(&self, id: EntityId) -> Result<WriteOutcome> {
        let _guard = self.op_lock.lock().await;

        if self.monitor.is_online() {
            if let Some(server_id) = id.as_remote() {
                return self.remove_task_online(server_id).await;
            }
        }
        self.remove_task_offline(id).await
    }

    // ────────────────────────────────────────────────────────────────────
    // Online admission
    // ────────────────────────────────────────────────────────────────────

    async fn update_project_online(
        &self,
        server_id: i64,
        update: ProjectUpdate,
    ) -> Result<WriteOutcome> {
        let id = EntityId::Remote(server_id);
        let checkpoint = self.projection.checkpoint();
        let patched = self
            .projection
            .mutate(|projects| projection::patch_project(projects, id, &update));
        if !patched {
            return Err(Error::NotFound(format!("project {id}")));
        }

        let result: std::result::Result<(), crate::errors::RemoteError> = async {
            if let Some(name) = &update.name {
                self.executor.update_project(server_id, name).await?;
            }
            if let Some(position) = update.position {
                self.executor.reposition_project(server_id, position).await?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.refetch_canonical().await;
                Ok(WriteOutcome::Executed)
            }
            Err(err) => {
                self.projection.restore(checkpoint);
                Err(err.into())
            }
        }
    }

    async fn remove_project_online(&self, server_id: i64) -> Result<WriteOutcome> {
        let id = EntityId::Remote(server_id);
        let checkpoint = self.projection.checkpoint();
        let removed = self
            .projection
            .mutate(|projects| projection::remove_project(projects, id));
        if !removed {
            return Err(Error::NotFound(format!("project {id}")));
        }

        match self.executor.remove_project(server_id).await {
            Ok(()) => {
                self.refetch_canonical().await;
                Ok(WriteOutcome::Executed)
            }
            Err(err) => {
                self.projection.restore(checkpoint);
                Err(err.into())
            }
        }
    }

    async fn update_task_online(&self, server_id: i64, update: TaskUpdate) -> Result<WriteOutcome> {
        let id = EntityId::Remote(server_id);
        let checkpoint = self.projection.checkpoint();
        let patched = self
            .projection
            .mutate(|projects| projection::patch_task(projects, id, &update));
        if !patched {
            return Err(Error::NotFound(format!("task {id}")));
        }

        let Some(merged) = self
            .projection
            .read(|projects| projection::find_task(projects, id).cloned())
        else {
            self.projection.restore(checkpoint);
            return Err(Error::NotFound(format!("task {id}")));
        };
        let Some(project_server_id) = merged.project_id.as_remote() else {
            // Moved into a project that exists only locally: queue instead,
            // the placeholder resolves during drain.
            self.projection.restore(checkpoint);
            return self.update_task_offline(id, update).await;
        };

        let changes_content = update.name.is_some()
            || update.project_id.is_some()
            || update.completed.is_some()
            || update.due_date.is_some();
        let result: std::result::Result<(), crate::errors::RemoteError> = async {
            if changes_content {
                self.executor
                    .update_task(
                        server_id,
                        &merged.name,
                        project_server_id,
                        merged.completed,
                        merged.due_date,
                    )
                    .await?;
            }
            if let Some(position) = update.position {
                self.executor.reposition_task(server_id, position).await?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.refetch_canonical().await;
                Ok(WriteOutcome::Executed)
            }
            Err(err) => {
                self.projection.restore(checkpoint);
                Err(err.into())
            }
        }
    }

    async fn remove_task_online(&self, server_id: i64) -> Result<WriteOutcome> {
        let id = EntityId::Remote(server_id);
        let checkpoint = self.projection.checkpoint();
        let removed = self
            .projection
            .mutate(|projects| projection::remove_task(projects, id));
        if !removed {
            return Err(Error::NotFound(format!("task {id}")));
        }

        match self.executor.remove_task(server_id).await {
            Ok(()) => {
                self.refetch_canonical().await;
                Ok(WriteOutcome::Executed)
            }
            Err(err) => {
                self.projection.restore(checkpoint);
                Err(err.into())
            }
        }
    }

    // ────────────────────────────────────────────────────────────────────
    // Offline admission & coalescing
    // ────────────────────────────────────────────────────────────────────

    async fn update_project_offline(
        &self,
        id: EntityId,
        update: ProjectUpdate,
    ) -> Result<WriteOutcome> {
        let patched = self
            .projection
            .mutate(|projects| projection::patch_project(projects, id, &update));
        if !patched {
            return Err(Error::NotFound(format!("project {id}")));
        }
        let Some(merged) = self
            .projection
            .read(|projects| projection::find_project(projects, id).cloned())
        else {
            return Err(Error::NotFound(format!("project {id}")));
        };

        if let Some(token) = id.as_local() {
            if let Some(existing) = self.find_pending_create(token).await? {
                // An update against a still-uncommitted create folds into
                // the create; there is nothing to tell the server yet.
                self.store
                    .update_mutation(
                        &existing.id,
                        MutationPayload::CreateProject {
                            client_id: token,
                            name: merged.name,
                            position: merged.position,
                        },
                    )
                    .await?;
                self.after_offline_write().await;
                return Ok(WriteOutcome::Queued);
            }
        }

        self.store
            .append_mutation(MutationPayload::UpdateProject {
                id,
                name: merged.name,
                position: update.position,
            })
            .await?;
        self.after_offline_write().await;
        Ok(WriteOutcome::Queued)
    }

    async fn remove_project_offline(&self, id: EntityId) -> Result<WriteOutcome> {
        let removed = self
            .projection
            .mutate(|projects| projection::remove_project(projects, id));
        if !removed {
            return Err(Error::NotFound(format!("project {id}")));
        }

        if let Some(token) = id.as_local() {
            if let Some(existing) = self.find_pending_create(token).await? {
                // The project never existed remotely; drop its create and
                // the creates of any tasks that only lived under it.
                self.store.remove_mutation(&existing.id).await?;
                for record in self.store.list_mutations().await? {
                    if let MutationPayload::CreateTask { project_id, .. } = &record.payload {
                        if *project_id == EntityId::Local(token) {
                            self.store.remove_mutation(&record.id).await?;
                        }
                    }
                }
                self.after_offline_write().await;
                return Ok(WriteOutcome::Queued);
            }
        }

        self.store
            .append_mutation(MutationPayload::RemoveProject { id })
            .await?;
        self.after_offline_write().await;
        Ok(WriteOutcome::Queued)
    }

    async fn create_task_offline(&self, draft: NewTask) -> Result<WriteOutcome> {
        let client_id = self.minter.mint();
        let inserted = self.projection.mutate(|projects| {
            projection::insert_task(
                projects,
                Task {
                    id: EntityId::Local(client_id),
                    name: draft.name.clone(),
                    completed: false,
                    position: None,
                    project_id: draft.project_id,
                    due_date: draft.due_date,
                },
            )
        });
        if !inserted {
            return Err(Error::NotFound(format!("project {}", draft.project_id)));
        }

        self.store
            .append_mutation(MutationPayload::CreateTask {
                client_id,
                project_id: draft.project_id,
                name: draft.name,
                completed: false,
                due_date: draft.due_date,
                position: None,
            })
            .await?;
        self.after_offline_write().await;
        Ok(WriteOutcome::Queued)
    }

    async fn update_task_offline(&self, id: EntityId, update: TaskUpdate) -> Result<WriteOutcome> {
        let patched = self
            .projection
            .mutate(|projects| projection::patch_task(projects, id, &update));
        if !patched {
            return Err(Error::NotFound(format!("task {id}")));
        }
        let Some(merged) = self
            .projection
            .read(|projects| projection::find_task(projects, id).cloned())
        else {
            return Err(Error::NotFound(format!("task {id}")));
        };

        if let Some(token) = id.as_local() {
            if let Some(existing) = self.find_pending_create(token).await? {
                self.store
                    .update_mutation(
                        &existing.id,
                        MutationPayload::CreateTask {
                            client_id: token,
                            project_id: merged.project_id,
                            name: merged.name,
                            completed: merged.completed,
                            due_date: merged.due_date,
                            position: merged.position,
                        },
                    )
                    .await?;
                self.after_offline_write().await;
                return Ok(WriteOutcome::Queued);
            }
        }

        self.store
            .append_mutation(MutationPayload::UpdateTask {
                id,
                name: merged.name,
                project_id: merged.project_id,
                completed: merged.completed,
                due_date: merged.due_date,
                position: update.position,
            })
            .await?;
        self.after_offline_write().await;
        Ok(WriteOutcome::Queued)
    }

    async fn remove_task_offline(&self, id: EntityId) -> Result<WriteOutcome> {
        let removed = self
            .projection
            .mutate(|projects| projection::remove_task(projects, id));
        if !removed {
            return Err(Error::NotFound(format!("task {id}")));
        }

        if let Some(token) = id.as_local() {
            if let Some(existing) = self.find_pending_create(token).await? {
                self.store.remove_mutation(&existing.id).await?;
                self.after_offline_write().await;
                return Ok(WriteOutcome::Queued);
            }
        }

        self.store
            .append_mutation(MutationPayload::RemoveTask { id })
            .await?;
        self.after_offline_write().await;
        Ok(WriteOutcome::Queued)
    }

    // ────────────────────────────────────────────────────────────────────
    // Drain
    // ────────────────────────────────────────────────────────────────────

    /// Replay the pending queue in insertion order.
    ///
    /// At most one pass runs at a time; a trigger that arrives while a pass
    /// is in flight is dropped. Records queued during the pass wait for the
    /// next trigger. A failed record stays queued and does not stop the
    /// pass. Dependent cached queries are invalidated once, after the pass.
    pub async fn drain(&self) -> Result<DrainSummary> {
        let Ok(_pass_guard) = self.drain_lock.try_lock() else {
            debug!("drain already in progress, trigger ignored");
            return Ok(DrainSummary::default());
        };
        if !self.monitor.is_online() {
            return Ok(DrainSummary::default());
        }

        let queued = {
            let _op = self.op_lock.lock().await;
            self.store.list_mutations().await?
        };
        if queued.is_empty() {
            return Ok(DrainSummary::default());
        }
        info!("draining {} pending mutations", queued.len());

        let mut summary = DrainSummary::default();
        let mut resolved: HashMap<LocalId, i64> = HashMap::new();

        for planned in queued {
            let _op = self.op_lock.lock().await;
            // Re-read the record: it may have been rewritten by an earlier
            // create's resolution, or coalesced away entirely.
            let Some(record) = self
                .store
                .list_mutations()
                .await?
                .into_iter()
                .find(|m| m.id == planned.id)
            else {
                continue;
            };

            match self.replay(&record.payload, &resolved).await {
                Ok(outcome) => {
                    self.store.remove_mutation(&record.id).await?;
                    summary.synced += 1;
                    match outcome {
                        Replayed::CreatedProject(token, server_id) => {
                            resolved.insert(token, server_id);
                            self.apply_project_resolution(token, server_id).await?;
                        }
                        Replayed::CreatedTask(token, server_id) => {
                            resolved.insert(token, server_id);
                            self.apply_task_resolution(token, server_id).await?;
                        }
                        Replayed::Done => {}
                    }
                }
                Err(err) => {
                    warn!(
                        "replay failed for {} mutation {}: {}",
                        record.kind().as_str(),
                        record.id,
                        err
                    );
                    summary.failed += 1;
                }
            }
        }

        if summary.synced > 0 {
            // Invalidate dependent cached queries once per pass, not per
            // mutation.
            self.refetch_canonical().await;
        }
        self.publish_pending_count().await;
        info!(
            "drain complete: {} synced, {} failed",
            summary.synced, summary.failed
        );
        Ok(summary)
    }

    async fn replay(
        &self,
        payload: &MutationPayload,
        resolved: &HashMap<LocalId, i64>,
    ) -> Result<Replayed> {
        match payload {
            MutationPayload::CreateProject {
                client_id,
                name,
                position,
            } => {
                let server_id = self.executor.create_project(name).await?;
                if let Some(position) = position {
                    // The record is consumed either way: replaying it would
                    // duplicate the create.
                    if let Err(err) = self.executor.reposition_project(server_id, *position).await
                    {
                        warn!("reposition after project create failed: {err}");
                    }
                }
                Ok(Replayed::CreatedProject(*client_id, server_id))
            }
            MutationPayload::CreateTask {
                client_id,
                project_id,
                name,
                completed,
                due_date,
                position,
            } => {
                let project_server_id = resolve_remote(*project_id, resolved)?;
                let server_id = self
                    .executor
                    .create_task(name, project_server_id, *due_date)
                    .await?;
                if *completed {
                    if let Err(err) = self
                        .executor
                        .update_task(server_id, name, project_server_id, true, *due_date)
                        .await
                    {
                        warn!("completion after task create failed: {err}");
                    }
                }
                if let Some(position) = position {
                    if let Err(err) = self.executor.reposition_task(server_id, *position).await {
                        warn!("reposition after task create failed: {err}");
                    }
                }
                Ok(Replayed::CreatedTask(*client_id, server_id))
            }
            MutationPayload::UpdateProject { id, name, position } => {
                let server_id = resolve_remote(*id, resolved)?;
                self.executor.update_project(server_id, name).await?;
                if let Some(position) = position {
                    if let Err(err) = self.executor.reposition_project(server_id, *position).await
                    {
                        warn!("reposition after project update failed: {err}");
                    }
                }
                Ok(Replayed::Done)
            }
            MutationPayload::UpdateTask {
                id,
                name,
                project_id,
                completed,
                due_date,
                position,
            } => {
                let server_id = resolve_remote(*id, resolved)?;
                let project_server_id = resolve_remote(*project_id, resolved)?;
                self.executor
                    .update_task(server_id, name, project_server_id, *completed, *due_date)
                    .await?;
                if let Some(position) = position {
                    if let Err(err) = self.executor.reposition_task(server_id, *position).await {
                        warn!("reposition after task update failed: {err}");
                    }
                }
                Ok(Replayed::Done)
            }
            MutationPayload::RemoveProject { id } => {
                let server_id = resolve_remote(*id, resolved)?;
                self.executor.remove_project(server_id).await?;
                Ok(Replayed::Done)
            }
            MutationPayload::RemoveTask { id } => {
                let server_id = resolve_remote(*id, resolved)?;
                self.executor.remove_task(server_id).await?;
                Ok(Replayed::Done)
            }
        }
    }

    /// Rewrite a resolved project placeholder everywhere it is still
    /// referenced: later queued payloads and the projection.
    async fn apply_project_resolution(&self, token: LocalId, server_id: i64) -> Result<()> {
        self.rewrite_queued_placeholder(token, server_id).await?;
        self.projection
            .mutate(|projects| projection::resolve_project_id(projects, token, server_id));
        Ok(())
    }

    async fn apply_task_resolution(&self, token: LocalId, server_id: i64) -> Result<()> {
        self.rewrite_queued_placeholder(token, server_id).await?;
        self.projection
            .mutate(|projects| projection::resolve_task_id(projects, token, server_id));
        Ok(())
    }

    async fn rewrite_queued_placeholder(&self, token: LocalId, server_id: i64) -> Result<()> {
        for record in self.store.list_mutations().await? {
            if let Some(rewritten) = record.payload.resolve_placeholder(token, server_id) {
                self.store.update_mutation(&record.id, rewritten).await?;
            }
        }
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────────
    // Projection lifecycle
    // ────────────────────────────────────────────────────────────────────

    /// Fetch the canonical project list, replacing the projection and the
    /// persisted snapshot. Errors propagate to the caller.
    pub async fn refresh(&self) -> Result<Vec<Project>> {
        let projects = self.executor.fetch_projects().await?;
        self.projection.replace(projects.clone());
        if let Err(err) = self.store.save_snapshot(&projects).await {
            warn!("snapshot persist failed: {err}");
        }
        Ok(projects)
    }

    /// Prime the projection from the persisted snapshot (offline startup).
    pub async fn restore_from_snapshot(&self) -> Result<Vec<Project>> {
        let projects = self.store.load_snapshot().await?;
        self.projection.replace(projects.clone());
        Ok(projects)
    }

    pub(crate) fn clear_projection(&self) {
        self.projection.replace(Vec::new());
    }

    /// Recount the queue and publish to the monitor.
    pub(crate) async fn publish_pending_count(&self) {
        match self.store.list_mutations().await {
            Ok(mutations) => self.monitor.publish_pending_count(mutations.len()),
            Err(err) => warn!("pending count read failed: {err}"),
        }
    }

    // ────────────────────────────────────────────────────────────────────
    // Helpers
    // ────────────────────────────────────────────────────────────────────

    async fn find_pending_create(&self, token: LocalId) -> Result<Option<PendingMutation>> {
        let mutations = self.store.list_mutations().await?;
        Ok(mutations
            .into_iter()
            .find(|m| m.payload.owned_client_id() == Some(token)))
    }

    /// Absorbing variant of [`refresh`] for paths where the write itself
    /// already succeeded.
    ///
    /// [`refresh`]: SyncEngine::refresh
    async fn refetch_canonical(&self) {
        if let Err(err) = self.refresh().await {
            warn!("canonical refetch failed: {err}");
        }
    }

    async fn after_offline_write(&self) {
        let projects = self.projection.checkpoint();
        if let Err(err) = self.store.save_snapshot(&projects).await {
            warn!("snapshot persist failed: {err}");
        }
        self.publish_pending_count().await;
    }
}

fn resolve_remote(id: EntityId, resolved: &HashMap<LocalId, i64>) -> Result<i64> {
    match id {
        EntityId::Remote(server_id) => Ok(server_id),
        EntityId::Local(token) => resolved.get(&token).copied().ok_or_else(|| {
            Error::NotFound(format!("no server identity resolved for {token}"))
        }),
    }
}
