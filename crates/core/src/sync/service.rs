//! Composition root wiring the sync engine, monitor, store and executor.
//!
//! All collaborators are constructed explicitly and passed by handle; there
//! is no ambient module state. Tests build a fresh stack per case.

use std::sync::Arc;

use log::warn;

use crate::errors::Result;
use crate::projects::Project;

use super::{ConnectivityMonitor, OfflineRepositoryTrait, RemoteExecutor, SyncEngine};

/// Owning composition root of the sync core.
///
/// Construction wires the monitor's reconnect trigger to exactly one
/// background drain pass per offline→online transition.
pub struct SyncService {
    engine: Arc<SyncEngine>,
    monitor: Arc<ConnectivityMonitor>,
    store: Arc<dyn OfflineRepositoryTrait>,
}

impl SyncService {
    /// Build the sync stack. Must be called from within a Tokio runtime:
    /// reconnect-triggered drains are spawned onto the current runtime.
    pub fn new(
        store: Arc<dyn OfflineRepositoryTrait>,
        executor: Arc<dyn RemoteExecutor>,
        monitor: Arc<ConnectivityMonitor>,
    ) -> Self {
        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&store),
            executor,
            Arc::clone(&monitor),
        ));

        let handle = tokio::runtime::Handle::current();
        let drain_engine = Arc::downgrade(&engine);
        monitor.set_sync_trigger(move || {
            if let Some(engine) = drain_engine.upgrade() {
                handle.spawn(async move {
                    // Background failures are absorbed here; they are never
                    // thrown at an unrelated caller.
                    if let Err(err) = engine.drain().await {
                        warn!("background drain failed: {err}");
                    }
                });
            }
        });

        Self {
            engine,
            monitor,
            store,
        }
    }

    pub fn engine(&self) -> Arc<SyncEngine> {
        Arc::clone(&self.engine)
    }

    pub fn monitor(&self) -> Arc<ConnectivityMonitor> {
        Arc::clone(&self.monitor)
    }

    /// Prime the projection: canonical fetch when online (falling back to
    /// the persisted snapshot on failure), snapshot restore when offline.
    /// Also seeds the pending-mutation counter.
    pub async fn initial_load(&self) -> Result<Vec<Project>> {
        let projects = if self.monitor.is_online() {
            match self.engine.refresh().await {
                Ok(projects) => projects,
                Err(err) => {
                    warn!("initial fetch failed, falling back to snapshot: {err}");
                    self.engine.restore_from_snapshot().await?
                }
            }
        } else {
            self.engine.restore_from_snapshot().await?
        };

        let pending = self.store.list_mutations().await?;
        self.monitor.publish_pending_count(pending.len());
        Ok(projects)
    }

    /// Full reset of local offline state: queue, snapshot and projection.
    pub async fn reset(&self) -> Result<()> {
        self.store.clear_mutations().await?;
        self.store.save_snapshot(&[]).await?;
        self.engine.clear_projection();
        self.monitor.publish_pending_count(0);
        Ok(())
    }
}
