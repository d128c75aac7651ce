//! Scenario tests for the sync engine over in-memory collaborators.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::errors::{Error, RemoteError, Result};
use crate::projects::{NewTask, Project, ProjectUpdate, Task, TaskUpdate};

use super::*;

// ────────────────────────────────────────────────────────────────────────
// In-memory store
// ────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryStore {
    unavailable: bool,
    mutations: Mutex<Vec<PendingMutation>>,
    snapshot: Mutex<Vec<Project>>,
    next: AtomicI64,
}

impl MemoryStore {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A store whose medium is gone: every operation no-ops.
    fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            unavailable: true,
            ..Default::default()
        })
    }

    fn queued(&self) -> Vec<PendingMutation> {
        self.mutations.lock().unwrap().clone()
    }
}

#[async_trait]
impl OfflineRepositoryTrait for MemoryStore {
    async fn append_mutation(&self, payload: MutationPayload) -> Result<String> {
        let seq = self.next.fetch_add(1, Ordering::SeqCst);
        let id = format!("m-{seq}");
        if self.unavailable {
            return Ok(id);
        }
        self.mutations.lock().unwrap().push(PendingMutation {
            id: id.clone(),
            payload,
            timestamp: seq,
        });
        Ok(id)
    }

    async fn list_mutations(&self) -> Result<Vec<PendingMutation>> {
        if self.unavailable {
            return Ok(Vec::new());
        }
        Ok(self.queued())
    }

    async fn update_mutation(&self, id: &str, payload: MutationPayload) -> Result<()> {
        if self.unavailable {
            return Ok(());
        }
        if let Some(record) = self
            .mutations
            .lock()
            .unwrap()
            .iter_mut()
            .find(|m| m.id == id)
        {
            record.payload = payload;
        }
        Ok(())
    }

    async fn remove_mutation(&self, id: &str) -> Result<()> {
        if self.unavailable {
            return Ok(());
        }
        self.mutations.lock().unwrap().retain(|m| m.id != id);
        Ok(())
    }

    async fn clear_mutations(&self) -> Result<()> {
        if self.unavailable {
            return Ok(());
        }
        self.mutations.lock().unwrap().clear();
        Ok(())
    }

    async fn save_snapshot(&self, projects: &[Project]) -> Result<()> {
        if self.unavailable {
            return Ok(());
        }
        *self.snapshot.lock().unwrap() = projects.to_vec();
        Ok(())
    }

    async fn load_snapshot(&self) -> Result<Vec<Project>> {
        if self.unavailable {
            return Ok(Vec::new());
        }
        Ok(self.snapshot.lock().unwrap().clone())
    }
}

// ────────────────────────────────────────────────────────────────────────
// Fake backend
// ────────────────────────────────────────────────────────────────────────

/// In-memory stand-in for the backend: records every call and maintains
/// canonical state so refetches return something coherent.
#[derive(Default)]
struct FakeBackend {
    calls: Mutex<Vec<String>>,
    projects: Mutex<Vec<Project>>,
    next_id: AtomicI64,
    /// Call-string prefixes that are forced to fail.
    failures: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl FakeBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI64::new(100),
            ..Default::default()
        })
    }

    fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI64::new(100),
            delay: Some(delay),
            ..Default::default()
        })
    }

    fn fail_on(&self, prefix: &str) {
        self.failures.lock().unwrap().push(prefix.to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn call_count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    async fn record(&self, call: String) -> std::result::Result<(), RemoteError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().unwrap().push(call.clone());
        let failed = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .any(|prefix| call.starts_with(prefix.as_str()));
        if failed {
            return Err(RemoteError::new(format!("injected failure for {call}")));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteExecutor for FakeBackend {
    async fn create_project(&self, name: &str) -> RemoteResult<i64> {
        self.record(format!("createProject:{name}")).await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.projects.lock().unwrap().push(Project {
            id: EntityId::Remote(id),
            name: name.to_string(),
            position: None,
            tasks: Vec::new(),
        });
        Ok(id)
    }

    async fn update_project(&self, id: i64, name: &str) -> RemoteResult<()> {
        self.record(format!("updateProject:{id}={name}")).await?;
        if let Some(project) = self
            .projects
            .lock()
            .unwrap()
            .iter_mut()
            .find(|p| p.id == EntityId::Remote(id))
        {
            project.name = name.to_string();
        }
        Ok(())
    }

    async fn remove_project(&self, id: i64) -> RemoteResult<()> {
        self.record(format!("removeProject:{id}")).await?;
        self.projects
            .lock()
            .unwrap()
            .retain(|p| p.id != EntityId::Remote(id));
        Ok(())
    }

    async fn create_task(
        &self,
        name: &str,
        project_id: i64,
        due_date: Option<NaiveDate>,
    ) -> RemoteResult<i64> {
        self.record(format!("createTask:{name}@{project_id}")).await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if let Some(project) = self
            .projects
            .lock()
            .unwrap()
            .iter_mut()
            .find(|p| p.id == EntityId::Remote(project_id))
        {
            project.tasks.push(Task {
                id: EntityId::Remote(id),
                name: name.to_string(),
                completed: false,
                position: None,
                project_id: EntityId::Remote(project_id),
                due_date,
            });
        }
        Ok(id)
    }

    async fn update_task(
        &self,
        id: i64,
        name: &str,
        project_id: i64,
        completed: bool,
        due_date: Option<NaiveDate>,
    ) -> RemoteResult<()> {
        self.record(format!("updateTask:{id}")).await?;
        let mut projects = self.projects.lock().unwrap();
        let mut moved: Option<Task> = None;
        for project in projects.iter_mut() {
            if let Some(index) = project.tasks.iter().position(|t| t.id == EntityId::Remote(id)) {
                let mut task = project.tasks.remove(index);
                task.name = name.to_string();
                task.completed = completed;
                task.due_date = due_date;
                task.project_id = EntityId::Remote(project_id);
                moved = Some(task);
                break;
            }
        }
        if let Some(task) = moved {
            if let Some(target) = projects
                .iter_mut()
                .find(|p| p.id == EntityId::Remote(project_id))
            {
                target.tasks.push(task);
            }
        }
        Ok(())
    }

    async fn remove_task(&self, id: i64) -> RemoteResult<()> {
        self.record(format!("removeTask:{id}")).await?;
        for project in self.projects.lock().unwrap().iter_mut() {
            project.tasks.retain(|t| t.id != EntityId::Remote(id));
        }
        Ok(())
    }

    async fn reposition_project(&self, id: i64, position: i32) -> RemoteResult<()> {
        self.record(format!("repositionProject:{id}@{position}"))
            .await?;
        if let Some(project) = self
            .projects
            .lock()
            .unwrap()
            .iter_mut()
            .find(|p| p.id == EntityId::Remote(id))
        {
            project.position = Some(position);
        }
        Ok(())
    }

    async fn reposition_task(&self, id: i64, position: i32) -> RemoteResult<()> {
        self.record(format!("repositionTask:{id}@{position}")).await?;
        for project in self.projects.lock().unwrap().iter_mut() {
            if let Some(task) = project.tasks.iter_mut().find(|t| t.id == EntityId::Remote(id)) {
                task.position = Some(position);
            }
        }
        Ok(())
    }

    async fn fetch_projects(&self) -> RemoteResult<Vec<Project>> {
        self.record("fetchProjects".to_string()).await?;
        Ok(self.projects.lock().unwrap().clone())
    }
}

// ────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────

fn build_engine(
    store: Arc<MemoryStore>,
    backend: Arc<FakeBackend>,
    online: bool,
) -> (Arc<SyncEngine>, Arc<ConnectivityMonitor>) {
    let monitor = ConnectivityMonitor::new(online);
    let engine = Arc::new(SyncEngine::new(store, backend, Arc::clone(&monitor)));
    (engine, monitor)
}

async fn seed_project(engine: &SyncEngine, backend: &FakeBackend, name: &str) -> i64 {
    let outcome = engine.create_project(name).await.expect("create project");
    assert_eq!(outcome, WriteOutcome::Executed);
    backend
        .projects
        .lock()
        .unwrap()
        .iter()
        .find(|p| p.name == name)
        .and_then(|p| p.id.as_remote())
        .expect("seeded project has a server id")
}

// ────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn offline_updates_replay_in_insertion_order() {
    let store = MemoryStore::new();
    let backend = FakeBackend::new();
    let (engine, monitor) = build_engine(Arc::clone(&store), Arc::clone(&backend), true);

    let project_id = seed_project(&engine, &backend, "Inbox").await;
    monitor.set_online(false);

    for name in ["Errands", "Chores", "Weekend"] {
        let outcome = engine
            .update_project(
                EntityId::Remote(project_id),
                ProjectUpdate {
                    name: Some(name.to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("queue update");
        assert_eq!(outcome, WriteOutcome::Queued);
    }
    assert_eq!(store.queued().len(), 3);
    assert_eq!(monitor.pending_count(), 3);

    monitor.set_online(true);
    let summary = engine.drain().await.expect("drain");
    assert_eq!(summary, DrainSummary { synced: 3, failed: 0 });

    // Replay preserved insertion order: the last rename wins.
    let renames: Vec<String> = backend
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("updateProject"))
        .collect();
    assert_eq!(
        renames,
        vec![
            format!("updateProject:{project_id}=Errands"),
            format!("updateProject:{project_id}=Chores"),
            format!("updateProject:{project_id}=Weekend"),
        ]
    );
    assert_eq!(engine.get_projects()[0].name, "Weekend");
    assert!(store.queued().is_empty());
    assert_eq!(monitor.pending_count(), 0);
}

#[tokio::test]
async fn offline_task_updates_coalesce_into_pending_create() {
    let store = MemoryStore::new();
    let backend = FakeBackend::new();
    let (engine, monitor) = build_engine(Arc::clone(&store), Arc::clone(&backend), true);

    let project_id = seed_project(&engine, &backend, "Groceries").await;
    monitor.set_online(false);

    engine
        .create_task(NewTask {
            name: "Milk".to_string(),
            project_id: EntityId::Remote(project_id),
            due_date: None,
        })
        .await
        .expect("queue create");
    let task_id = engine.get_projects()[0].tasks[0].id;
    assert!(task_id.is_local());

    let due = NaiveDate::from_ymd_opt(2026, 8, 20).expect("valid date");
    engine
        .update_task(
            task_id,
            TaskUpdate {
                name: Some("Oat milk".to_string()),
                due_date: Some(due),
                ..Default::default()
            },
        )
        .await
        .expect("first update");
    engine
        .update_task(
            task_id,
            TaskUpdate {
                completed: Some(true),
                ..Default::default()
            },
        )
        .await
        .expect("second update");

    // Both updates folded into the single pending create.
    let queued = store.queued();
    assert_eq!(queued.len(), 1);
    match &queued[0].payload {
        MutationPayload::CreateTask {
            name,
            completed,
            due_date,
            ..
        } => {
            assert_eq!(name, "Oat milk");
            assert!(completed);
            assert_eq!(*due_date, Some(due));
        }
        other => panic!("unexpected payload: {other:?}"),
    }

    monitor.set_online(true);
    let summary = engine.drain().await.expect("drain");
    assert_eq!(summary, DrainSummary { synced: 1, failed: 0 });

    assert_eq!(backend.call_count("createTask"), 1);
    // The completion flag is layered on with the server-assigned id; no
    // call ever carries a placeholder.
    assert_eq!(backend.calls().iter().filter(|c| **c == "updateTask:101").count(), 1);
    assert!(store.queued().is_empty());
}

#[tokio::test]
async fn remove_of_uncommitted_create_cancels_both() {
    let store = MemoryStore::new();
    let backend = FakeBackend::new();
    let (engine, monitor) = build_engine(Arc::clone(&store), Arc::clone(&backend), true);

    let project_id = seed_project(&engine, &backend, "Groceries").await;
    monitor.set_online(false);
    let calls_before = backend.calls().len();

    engine
        .create_task(NewTask {
            name: "Milk".to_string(),
            project_id: EntityId::Remote(project_id),
            due_date: None,
        })
        .await
        .expect("queue create");
    let task_id = engine.get_projects()[0].tasks[0].id;
    engine.remove_task(task_id).await.expect("cancel create");

    assert!(store.queued().is_empty());
    assert!(engine.get_projects()[0].tasks.is_empty());

    monitor.set_online(true);
    let summary = engine.drain().await.expect("drain");
    assert_eq!(summary, DrainSummary::default());
    assert_eq!(backend.calls().len(), calls_before);
}

#[tokio::test]
async fn concurrent_drain_triggers_run_one_pass() {
    let store = MemoryStore::new();
    let backend = FakeBackend::with_delay(Duration::from_millis(25));
    let (engine, monitor) = build_engine(Arc::clone(&store), Arc::clone(&backend), false);

    engine.create_project("Solo").await.expect("queue create");
    assert_eq!(store.queued().len(), 1);

    monitor.set_online(true);
    let (first, second) = tokio::join!(engine.drain(), engine.drain());
    let summaries = [first.expect("drain"), second.expect("drain")];

    assert_eq!(backend.call_count("createProject"), 1);
    assert_eq!(
        summaries
            .iter()
            .filter(|s| **s == DrainSummary { synced: 1, failed: 0 })
            .count(),
        1
    );
    assert_eq!(
        summaries
            .iter()
            .filter(|s| **s == DrainSummary::default())
            .count(),
        1
    );
}

#[tokio::test]
async fn offline_created_project_and_task_sync_with_real_ids() {
    let store = MemoryStore::new();
    let backend = FakeBackend::new();
    let (engine, monitor) = build_engine(Arc::clone(&store), Arc::clone(&backend), false);

    engine.create_project("Groceries").await.expect("queue project");
    let project_id = engine.get_projects()[0].id;
    assert!(project_id.is_local());

    engine
        .create_task(NewTask {
            name: "Milk".to_string(),
            project_id,
            due_date: None,
        })
        .await
        .expect("queue task");
    assert_eq!(store.queued().len(), 2);

    monitor.set_online(true);
    let summary = engine.drain().await.expect("drain");
    assert_eq!(summary, DrainSummary { synced: 2, failed: 0 });

    assert_eq!(backend.call_count("createProject"), 1);
    assert_eq!(backend.call_count("createTask"), 1);
    // The queued task create was resolved to the server-assigned project id.
    assert_eq!(backend.call_count("createTask:Milk@100"), 1);

    let projects = engine.get_projects();
    assert_eq!(projects[0].id, EntityId::Remote(100));
    assert_eq!(projects[0].tasks[0].id, EntityId::Remote(101));
    assert_eq!(projects[0].tasks[0].project_id, EntityId::Remote(100));
    assert!(store.queued().is_empty());
    assert_eq!(monitor.pending_count(), 0);
}

#[tokio::test]
async fn online_update_failure_rolls_back_and_reports() {
    let store = MemoryStore::new();
    let backend = FakeBackend::new();
    let (engine, _monitor) = build_engine(Arc::clone(&store), Arc::clone(&backend), true);

    let project_id = seed_project(&engine, &backend, "Groceries").await;
    engine
        .create_task(NewTask {
            name: "Milk".to_string(),
            project_id: EntityId::Remote(project_id),
            due_date: None,
        })
        .await
        .expect("create task");
    let task_id = engine.get_projects()[0].tasks[0].id;

    backend.fail_on("updateTask");
    let err = engine
        .update_task(
            task_id,
            TaskUpdate {
                completed: Some(true),
                ..Default::default()
            },
        )
        .await
        .expect_err("online failure must surface");
    assert!(matches!(err, Error::Remote(_)));

    // The optimistic toggle was rolled back and nothing was queued.
    assert!(!engine.get_projects()[0].tasks[0].completed);
    assert!(store.queued().is_empty());
}

#[tokio::test]
async fn failed_replay_step_stays_queued_without_blocking_later_records() {
    let store = MemoryStore::new();
    let backend = FakeBackend::new();
    let (engine, monitor) = build_engine(Arc::clone(&store), Arc::clone(&backend), true);

    let first = seed_project(&engine, &backend, "First").await;
    let second = seed_project(&engine, &backend, "Second").await;
    monitor.set_online(false);

    engine
        .update_project(
            EntityId::Remote(first),
            ProjectUpdate {
                name: Some("First renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("queue first");
    engine
        .update_project(
            EntityId::Remote(second),
            ProjectUpdate {
                name: Some("Second renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("queue second");

    backend.fail_on(&format!("updateProject:{first}"));
    monitor.set_online(true);
    let summary = engine.drain().await.expect("drain");
    assert_eq!(summary, DrainSummary { synced: 1, failed: 1 });

    // The failed record is retried on the next pass.
    let queued = store.queued();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].kind(), MutationKind::UpdateProject);
    assert_eq!(monitor.pending_count(), 1);

    backend.failures.lock().unwrap().clear();
    let summary = engine.drain().await.expect("second drain");
    assert_eq!(summary, DrainSummary { synced: 1, failed: 0 });
    assert!(store.queued().is_empty());
}

#[tokio::test]
async fn degraded_store_still_patches_projection() {
    let store = MemoryStore::unavailable();
    let backend = FakeBackend::new();
    let (engine, monitor) = build_engine(Arc::clone(&store), Arc::clone(&backend), false);

    let outcome = engine.create_project("Ephemeral").await.expect("no error");
    assert_eq!(outcome, WriteOutcome::Queued);
    assert_eq!(engine.get_projects().len(), 1);
    assert!(store.queued().is_empty());
    assert_eq!(monitor.pending_count(), 0);
}

#[tokio::test]
async fn reconnect_triggers_exactly_one_background_drain() {
    let store = MemoryStore::new();
    let backend = FakeBackend::new();
    let monitor = ConnectivityMonitor::new(false);
    let service = SyncService::new(
        Arc::clone(&store) as Arc<dyn OfflineRepositoryTrait>,
        Arc::clone(&backend) as Arc<dyn RemoteExecutor>,
        Arc::clone(&monitor),
    );
    let engine = service.engine();

    engine.create_project("Solo").await.expect("queue create");
    monitor.set_online(true);

    for _ in 0..100 {
        if store.queued().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(store.queued().is_empty(), "background drain did not run");
    assert_eq!(backend.call_count("createProject"), 1);
}

#[tokio::test]
async fn initial_load_restores_snapshot_when_offline() {
    let store = MemoryStore::new();
    let backend = FakeBackend::new();
    let monitor = ConnectivityMonitor::new(false);

    store
        .save_snapshot(&[Project {
            id: EntityId::Remote(4),
            name: "Cached".to_string(),
            position: None,
            tasks: Vec::new(),
        }])
        .await
        .expect("seed snapshot");

    let service = SyncService::new(
        Arc::clone(&store) as Arc<dyn OfflineRepositoryTrait>,
        Arc::clone(&backend) as Arc<dyn RemoteExecutor>,
        Arc::clone(&monitor),
    );
    let projects = service.initial_load().await.expect("initial load");

    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].name, "Cached");
    // Nothing was fetched while offline.
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn offline_move_into_offline_project_resolves_on_drain() {
    let store = MemoryStore::new();
    let backend = FakeBackend::new();
    let (engine, monitor) = build_engine(Arc::clone(&store), Arc::clone(&backend), true);

    let home = seed_project(&engine, &backend, "Home").await;
    engine
        .create_task(NewTask {
            name: "Report".to_string(),
            project_id: EntityId::Remote(home),
            due_date: None,
        })
        .await
        .expect("create task");
    let task_id = engine.get_projects()[0].tasks[0].id;
    monitor.set_online(false);

    engine.create_project("Archive").await.expect("queue project");
    let archive_id = engine
        .get_projects()
        .into_iter()
        .find(|p| p.name == "Archive")
        .map(|p| p.id)
        .expect("archive cached");
    engine
        .update_task(
            task_id,
            TaskUpdate {
                project_id: Some(archive_id),
                ..Default::default()
            },
        )
        .await
        .expect("queue move");

    monitor.set_online(true);
    let summary = engine.drain().await.expect("drain");
    assert_eq!(summary, DrainSummary { synced: 2, failed: 0 });

    // The move replayed against the archive's server id, not a placeholder.
    let task_server_id = task_id.as_remote().expect("task had a server id");
    assert_eq!(
        backend.call_count(&format!("updateTask:{task_server_id}")),
        1
    );
    let projects = engine.get_projects();
    let archive = projects
        .iter()
        .find(|p| p.name == "Archive")
        .expect("archive synced");
    assert_eq!(archive.id, EntityId::Remote(102));
    assert_eq!(archive.tasks.len(), 1);
}
