//! Local projection cache and its optimistic patch functions.
//!
//! The patch functions are pure transformations over the cached project
//! list. They are idempotent with respect to the final field values, which
//! is what lets offline coalescing replace two queued operations with one
//! without changing the observable outcome.

use std::collections::HashSet;
use std::sync::RwLock;

use crate::projects::{Project, ProjectUpdate, Task, TaskUpdate};

use super::{EntityId, LocalId};

pub(crate) fn insert_project(projects: &mut Vec<Project>, project: Project) {
    projects.push(project);
}

pub(crate) fn patch_project(
    projects: &mut [Project],
    id: EntityId,
    update: &ProjectUpdate,
) -> bool {
    match projects.iter_mut().find(|p| p.id == id) {
        Some(project) => {
            project.apply(update);
            true
        }
        None => false,
    }
}

pub(crate) fn remove_project(projects: &mut Vec<Project>, id: EntityId) -> bool {
    let before = projects.len();
    projects.retain(|p| p.id != id);
    projects.len() != before
}

/// Insert a task under its owning project. Fails when the project is not
/// present in the snapshot.
pub(crate) fn insert_task(projects: &mut [Project], task: Task) -> bool {
    match projects.iter_mut().find(|p| p.id == task.project_id) {
        Some(project) => {
            project.tasks.push(task);
            true
        }
        None => false,
    }
}

/// Patch a task in place, relocating it when the update moves it to another
/// project that exists in the snapshot.
pub(crate) fn patch_task(projects: &mut [Project], id: EntityId, update: &TaskUpdate) -> bool {
    let Some(source_index) = projects.iter().position(|p| p.tasks.iter().any(|t| t.id == id))
    else {
        return false;
    };
    let Some(task_index) = projects[source_index].tasks.iter().position(|t| t.id == id) else {
        return false;
    };

    let target_id = update.project_id;
    let moves_out = target_id.is_some_and(|target| target != projects[source_index].id);
    if !moves_out {
        projects[source_index].tasks[task_index].apply(update);
        return true;
    }

    let mut task = projects[source_index].tasks.remove(task_index);
    task.apply(update);
    match target_id.and_then(|target| projects.iter_mut().find(|p| p.id == target)) {
        Some(project) => project.tasks.push(task),
        // Target not cached: keep the task where it was; the orphan filter
        // hides it until a refetch reconciles.
        None => projects[source_index].tasks.push(task),
    }
    true
}

pub(crate) fn remove_task(projects: &mut [Project], id: EntityId) -> bool {
    for project in projects.iter_mut() {
        let before = project.tasks.len();
        project.tasks.retain(|t| t.id != id);
        if project.tasks.len() != before {
            return true;
        }
    }
    false
}

/// Rewrite a resolved project placeholder to its server identity, including
/// task back-references.
pub(crate) fn resolve_project_id(projects: &mut [Project], token: LocalId, server_id: i64) {
    for project in projects.iter_mut() {
        if project.id == EntityId::Local(token) {
            project.id = EntityId::Remote(server_id);
        }
        for task in project.tasks.iter_mut() {
            if task.project_id == EntityId::Local(token) {
                task.project_id = EntityId::Remote(server_id);
            }
        }
    }
}

/// Rewrite a resolved task placeholder to its server identity.
pub(crate) fn resolve_task_id(projects: &mut [Project], token: LocalId, server_id: i64) {
    for project in projects.iter_mut() {
        for task in project.tasks.iter_mut() {
            if task.id == EntityId::Local(token) {
                task.id = EntityId::Remote(server_id);
            }
        }
    }
}

pub(crate) fn find_task(projects: &[Project], id: EntityId) -> Option<&Task> {
    projects
        .iter()
        .flat_map(|p| p.tasks.iter())
        .find(|t| t.id == id)
}

pub(crate) fn find_project(projects: &[Project], id: EntityId) -> Option<&Project> {
    projects.iter().find(|p| p.id == id)
}

/// Read-optimized snapshot of projects that UI collaborators consume.
///
/// The sync engine is the only writer; readers get clones and never block
/// admission or drain.
#[derive(Default)]
pub struct ProjectionCache {
    inner: RwLock<Vec<Project>>,
}

impl ProjectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole projection (canonical refetch / snapshot restore).
    pub fn replace(&self, projects: Vec<Project>) {
        *self.inner.write().unwrap() = projects;
    }

    /// Snapshot for UI reads. Tasks whose project is absent from the same
    /// snapshot are orphaned and filtered out.
    pub fn projects(&self) -> Vec<Project> {
        let inner = self.inner.read().unwrap();
        let known: HashSet<EntityId> = inner.iter().map(|p| p.id).collect();
        inner
            .iter()
            .map(|project| {
                let mut project = project.clone();
                project.tasks.retain(|t| known.contains(&t.project_id));
                project
            })
            .collect()
    }

    /// Raw clone, orphans included — used for rollback checkpoints and
    /// snapshot persistence.
    pub(crate) fn checkpoint(&self) -> Vec<Project> {
        self.inner.read().unwrap().clone()
    }

    /// Restore a previously taken checkpoint wholesale. No partial-apply
    /// states are observable.
    pub(crate) fn restore(&self, checkpoint: Vec<Project>) {
        *self.inner.write().unwrap() = checkpoint;
    }

    pub(crate) fn mutate<R>(&self, f: impl FnOnce(&mut Vec<Project>) -> R) -> R {
        f(&mut self.inner.write().unwrap())
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&[Project]) -> R) -> R {
        f(&self.inner.read().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(id: EntityId, name: &str) -> Project {
        Project {
            id,
            name: name.to_string(),
            position: None,
            tasks: Vec::new(),
        }
    }

    fn task(id: EntityId, project_id: EntityId, name: &str) -> Task {
        Task {
            id,
            name: name.to_string(),
            completed: false,
            position: None,
            project_id,
            due_date: None,
        }
    }

    #[test]
    fn sequential_patches_equal_single_merged_patch() {
        let base = {
            let mut projects = vec![project(EntityId::Remote(1), "Groceries")];
            insert_task(
                &mut projects,
                task(EntityId::Remote(7), EntityId::Remote(1), "Milk"),
            );
            projects
        };

        let mut stepwise = base.clone();
        patch_task(
            &mut stepwise,
            EntityId::Remote(7),
            &TaskUpdate {
                name: Some("Oat milk".to_string()),
                ..Default::default()
            },
        );
        patch_task(
            &mut stepwise,
            EntityId::Remote(7),
            &TaskUpdate {
                completed: Some(true),
                ..Default::default()
            },
        );

        let mut merged = base;
        patch_task(
            &mut merged,
            EntityId::Remote(7),
            &TaskUpdate {
                name: Some("Oat milk".to_string()),
                completed: Some(true),
                ..Default::default()
            },
        );

        assert_eq!(stepwise, merged);
    }

    #[test]
    fn patch_task_moves_between_projects() {
        let mut projects = vec![
            project(EntityId::Remote(1), "Home"),
            project(EntityId::Remote(2), "Work"),
        ];
        insert_task(
            &mut projects,
            task(EntityId::Remote(7), EntityId::Remote(1), "Report"),
        );

        let patched = patch_task(
            &mut projects,
            EntityId::Remote(7),
            &TaskUpdate {
                project_id: Some(EntityId::Remote(2)),
                ..Default::default()
            },
        );

        assert!(patched);
        assert!(projects[0].tasks.is_empty());
        assert_eq!(projects[1].tasks.len(), 1);
        assert_eq!(projects[1].tasks[0].project_id, EntityId::Remote(2));
    }

    #[test]
    fn orphaned_tasks_are_not_rendered() {
        let cache = ProjectionCache::new();
        let mut home = project(EntityId::Remote(1), "Home");
        home.tasks.push(task(
            EntityId::Remote(7),
            EntityId::Remote(99),
            "Dangling",
        ));
        home.tasks
            .push(task(EntityId::Remote(8), EntityId::Remote(1), "Kept"));
        cache.replace(vec![home]);

        let rendered = cache.projects();
        assert_eq!(rendered[0].tasks.len(), 1);
        assert_eq!(rendered[0].tasks[0].name, "Kept");
    }

    #[test]
    fn resolve_project_id_rewrites_task_references() {
        let token = LocalId(42);
        let mut projects = vec![project(EntityId::Local(token), "Groceries")];
        insert_task(
            &mut projects,
            task(EntityId::Local(LocalId(43)), EntityId::Local(token), "Milk"),
        );

        resolve_project_id(&mut projects, token, 12);

        assert_eq!(projects[0].id, EntityId::Remote(12));
        assert_eq!(projects[0].tasks[0].project_id, EntityId::Remote(12));
    }
}
