//! Flattening of the nested project/task structure into the selectable
//! catalog presented to callers.

use std::collections::BTreeMap;
use tracing::info;

use crate::models::bamboo::{CatalogEntry, ProjectRef, TimeTrackingMeta};

/// Flatten `meta.projects_with_tasks` into a name-keyed catalog.
///
/// A project without tasks becomes one entry standing for itself; a project
/// with tasks contributes one entry per task, each carrying a reference to
/// its project. Duplicate names collide last-write-wins in project iteration
/// order. Rebuilt from scratch on every login.
pub fn flatten(meta: &TimeTrackingMeta) -> BTreeMap<String, CatalogEntry> {
    let mut catalog = BTreeMap::new();

    for project in &meta.projects_with_tasks {
        if project.tasks.is_empty() {
            catalog.insert(
                project.name.clone(),
                CatalogEntry {
                    id: project.id,
                    name: project.name.clone(),
                    parent: None,
                },
            );
        } else {
            for task in &project.tasks {
                catalog.insert(
                    task.name.clone(),
                    CatalogEntry {
                        id: task.id,
                        name: task.name.clone(),
                        parent: Some(ProjectRef {
                            id: project.id,
                            name: project.name.clone(),
                        }),
                    },
                );
            }
        }
    }

    info!(
        "Flattened {} project(s) into {} catalog entries",
        meta.projects_with_tasks.len(),
        catalog.len()
    );
    catalog
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::bamboo::{Project, Task};

    fn meta(projects: Vec<Project>) -> TimeTrackingMeta {
        TimeTrackingMeta { timesheet_id: 1, projects_with_tasks: projects }
    }

    fn task(id: i64, name: &str) -> Task {
        Task { id, name: name.to_string() }
    }

    #[test]
    fn projects_and_tasks_flatten_to_entries() {
        let catalog = flatten(&meta(vec![
            Project { id: 10, name: "Internal".into(), tasks: vec![] },
            Project { id: 11, name: "Support".into(), tasks: vec![] },
            Project {
                id: 12,
                name: "Platform".into(),
                tasks: vec![task(120, "Backend"), task(121, "Frontend")],
            },
        ]));

        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog["Internal"].id, 10);
        assert!(catalog["Internal"].parent.is_none());
        assert!(catalog["Support"].parent.is_none());

        let backend = &catalog["Backend"];
        let frontend = &catalog["Frontend"];
        assert_eq!(backend.id, 120);
        assert_eq!(backend.parent.as_ref().unwrap().id, 12);
        assert_eq!(
            backend.parent.as_ref().map(|p| p.id),
            frontend.parent.as_ref().map(|p| p.id)
        );
    }

    #[test]
    fn duplicate_names_are_last_write_wins() {
        let catalog = flatten(&meta(vec![
            Project { id: 1, name: "Ops".into(), tasks: vec![] },
            Project { id: 2, name: "Ops".into(), tasks: vec![] },
        ]));

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog["Ops"].id, 2);
    }
}
