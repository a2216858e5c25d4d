//! Tests for archive export and import between databases.

use taskflow_mcp::db::Database;
use taskflow_mcp::db::export::ExportOptions;
use taskflow_mcp::db::import::{ConflictPolicy, ImportMode, ImportOptions};
use taskflow_mcp::engine::tasks::TaskEngine;
use taskflow_mcp::error::{ErrorCode, error_code};
use taskflow_mcp::export::{self, Archive, CSV_HEADER, ExportFormat};
use taskflow_mcp::types::{NewTask, TaskStatus};

fn setup_db() -> Database {
    Database::open_in_memory().expect("Failed to create in-memory database")
}

struct Seeded {
    project: String,
    parent: String,
    child: String,
    blocked: String,
}

/// A project with a parent/child pair, a tagged task and a dependency.
fn seed(db: &Database) -> Seeded {
    let tasks = TaskEngine::new(db.clone());
    let project = db.create_project("Backend", "API work").unwrap().id;
    let parent = tasks
        .create(NewTask {
            title: "Auth".into(),
            project_id: Some(project.clone()),
            tags: vec!["security".into()],
            ..Default::default()
        })
        .unwrap()
        .id;
    let child = tasks
        .create_subtask(
            &parent,
            NewTask {
                title: "Tokens, refresh".into(),
                tags: vec!["security".into(), "api".into()],
                ..Default::default()
            },
        )
        .unwrap()
        .id;
    let blocked = tasks
        .create(NewTask {
            title: "Docs".into(),
            project_id: Some(project.clone()),
            ..Default::default()
        })
        .unwrap()
        .id;
    tasks.depend(&child, &blocked, None).unwrap();
    tasks.update_status(&child, TaskStatus::InProgress).unwrap();
    Seeded {
        project,
        parent,
        child,
        blocked,
    }
}

fn preserve() -> ImportOptions {
    ImportOptions {
        preserve_ids: true,
        ..Default::default()
    }
}

mod round_trip {
    use super::*;

    #[test]
    fn preserves_ids_links_and_status() {
        let source = setup_db();
        let seeded = seed(&source);
        let outcome = source.export_archive(&ExportOptions::default()).unwrap();
        assert_eq!(outcome.archive.metadata.total_tasks, 3);
        assert_eq!(outcome.archive.metadata.total_projects, 1);

        let json = outcome.archive.to_json(true).unwrap();
        let archive = Archive::from_json(&json).unwrap();

        let target = setup_db();
        let result = target.import_archive(&archive, &preserve()).unwrap();
        assert!(result.success, "errors: {:?}", result.errors);
        assert_eq!(result.imported_projects, 1);
        assert_eq!(result.imported_tasks, 3);
        assert_eq!(result.imported_dependencies, 1);
        assert!(result.conflicts.is_empty());

        let child = target.get_task(&seeded.child).unwrap().expect("child imported");
        assert_eq!(child.parent_id.as_deref(), Some(seeded.parent.as_str()));
        assert_eq!(child.project_id.as_deref(), Some(seeded.project.as_str()));
        assert_eq!(child.status, TaskStatus::InProgress);
        assert_eq!(child.tags, vec!["api", "security"]);

        let blocked = target.get_task(&seeded.blocked).unwrap().unwrap();
        assert_eq!(blocked.uncompleted_dependency_count, 1);
        assert_eq!(target.incomplete_predecessors(&seeded.blocked).unwrap().len(), 1);
    }

    #[test]
    fn fresh_ids_are_mapped() {
        let source = setup_db();
        let seeded = seed(&source);
        let archive = source.export_archive(&ExportOptions::default()).unwrap().archive;

        let target = setup_db();
        let result = target
            .import_archive(
                &archive,
                &ImportOptions {
                    preserve_ids: false,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(result.imported_tasks, 3);

        let new_child = &result.id_map[&seeded.child];
        let new_parent = &result.id_map[&seeded.parent];
        assert_ne!(new_child, &seeded.child);
        let child = target.get_task(new_child).unwrap().unwrap();
        assert_eq!(child.parent_id.as_ref(), Some(new_parent));
        assert!(target.get_task(&seeded.child).unwrap().is_none());
    }

    #[test]
    fn gzip_file_round_trip() {
        let source = setup_db();
        seed(&source);
        let archive = source.export_archive(&ExportOptions::default()).unwrap().archive;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("backup.json.gz");
        let json = export::render(&archive, ExportFormat::Json, false).unwrap();
        export::write_file(&path, &json, export::wants_gzip(&path)).unwrap();

        let loaded = Archive::from_file(&path).unwrap();
        assert_eq!(loaded.tasks.len(), 3);

        let target = setup_db();
        assert!(target.import_archive(&loaded, &preserve()).unwrap().success);
        assert_eq!(target.count_tasks().unwrap(), 3);
    }
}

mod filters {
    use super::*;

    #[test]
    fn completed_and_dependencies_can_be_left_out() {
        let db = setup_db();
        let seeded = seed(&db);
        TaskEngine::new(db.clone())
            .update_status(&seeded.blocked, TaskStatus::Completed)
            .unwrap();

        let archive = db
            .export_archive(&ExportOptions {
                include_completed: false,
                include_dependencies: false,
                ..Default::default()
            })
            .unwrap()
            .archive;
        assert_eq!(archive.tasks.len(), 2);
        assert!(archive.dependencies.is_empty());
        assert!(archive.tasks.iter().all(|t| t.id != seeded.blocked));
    }

    #[test]
    fn project_filter_and_templates() {
        let db = setup_db();
        seed(&db);
        let other = db.create_project("Other", "").unwrap();
        TaskEngine::new(db.clone())
            .create(NewTask {
                title: "elsewhere".into(),
                project_id: Some(other.id.clone()),
                ..Default::default()
            })
            .unwrap();

        let archive = db
            .export_archive(&ExportOptions {
                project_ids: vec![other.id.clone()],
                include_templates: true,
                ..Default::default()
            })
            .unwrap()
            .archive;
        assert_eq!(archive.projects.len(), 1);
        assert_eq!(archive.tasks.len(), 1);
        assert_eq!(archive.tasks[0].title, "elsewhere");
        assert!(archive.tags.is_empty());
    }

    #[test]
    fn inverted_date_range_is_rejected() {
        let db = setup_db();
        let err = db
            .export_archive(&ExportOptions {
                created_from: Some(10),
                created_to: Some(5),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::InvalidFieldValue));
    }

    #[test]
    fn csv_lists_every_task() {
        let db = setup_db();
        let seeded = seed(&db);
        let archive = db.export_archive(&ExportOptions::default()).unwrap().archive;

        let csv = export::render(&archive, ExportFormat::Csv, false).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines.len(), 4);
        let child_row = lines
            .iter()
            .find(|l| l.starts_with(&seeded.child))
            .expect("child row");
        assert!(child_row.contains("\"Tokens, refresh\""));
        assert!(child_row.contains(",in_progress,"));
        assert!(child_row.ends_with(",api|security"));
    }
}

mod conflicts {
    use super::*;

    #[test]
    fn reimport_skips_existing_rows() {
        let db = setup_db();
        seed(&db);
        let archive = db.export_archive(&ExportOptions::default()).unwrap().archive;

        let result = db.import_archive(&archive, &preserve()).unwrap();
        assert_eq!(result.imported_tasks, 0);
        assert_eq!(result.imported_projects, 0);
        assert_eq!(result.conflicts.len(), 4);
        assert!(result.conflicts.iter().all(|c| c.resolution == "skip"));
        assert_eq!(db.count_tasks().unwrap(), 3);
    }

    #[test]
    fn overwrite_replaces_existing_rows() {
        let db = setup_db();
        let seeded = seed(&db);
        let mut archive = db.export_archive(&ExportOptions::default()).unwrap().archive;
        for task in &mut archive.tasks {
            if task.id == seeded.blocked {
                task.title = "Docs (imported)".into();
            }
        }

        let result = db
            .import_archive(
                &archive,
                &ImportOptions {
                    conflict: ConflictPolicy::Overwrite,
                    ..preserve()
                },
            )
            .unwrap();
        assert_eq!(result.imported_tasks, 3);
        assert_eq!(db.get_task(&seeded.blocked).unwrap().unwrap().title, "Docs (imported)");
    }

    #[test]
    fn prompt_and_dry_run_write_nothing() {
        let db = setup_db();
        let seeded = seed(&db);
        let mut archive = db.export_archive(&ExportOptions::default()).unwrap().archive;
        archive.tasks.retain(|t| t.id == seeded.parent);
        archive.task_tags.retain(|l| l.task_id == seeded.parent);
        archive.dependencies.clear();
        archive.tasks[0].title = "changed".into();

        let prompt = db
            .import_archive(
                &archive,
                &ImportOptions {
                    conflict: ConflictPolicy::Prompt,
                    ..preserve()
                },
            )
            .unwrap();
        assert_eq!(prompt.imported_tasks, 0);
        let task_conflict = prompt
            .conflicts
            .iter()
            .find(|c| c.entity == "task")
            .expect("task conflict");
        assert_eq!(task_conflict.resolution, "prompt");
        assert_eq!(task_conflict.incoming["title"], "changed");

        let dry = db
            .import_archive(
                &archive,
                &ImportOptions {
                    dry_run: true,
                    conflict: ConflictPolicy::Overwrite,
                    ..preserve()
                },
            )
            .unwrap();
        assert!(dry.dry_run);
        assert_eq!(dry.conflicts.len(), 2);
        assert_eq!(db.get_task(&seeded.parent).unwrap().unwrap().title, "Auth");
    }

    #[test]
    fn replace_mode_clears_first() {
        let db = setup_db();
        seed(&db);
        let archive = db.export_archive(&ExportOptions::default()).unwrap().archive;
        TaskEngine::new(db.clone())
            .create(NewTask {
                title: "local only".into(),
                ..Default::default()
            })
            .unwrap();

        let result = db
            .import_archive(
                &archive,
                &ImportOptions {
                    mode: ImportMode::Replace,
                    ..preserve()
                },
            )
            .unwrap();
        assert!(result.conflicts.is_empty());
        assert_eq!(db.count_tasks().unwrap(), 3);
    }

    #[test]
    fn project_mapping_redirects_tasks() {
        let source = setup_db();
        let seeded = seed(&source);
        let archive = source.export_archive(&ExportOptions::default()).unwrap().archive;

        let target = setup_db();
        let existing = target.create_project("Existing", "").unwrap();
        let mut options = preserve();
        options
            .project_mapping
            .insert(seeded.project.clone(), existing.id.clone());

        let result = target.import_archive(&archive, &options).unwrap();
        assert_eq!(result.imported_projects, 0);
        let parent = target.get_task(&seeded.parent).unwrap().unwrap();
        assert_eq!(parent.project_id, Some(existing.id));
    }
}

mod validation {
    use super::*;

    #[test]
    fn newer_archive_version_is_refused() {
        let db = setup_db();
        let mut archive = Archive::new(None, None);
        archive.version = "2.0".into();

        let err = db.import_archive(&archive, &preserve()).unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::UnsupportedSchemaVersion));
    }

    #[test]
    fn dangling_references_fail_before_writing() {
        let source = setup_db();
        seed(&source);
        let mut archive = source.export_archive(&ExportOptions::default()).unwrap().archive;
        archive.projects.clear();

        let target = setup_db();
        let err = target.import_archive(&archive, &preserve()).unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::InvalidFieldValue));
        assert_eq!(target.count_tasks().unwrap(), 0);
    }
}
