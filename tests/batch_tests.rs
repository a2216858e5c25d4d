//! Tests for batch updates and bulk operations.

use serde_json::json;
use taskflow_mcp::engine::Engine;
use taskflow_mcp::engine::batch::{
    BatchUpdateRequest, BulkDeleteRequest, BulkStatusRequest, BulkTagRequest, TagOperation,
};
use taskflow_mcp::error::{ErrorCode, error_code};
use taskflow_mcp::types::{NewTask, Priority, TaskStatus};

fn setup() -> Engine {
    Engine::in_memory().expect("Failed to create in-memory engine")
}

fn create(engine: &Engine, title: &str, tags: &[&str]) -> String {
    engine
        .tasks
        .create(NewTask {
            title: title.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        })
        .expect("Failed to create task")
        .id
}

fn update(task_id: &str, updates: serde_json::Value) -> BatchUpdateRequest {
    BatchUpdateRequest {
        task_id: task_id.to_string(),
        updates: updates.as_object().cloned().unwrap_or_default(),
        dry_run: false,
    }
}

fn create_child(engine: &Engine, parent: &str, title: &str) -> String {
    engine
        .tasks
        .create_subtask(
            parent,
            NewTask {
                title: title.into(),
                ..Default::default()
            },
        )
        .expect("Failed to create subtask")
        .id
}

/// Store a due date the row parser rejects, so reads touching the row fail.
fn corrupt_due_date(engine: &Engine, task_id: &str) {
    engine
        .db()
        .with_conn(|conn| {
            conn.execute("UPDATE tasks SET due_date = 'someday' WHERE id = ?1", [task_id])?;
            Ok(())
        })
        .unwrap();
}

mod bulk_delete {
    use super::*;

    fn request(ids: &[String], confirmation: &str) -> BulkDeleteRequest {
        BulkDeleteRequest {
            task_ids: ids.to_vec(),
            confirmation: confirmation.into(),
            force: false,
            delete_subtasks: false,
            dry_run: false,
        }
    }

    #[test]
    fn confirmation_must_match_the_count() {
        let engine = setup();
        let ids: Vec<String> = ["a", "b", "c"].iter().map(|t| create(&engine, t, &[])).collect();

        let err = engine.bulk_delete(request(&ids, "DELETE 2 TASKS")).unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::ConfirmationRequired));
        assert_eq!(engine.db().count_tasks().unwrap(), 3);

        let result = engine.bulk_delete(request(&ids, "DELETE 3 TASKS")).unwrap();
        assert_eq!(result.successful.len(), 3);
        assert!(result.failed.is_empty());
        assert_eq!(engine.db().count_tasks().unwrap(), 0);
    }

    #[test]
    fn subtasks_need_explicit_opt_in() {
        let engine = setup();
        let parent = create(&engine, "parent", &[]);
        engine
            .tasks
            .create_subtask(
                &parent,
                NewTask {
                    title: "child".into(),
                    ..Default::default()
                },
            )
            .unwrap();

        let ids = vec![parent.clone()];
        let result = engine.bulk_delete(request(&ids, "DELETE 1 TASKS")).unwrap();
        assert!(result.successful.is_empty());
        assert_eq!(result.failed.len(), 1);
        assert!(result.failed[0].error.contains("subtasks"));

        let mut with_children = request(&ids, "DELETE 1 TASKS");
        with_children.delete_subtasks = true;
        let result = engine.bulk_delete(with_children).unwrap();
        assert_eq!(result.successful, ids);
        assert_eq!(engine.db().count_tasks().unwrap(), 0);
    }

    #[test]
    fn unreadable_subtasks_fail_only_their_parent() {
        let engine = setup();
        let parent = create(&engine, "parent", &[]);
        let child = create_child(&engine, &parent, "child");
        let other = create(&engine, "other", &[]);
        corrupt_due_date(&engine, &child);

        let ids = vec![parent.clone(), other.clone()];
        let mut req = request(&ids, "DELETE 2 TASKS");
        req.delete_subtasks = true;
        let result = engine.bulk_delete(req).unwrap();
        assert_eq!(result.successful, vec![other]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].task_id, parent);
        assert!(engine.tasks.get(&parent).is_ok());
    }

    #[test]
    fn dry_run_keeps_tasks() {
        let engine = setup();
        let ids = vec![create(&engine, "keep", &[])];
        let mut dry = request(&ids, "DELETE 1 TASKS");
        dry.dry_run = true;

        let result = engine.bulk_delete(dry).unwrap();
        assert!(result.successful.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(engine.db().count_tasks().unwrap(), 1);
    }
}

mod bulk_status {
    use super::*;

    fn request(ids: &[String], status: &str) -> BulkStatusRequest {
        BulkStatusRequest {
            task_ids: ids.to_vec(),
            new_status: status.into(),
            force: false,
            check_dependencies: false,
            dry_run: false,
        }
    }

    #[test]
    fn follows_the_transition_matrix() {
        let engine = setup();
        let a = create(&engine, "a", &[]);
        let b = create(&engine, "b", &[]);
        engine.update_status(&a, TaskStatus::InProgress).unwrap();

        let result = engine.bulk_status(request(&[a.clone(), b.clone()], "completed")).unwrap();
        assert_eq!(result.successful, vec![a.clone()]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].task_id, b);
        assert_eq!(result.failed[0].field.as_deref(), Some("status"));
        assert_eq!(result.total_processed, 2);

        let mut forced = request(&[b.clone()], "completed");
        forced.force = true;
        let result = engine.bulk_status(forced).unwrap();
        assert_eq!(result.successful, vec![b.clone()]);
        assert_eq!(engine.tasks.get(&b).unwrap().status, TaskStatus::Completed);
    }

    #[test]
    fn dependency_check_is_opt_in() {
        let engine = setup();
        let a = create(&engine, "a", &[]);
        let b = create(&engine, "b", &[]);
        engine.tasks.depend(&a, &b, None).unwrap();

        let mut checked = request(&[b.clone()], "in_progress");
        checked.check_dependencies = true;
        let result = engine.bulk_status(checked).unwrap();
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].field.as_deref(), Some("dependencies"));

        let result = engine.bulk_status(request(&[b.clone()], "in_progress")).unwrap();
        assert_eq!(result.successful, vec![b]);
    }

    #[test]
    fn unreadable_subtasks_fail_only_their_parent() {
        let engine = setup();
        let parent = create(&engine, "parent", &[]);
        let child = create_child(&engine, &parent, "child");
        let other = create(&engine, "other", &[]);
        engine.tasks.update_status(&parent, TaskStatus::InProgress).unwrap();
        engine.tasks.update_status(&other, TaskStatus::InProgress).unwrap();
        corrupt_due_date(&engine, &child);

        let result = engine
            .bulk_status(request(&[parent.clone(), other.clone()], "completed"))
            .unwrap();
        assert_eq!(result.successful, vec![other.clone()]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].task_id, parent);
        assert_eq!(engine.tasks.get(&other).unwrap().status, TaskStatus::Completed);
    }

    #[test]
    fn unknown_status_rejects_the_request() {
        let engine = setup();
        let a = create(&engine, "a", &[]);
        let err = engine.bulk_status(request(&[a], "finished")).unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::InvalidStatus));
    }

    #[test]
    fn completing_children_completes_parent() {
        let engine = setup();
        let parent = create(&engine, "parent", &[]);
        let child = engine
            .tasks
            .create_subtask(
                &parent,
                NewTask {
                    title: "child".into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .id;
        engine.update_status(&child, TaskStatus::InProgress).unwrap();

        engine.bulk_status(request(&[child], "completed")).unwrap();
        assert_eq!(engine.tasks.get(&parent).unwrap().status, TaskStatus::Completed);
    }
}

mod bulk_tags {
    use super::*;

    fn request(ids: &[String], tags: &[&str], operation: TagOperation) -> BulkTagRequest {
        BulkTagRequest {
            task_ids: ids.to_vec(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            operation,
            dry_run: false,
        }
    }

    #[test]
    fn add_remove_replace() {
        let engine = setup();
        let a = create(&engine, "a", &["backend"]);
        let b = create(&engine, "b", &[]);

        let result = engine
            .batch
            .bulk_tags(request(&[a.clone(), b.clone()], &["urgent"], TagOperation::Add))
            .unwrap();
        assert_eq!(result.successful.len(), 2);
        assert_eq!(engine.tasks.get(&a).unwrap().tags, vec!["backend", "urgent"]);

        let result = engine
            .batch
            .bulk_tags(request(&[b.clone()], &["backend"], TagOperation::Remove))
            .unwrap();
        assert!(result.successful.is_empty());
        assert_eq!(result.warnings[0].message, "no changes needed");

        engine
            .batch
            .bulk_tags(request(&[a.clone()], &["ops"], TagOperation::Replace))
            .unwrap();
        assert_eq!(engine.tasks.get(&a).unwrap().tags, vec!["ops"]);
    }

    #[test]
    fn empty_tag_list_is_rejected_for_add() {
        let engine = setup();
        let a = create(&engine, "a", &[]);
        let err = engine
            .batch
            .bulk_tags(request(&[a], &[" "], TagOperation::Add))
            .unwrap_err();
        assert_eq!(error_code(&err), Some(ErrorCode::MissingRequiredField));
    }
}

mod batch_update {
    use super::*;

    #[test]
    fn bad_fields_become_warnings() {
        let engine = setup();
        let a = create(&engine, "a", &[]);

        let result = engine
            .batch_update(vec![update(
                &a,
                json!({ "priority": "extreme", "description": "updated", "due_date": "soon" }),
            )])
            .unwrap();
        assert_eq!(result.successful, vec![a.clone()]);
        assert_eq!(result.warnings.len(), 2);

        let task = engine.tasks.get(&a).unwrap();
        assert_eq!(task.description, "updated");
        assert!(task.due_date.is_none());
    }

    #[test]
    fn missing_tasks_fail_without_stopping_the_batch() {
        let engine = setup();
        let a = create(&engine, "a", &[]);

        let result = engine
            .batch_update(vec![
                update("missing", json!({ "priority": "high" })),
                update(&a, json!({ "priority": "high", "tags": ["x", "y"] })),
            ])
            .unwrap();
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].task_id, "missing");
        assert_eq!(result.successful, vec![a.clone()]);

        let task = engine.tasks.get(&a).unwrap();
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.tags, vec!["x", "y"]);
        assert!(result.summary.contains("1 successful"));
    }

    #[test]
    fn gated_status_fails_the_entry() {
        let engine = setup();
        let a = create(&engine, "a", &[]);
        let b = create(&engine, "b", &[]);
        engine.tasks.depend(&a, &b, None).unwrap();

        let result = engine
            .batch_update(vec![update(&b, json!({ "status": "in_progress" }))])
            .unwrap();
        assert!(result.successful.is_empty());
        assert!(result.failed[0].error.contains("blocked"));
        assert_eq!(engine.tasks.get(&b).unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn rejected_status_discards_edits_and_tags() {
        let engine = setup();
        let parent = create(&engine, "parent", &["old"]);
        engine
            .tasks
            .create_subtask(
                &parent,
                NewTask {
                    title: "child".into(),
                    ..Default::default()
                },
            )
            .unwrap();
        engine.tasks.update_status(&parent, TaskStatus::InProgress).unwrap();

        let result = engine
            .batch_update(vec![update(
                &parent,
                json!({ "status": "completed", "title": "renamed", "tags": ["new"] }),
            )])
            .unwrap();
        assert!(result.successful.is_empty());
        assert_eq!(result.failed.len(), 1);

        let task = engine.tasks.get(&parent).unwrap();
        assert_eq!(task.title, "parent");
        assert_eq!(task.tags, vec!["old"]);
        assert_eq!(task.status, TaskStatus::InProgress);
    }

    #[test]
    fn dry_run_changes_nothing() {
        let engine = setup();
        let a = create(&engine, "a", &[]);
        let mut request = update(&a, json!({ "title": "renamed" }));
        request.dry_run = true;

        let result = engine.batch_update(vec![request]).unwrap();
        assert!(result.successful.is_empty());
        assert_eq!(result.warnings[0].message, "dry run - would be updated");
        assert_eq!(engine.tasks.get(&a).unwrap().title, "a");
    }
}
