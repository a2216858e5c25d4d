//! Tests for the AI session context: active task, views, summaries and the
//! interaction log.

use serde_json::json;
use taskflow_mcp::engine::Engine;
use taskflow_mcp::engine::ai_context::AiBatchEntry;
use taskflow_mcp::types::{NewTask, Priority, TaskStatus};

fn setup() -> Engine {
    Engine::in_memory().expect("Failed to create in-memory engine")
}

fn create(engine: &Engine, title: &str, priority: Priority) -> String {
    engine
        .tasks
        .create(NewTask {
            title: title.into(),
            priority,
            ..Default::default()
        })
        .expect("Failed to create task")
        .id
}

fn actions(engine: &Engine, task_id: &str) -> Vec<String> {
    engine
        .tracker
        .recent_interactions(100)
        .unwrap()
        .into_iter()
        .filter(|i| i.task_id == task_id)
        .map(|i| i.action)
        .collect()
}

mod active_task {
    use super::*;

    #[test]
    fn set_active_promotes_even_when_blocked() {
        let engine = setup();
        let blocker = create(&engine, "blocker", Priority::Medium);
        let work = create(&engine, "work", Priority::Medium);
        engine.tasks.depend(&blocker, &work, None).unwrap();

        let task = engine.set_active(&work).unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(engine.tracker.get_active().unwrap().map(|t| t.id), Some(work.clone()));

        let log = actions(&engine, &work);
        assert!(log.contains(&"set_active".to_string()));
        assert!(log.contains(&"updated".to_string()));
    }

    #[test]
    fn clear_active_reports_whether_one_was_set() {
        let engine = setup();
        let id = create(&engine, "t", Priority::Medium);

        assert!(!engine.tracker.clear_active().unwrap());
        engine.set_active(&id).unwrap();
        assert!(engine.tracker.clear_active().unwrap());
        assert!(engine.tracker.get_active().unwrap().is_none());
    }

    #[test]
    fn deleted_active_task_reads_as_none() {
        let engine = setup();
        let id = create(&engine, "t", Priority::Medium);
        engine.set_active(&id).unwrap();
        engine.delete_task(&id).unwrap();
        assert!(engine.tracker.get_active().unwrap().is_none());
    }
}

mod views {
    use super::*;

    #[test]
    fn view_starts_only_unblocked_tasks() {
        let engine = setup();
        let a = create(&engine, "a", Priority::Medium);
        let b = create(&engine, "b", Priority::Medium);
        engine.tasks.depend(&a, &b, None).unwrap();

        assert_eq!(engine.view(&b).unwrap().status, TaskStatus::Pending);
        assert_eq!(engine.view(&a).unwrap().status, TaskStatus::InProgress);

        let ctx = engine.tracker.context().unwrap();
        assert_eq!(ctx.recent_tasks, vec![a.clone(), b.clone()]);
        assert!(actions(&engine, &b).contains(&"view".to_string()));
    }

    #[test]
    fn repeated_views_keep_one_recent_entry() {
        let engine = setup();
        let a = create(&engine, "a", Priority::Medium);
        let b = create(&engine, "b", Priority::Medium);

        engine.view(&a).unwrap();
        engine.view(&b).unwrap();
        engine.view(&a).unwrap();

        let ctx = engine.tracker.context().unwrap();
        assert_eq!(ctx.recent_tasks, vec![a, b]);
    }
}

mod summary {
    use super::*;

    #[test]
    fn lists_priorities_blockers_and_project() {
        let engine = setup();
        let project = engine.db().create_project("Core", "").unwrap();
        let active = engine
            .tasks
            .create(NewTask {
                title: "active".into(),
                project_id: Some(project.id.clone()),
                ..Default::default()
            })
            .unwrap()
            .id;
        let urgent = create(&engine, "urgent", Priority::High);
        let blocked = create(&engine, "blocked", Priority::Low);
        engine.tasks.depend(&urgent, &blocked, None).unwrap();

        engine.set_active(&active).unwrap();
        let summary = engine.tracker.summary().unwrap();

        assert_eq!(summary.active_task.map(|t| t.id), Some(active));
        assert_eq!(summary.working_project.map(|p| p.id), Some(project.id));
        assert_eq!(summary.next_priorities.len(), 1);
        assert_eq!(summary.next_priorities[0].id, urgent);
        assert_eq!(summary.blockers.len(), 1);
        assert_eq!(summary.blockers[0].id, blocked);
        assert_eq!(summary.session.by_action.get("set_active"), Some(&1));
    }
}

mod batch {
    use super::*;

    fn entry(id: &str, updates: serde_json::Value) -> AiBatchEntry {
        AiBatchEntry {
            id: id.into(),
            updates: updates.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn invalid_entries_fail_individually() {
        let engine = setup();
        let id = create(&engine, "t", Priority::Low);

        let result = engine
            .ai_batch_update(vec![
                entry(&id, json!({ "priority": "high", "description": "now urgent" })),
                entry(&id, json!({ "due_date": "next friday" })),
                entry("missing", json!({ "priority": "low" })),
            ])
            .unwrap();
        assert_eq!(result.total_processed, 3);
        assert_eq!(result.successful, vec![id.clone()]);
        assert_eq!(result.failed.len(), 2);

        let task = engine.tasks.get(&id).unwrap();
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.description, "now urgent");
        assert!(actions(&engine, &id).contains(&"bulk_operation".to_string()));
    }

    #[test]
    fn blocked_entry_leaves_the_task_untouched() {
        let engine = setup();
        let a = create(&engine, "a", Priority::Medium);
        let b = create(&engine, "b", Priority::Medium);
        engine.tasks.depend(&a, &b, None).unwrap();

        let result = engine
            .ai_batch_update(vec![entry(
                &b,
                json!({ "title": "renamed", "priority": "high", "status": "in_progress" }),
            )])
            .unwrap();
        assert!(result.successful.is_empty());
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].task_id, b);

        let task = engine.tasks.get(&b).unwrap();
        assert_eq!(task.title, "b");
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(!actions(&engine, &b).contains(&"bulk_operation".to_string()));
    }

    #[test]
    fn completing_through_the_batch_completes_parents() {
        let engine = setup();
        let parent = create(&engine, "parent", Priority::Medium);
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

        engine
            .ai_batch_update(vec![entry(&child, json!({ "status": "completed" }))])
            .unwrap();
        assert_eq!(engine.tasks.get(&parent).unwrap().status, TaskStatus::Completed);
    }
}

#[test]
fn interactions_are_newest_first() {
    let engine = setup();
    let id = create(&engine, "t", Priority::Medium);
    engine.tracker.record_interaction(&id, "first", json!({})).unwrap();
    engine.tracker.record_interaction(&id, "second", json!({})).unwrap();

    let log = engine.tracker.recent_interactions(2).unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].action, "second");
    assert_eq!(log[1].action, "first");
}
