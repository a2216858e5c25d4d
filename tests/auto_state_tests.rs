//! Timer-driven status changes. These run on a tokio runtime so inactivity
//! timers are actually armed.

use std::time::Duration;
use taskflow_mcp::config::Config;
use taskflow_mcp::db::Database;
use taskflow_mcp::engine::Engine;
use taskflow_mcp::engine::ai_context::AiContextTracker;
use taskflow_mcp::engine::auto_state::AutoStateManager;
use taskflow_mcp::engine::batch::BulkDeleteRequest;
use taskflow_mcp::engine::tasks::TaskEngine;
use taskflow_mcp::types::{NewTask, TaskStatus};

fn manager(timeout: Duration) -> (AutoStateManager, TaskEngine) {
    let tasks = TaskEngine::new(Database::open_in_memory().expect("Failed to create in-memory database"));
    let tracker = AiContextTracker::new(tasks.clone(), 50);
    (AutoStateManager::new(tasks.clone(), tracker, timeout, true), tasks)
}

fn create(tasks: &TaskEngine, title: &str) -> String {
    tasks
        .create(NewTask {
            title: title.into(),
            ..Default::default()
        })
        .expect("Failed to create task")
        .id
}

fn last_action(tasks: &TaskEngine) -> String {
    tasks
        .db()
        .last_interactions(1)
        .unwrap()
        .into_iter()
        .next()
        .map(|i| i.action)
        .unwrap_or_default()
}

#[tokio::test]
async fn access_starts_and_inactivity_pauses() {
    let (manager, tasks) = manager(Duration::from_millis(80));
    let id = create(&tasks, "t");

    let task = manager.on_access(&id).unwrap();
    assert_eq!(task.status, TaskStatus::InProgress);
    assert!(manager.has_timer(&id));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(tasks.get(&id).unwrap().status, TaskStatus::Pending);
    assert!(!manager.has_timer(&id));
    assert_eq!(last_action(&tasks), "auto_transition_pause");
}

#[tokio::test]
async fn repeated_access_resets_the_timer() {
    let (manager, tasks) = manager(Duration::from_millis(200));
    let id = create(&tasks, "t");
    manager.on_access(&id).unwrap();

    for _ in 0..3 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        manager.on_access(&id).unwrap();
    }
    // 300ms after the first access, but only 0ms after the last one.
    assert_eq!(tasks.get(&id).unwrap().status, TaskStatus::InProgress);
    assert_eq!(manager.active_timer_count(), 1);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(tasks.get(&id).unwrap().status, TaskStatus::Pending);
}

#[tokio::test]
async fn completion_cancels_the_timer() {
    let (manager, tasks) = manager(Duration::from_millis(80));
    let id = create(&tasks, "t");
    manager.on_access(&id).unwrap();

    tasks.update_status(&id, TaskStatus::Completed).unwrap();
    manager.on_status_change(&id, TaskStatus::Completed).unwrap();
    assert!(!manager.has_timer(&id));

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(tasks.get(&id).unwrap().status, TaskStatus::Completed);
}

#[tokio::test]
async fn manual_pause_clears_the_timer() {
    let (manager, tasks) = manager(Duration::from_secs(60));
    let id = create(&tasks, "t");
    manager.on_access(&id).unwrap();

    assert!(manager.auto_transition_to_pending(&id).unwrap());
    assert!(!manager.has_timer(&id));
    assert_eq!(tasks.get(&id).unwrap().status, TaskStatus::Pending);
    // Already pending: nothing to do.
    assert!(!manager.auto_transition_to_pending(&id).unwrap());
}

#[tokio::test]
async fn deleting_a_running_task_stops_its_timer() {
    let engine = Engine::in_memory().expect("Failed to create in-memory engine");
    let id = engine
        .tasks
        .create(NewTask {
            title: "t".into(),
            ..Default::default()
        })
        .unwrap()
        .id;

    engine.set_active(&id).unwrap();
    assert!(engine.auto_state.has_timer(&id));

    engine.delete_task(&id).unwrap();
    assert!(!engine.auto_state.has_timer(&id));
    engine.shutdown();
}

#[tokio::test]
async fn bulk_deleting_a_parent_stops_subtask_timers() {
    let engine = Engine::in_memory().expect("Failed to create in-memory engine");
    let parent = create(&engine.tasks, "parent");
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
    assert!(engine.auto_state.has_timer(&child));

    let result = engine
        .bulk_delete(BulkDeleteRequest {
            task_ids: vec![parent.clone()],
            confirmation: "DELETE 1 TASKS".into(),
            force: false,
            delete_subtasks: true,
            dry_run: false,
        })
        .unwrap();
    assert_eq!(result.successful, vec![parent]);
    assert!(!engine.auto_state.has_timer(&child));
    assert_eq!(engine.auto_state.active_timer_count(), 0);
    engine.shutdown();
}

#[tokio::test]
async fn status_updates_through_the_engine_arm_timers() {
    let mut config = Config::default();
    config.auto_state.inactivity_timeout_secs = 1;
    let engine = Engine::new(Database::open_in_memory().unwrap(), &config).unwrap();
    let id = engine
        .tasks
        .create(NewTask {
            title: "t".into(),
            ..Default::default()
        })
        .unwrap()
        .id;

    engine.update_status(&id, TaskStatus::InProgress).unwrap();
    assert_eq!(engine.auto_state.active_timer_count(), 1);

    engine.update_status(&id, TaskStatus::Pending).unwrap();
    assert_eq!(engine.auto_state.active_timer_count(), 0);

    engine.update_status(&id, TaskStatus::InProgress).unwrap();
    assert_eq!(engine.auto_state.timeout(), Duration::from_secs(1));
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(engine.tasks.get(&id).unwrap().status, TaskStatus::Pending);
}

#[tokio::test]
async fn disabled_auto_state_never_arms() {
    let mut config = Config::default();
    config.auto_state.enabled = false;
    let engine = Engine::new(Database::open_in_memory().unwrap(), &config).unwrap();
    let id = engine
        .tasks
        .create(NewTask {
            title: "t".into(),
            ..Default::default()
        })
        .unwrap()
        .id;

    assert_eq!(engine.view(&id).unwrap().status, TaskStatus::InProgress);
    assert_eq!(engine.auto_state.active_timer_count(), 0);
}
