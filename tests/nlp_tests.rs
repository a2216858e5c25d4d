//! Tests for natural-language commands executed through the engine.

use taskflow_mcp::config::Config;
use taskflow_mcp::db::{Database, now_ms};
use taskflow_mcp::engine::Engine;
use taskflow_mcp::engine::nlp::{NlpAction, NlpProcessor};
use taskflow_mcp::error::{ErrorCode, ToolError, error_code};
use taskflow_mcp::types::{NewTask, Priority, Task, TaskStatus};

fn setup() -> Engine {
    Engine::in_memory().expect("Failed to create in-memory engine")
}

fn task_with_id(id: &str, title: &str) -> Task {
    let now = now_ms();
    Task {
        id: id.into(),
        title: title.into(),
        description: String::new(),
        status: TaskStatus::Pending,
        priority: Priority::Medium,
        project_id: None,
        parent_id: None,
        created_at: now,
        updated_at: now,
        due_date: None,
        tags: Vec::new(),
        dependency_count: 0,
        uncompleted_dependency_count: 0,
        dependent_count: 0,
    }
}

#[test]
fn complete_by_numeric_reference() {
    let engine = setup();
    engine
        .db()
        .insert_task(&task_with_id("42", "Ship release"))
        .expect("Failed to insert task");

    let dispatch = engine.nlp("complete task #42").unwrap();
    assert_eq!(dispatch.intent.action, NlpAction::Complete);
    assert_eq!(dispatch.intent.parameters.task_references, vec!["id:42"]);
    assert!(dispatch.intent.confidence >= 0.6);
    assert!(dispatch.message.contains("completed"));
    assert_eq!(dispatch.message, "Task completed: Ship release");

    assert_eq!(engine.tasks.get("42").unwrap().status, TaskStatus::Completed);
    let actions: Vec<String> = engine
        .tracker
        .recent_interactions(10)
        .unwrap()
        .into_iter()
        .map(|i| i.action)
        .collect();
    assert!(actions.contains(&"nlp_query".to_string()));
}

#[test]
fn inflected_words_do_not_trigger_create() {
    let nlp = NlpProcessor::new();
    let cases = [
        ("son eklediğim görevi sil", NlpAction::Delete),
        ("complete the task created yesterday", NlpAction::Complete),
        ("delete the created task #5", NlpAction::Delete),
    ];
    for (query, expected) in cases {
        assert_eq!(nlp.parse(query).action, expected, "{}", query);
    }
}

#[test]
fn delete_mentioning_created_removes_the_task() {
    let engine = setup();
    engine
        .db()
        .insert_task(&task_with_id("5", "Old draft"))
        .expect("Failed to insert task");

    let dispatch = engine.nlp("delete the created task #5").unwrap();
    assert_eq!(dispatch.intent.action, NlpAction::Delete);
    assert_eq!(error_code(&engine.tasks.get("5").unwrap_err()), Some(ErrorCode::TaskNotFound));
    assert_eq!(engine.db().count_tasks().unwrap(), 0);
}

#[test]
fn create_uses_active_project_and_filters() {
    let engine = setup();
    let project = engine.db().create_project("Web", "").unwrap();
    engine.db().set_active_project(&project.id).unwrap();

    let dispatch = engine
        .nlp("create task: Fix login form - validate email tag:ui high priority")
        .unwrap();
    assert_eq!(dispatch.intent.action, NlpAction::Create);

    let task: Task = serde_json::from_value(dispatch.result).unwrap();
    assert_eq!(task.project_id, Some(project.id));
    assert_eq!(task.priority, Priority::High);
    assert!(task.tags.contains(&"ui".to_string()));
    assert!(dispatch.message.starts_with("Task created successfully"));
}

#[test]
fn list_counts_matching_tasks() {
    let engine = setup();
    for title in ["one", "two"] {
        engine
            .tasks
            .create(NewTask {
                title: title.into(),
                priority: Priority::High,
                ..Default::default()
            })
            .unwrap();
    }
    engine
        .tasks
        .create(NewTask {
            title: "three".into(),
            priority: Priority::Low,
            ..Default::default()
        })
        .unwrap();

    let dispatch = engine.nlp("show tasks high priority").unwrap();
    assert_eq!(dispatch.intent.action, NlpAction::List);
    assert_eq!(dispatch.result.as_array().map(Vec::len), Some(2));
    assert_eq!(dispatch.message, "Found 2 tasks.");
}

#[test]
fn response_language_follows_the_config() {
    let engine = setup();
    assert_eq!(engine.language(), "en");

    let mut config = Config::default();
    config.server.language = "tr".into();
    let engine = Engine::new(Database::open_in_memory().unwrap(), &config).unwrap();
    engine
        .db()
        .insert_task(&task_with_id("7", "Rapor"))
        .expect("Failed to insert task");
    let dispatch = engine.nlp("görev #7 tamamla").unwrap();
    assert_eq!(dispatch.message, "Görev tamamlandı: Rapor");
}

#[test]
fn vague_text_is_rejected() {
    let engine = setup();
    let err = engine.nlp("hmm").unwrap_err();
    assert_eq!(error_code(&err), Some(ErrorCode::LowConfidence));
}

#[test]
fn failures_carry_a_localized_message() {
    let engine = setup();
    let err = engine.nlp("complete task #999").unwrap_err();
    let tool: ToolError = err.into();
    assert_eq!(tool.code, ErrorCode::TaskNotFound);
    let details = tool.details.unwrap_or_default();
    assert!(details.starts_with("Error occurred during operation"));
}
