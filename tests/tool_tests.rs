//! End-to-end tests through the MCP tool dispatcher.

use serde_json::{Value, json};
use taskflow_mcp::engine::Engine;
use taskflow_mcp::error::{ErrorCode, error_code};
use taskflow_mcp::format::OutputFormat;
use taskflow_mcp::tools::ToolHandler;

fn handler() -> ToolHandler {
    let engine = Engine::in_memory().expect("Failed to create in-memory engine");
    ToolHandler::new(engine, OutputFormat::Json, false)
}

async fn call(handler: &ToolHandler, name: &str, args: Value) -> Value {
    handler
        .call_tool(name, args)
        .await
        .unwrap_or_else(|e| panic!("{} failed: {:#}", name, e))
}

async fn create_task(handler: &ToolHandler, title: &str) -> String {
    let task = call(handler, "create_task", json!({ "title": title })).await;
    task["id"].as_str().expect("task id").to_string()
}

#[tokio::test]
async fn every_listed_tool_is_dispatched() {
    let handler = handler();
    let tools = handler.get_tools();
    assert!(tools.len() > 40);
    for tool in tools {
        let result = handler.call_tool(&tool.name, json!({})).await;
        if let Err(err) = result {
            assert_ne!(error_code(&err), Some(ErrorCode::UnknownTool), "{} not dispatched", tool.name);
        }
    }
}

#[tokio::test]
async fn unknown_tool_is_reported() {
    let handler = handler();
    let err = handler.call_tool("frobnicate", json!({})).await.unwrap_err();
    assert_eq!(error_code(&err), Some(ErrorCode::UnknownTool));
}

#[tokio::test]
async fn tasks_land_in_the_active_project() {
    let handler = handler();
    let created = call(&handler, "create_project", json!({ "name": "Site", "set_active": true })).await;
    assert_eq!(created["active"], true);
    let project_id = created["project"]["id"].as_str().unwrap().to_string();

    let task = call(
        &handler,
        "create_task",
        json!({ "title": "Landing page", "priority": "high", "tags": ["web", " web "] }),
    )
    .await;
    assert_eq!(task["project_id"], project_id.as_str());
    assert_eq!(task["priority"], "high");
    assert_eq!(task["tags"], json!(["web"]));

    let active = call(&handler, "get_active_project", json!({})).await;
    assert_eq!(active["project"]["id"], project_id.as_str());

    let projects = call(&handler, "list_projects", json!({})).await;
    assert_eq!(projects["active_project_id"], project_id.as_str());
}

#[tokio::test]
async fn list_tasks_honours_the_format_argument() {
    let handler = handler();
    create_task(&handler, "Write docs").await;

    let json = call(&handler, "list_tasks", json!({})).await;
    assert_eq!(json.as_array().map(Vec::len), Some(1));

    let md = call(&handler, "list_tasks", json!({ "format": "markdown" })).await;
    assert_eq!(md["format"], "markdown");
    let content = md["content"].as_str().unwrap();
    assert!(content.starts_with("# Tasks (1)"));
    assert!(content.contains("Write docs"));
}

#[tokio::test]
async fn invalid_arguments_map_to_error_codes() {
    let handler = handler();
    let id = create_task(&handler, "t").await;

    let err = handler
        .call_tool("update_status", json!({ "task_id": id, "status": "done-ish" }))
        .await
        .unwrap_err();
    assert_eq!(error_code(&err), Some(ErrorCode::InvalidStatus));

    let err = handler
        .call_tool("create_task", json!({ "title": "x", "priority": "asap" }))
        .await
        .unwrap_err();
    assert_eq!(error_code(&err), Some(ErrorCode::InvalidPriority));

    let err = handler
        .call_tool("get_task", json!({ "task_id": "no-such-task" }))
        .await
        .unwrap_err();
    assert_eq!(error_code(&err), Some(ErrorCode::TaskNotFound));
}

#[tokio::test]
async fn dependencies_gate_status_updates() {
    let handler = handler();
    let first = create_task(&handler, "first").await;
    let second = create_task(&handler, "second").await;
    call(
        &handler,
        "add_dependency",
        json!({ "source_id": first, "target_id": second }),
    )
    .await;

    let status = call(&handler, "dependency_status", json!({ "task_id": second })).await;
    assert_eq!(status["ready"], false);

    let err = handler
        .call_tool("update_status", json!({ "task_id": second, "status": "in_progress" }))
        .await
        .unwrap_err();
    assert_eq!(error_code(&err), Some(ErrorCode::DependencyBlocked));

    let done = call(&handler, "update_status", json!({ "task_id": first, "status": "completed" })).await;
    assert_eq!(done["task"]["status"], "completed");
    let started = call(&handler, "update_status", json!({ "task_id": second, "status": "in_progress" })).await;
    assert_eq!(started["task"]["status"], "in_progress");
}

#[tokio::test]
async fn nlp_query_runs_the_command() {
    let handler = handler();
    call(&handler, "create_project", json!({ "name": "Ops", "set_active": true })).await;

    let response = call(&handler, "nlp_query", json!({ "query": "create task: Rotate keys urgent" })).await;
    assert_eq!(response["intent"]["action"], "create");
    assert!(response["result"]["title"].as_str().unwrap().starts_with("Rotate keys"));

    let log = call(&handler, "recent_interactions", json!({ "limit": 20 })).await;
    let actions: Vec<&str> = log["interactions"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|i| i["action"].as_str())
        .collect();
    assert!(actions.contains(&"nlp_query"));
}

#[tokio::test]
async fn bulk_delete_requires_the_exact_phrase() {
    let handler = handler();
    let a = create_task(&handler, "a").await;
    let b = create_task(&handler, "b").await;

    let err = handler
        .call_tool("bulk_delete", json!({ "task_ids": [a, b], "confirmation": "yes" }))
        .await
        .unwrap_err();
    assert_eq!(error_code(&err), Some(ErrorCode::ConfirmationRequired));

    let result = call(
        &handler,
        "bulk_delete",
        json!({ "task_ids": [a, b], "confirmation": "DELETE 2 TASKS" }),
    )
    .await;
    assert_eq!(result["successful"].as_array().map(Vec::len), Some(2));

    let summary = call(&handler, "summary", json!({})).await;
    assert_eq!(summary["total_tasks"], 0);
}

#[tokio::test]
async fn template_instantiation_through_tools() {
    let handler = handler();
    call(&handler, "create_project", json!({ "name": "App", "set_active": true })).await;

    let task = call(
        &handler,
        "create_from_template",
        json!({ "template": "bug_report", "values": { "title": "crash on start", "severity": "high" } }),
    )
    .await;
    assert!(task["title"].as_str().unwrap().ends_with("crash on start"));

    let err = handler
        .call_tool("create_from_template", json!({ "template": "bug_report", "values": { "title": "x" } }))
        .await
        .unwrap_err();
    assert_eq!(error_code(&err), Some(ErrorCode::RequiredFieldMissing));
}

#[tokio::test]
async fn export_then_import_into_a_fresh_server() {
    let source = handler();
    call(&source, "create_project", json!({ "name": "Data", "set_active": true })).await;
    create_task(&source, "one").await;
    create_task(&source, "two").await;

    let export = call(&source, "export_data", json!({ "format": "json" })).await;
    assert_eq!(export["total_tasks"], 2);
    let content = export["content"].as_str().unwrap();
    let archive: Value = serde_json::from_str(content).unwrap();

    let target = handler();
    let result = call(&target, "import_data", json!({ "data": archive })).await;
    assert_eq!(result["imported_tasks"], 2);
    assert_eq!(result["imported_projects"], 1);

    let csv = call(&source, "export_data", json!({ "format": "csv" })).await;
    assert_eq!(csv["content"].as_str().unwrap().lines().count(), 3);
}

#[tokio::test]
async fn file_watches_resolve_to_tasks() {
    let handler = handler();
    let id = create_task(&handler, "refactor parser").await;

    call(&handler, "watch_file", json!({ "task_id": id, "file_path": "src/parser.rs" })).await;
    let lookup = call(&handler, "list_watches", json!({ "file_path": "src/parser.rs" })).await;
    assert_eq!(lookup["task_id"], id.as_str());

    let removed = call(&handler, "unwatch_file", json!({ "task_id": id, "file_path": "src/parser.rs" })).await;
    assert_eq!(removed["removed"], true);
    let all = call(&handler, "list_watches", json!({})).await;
    assert_eq!(all["count"], 0);
}

#[tokio::test]
async fn active_task_round_trip() {
    let handler = handler();
    let id = create_task(&handler, "focus").await;

    let task = call(&handler, "set_active_task", json!({ "task_id": id })).await;
    assert_eq!(task["status"], "in_progress");
    let active = call(&handler, "get_active_task", json!({})).await;
    assert_eq!(active["task"]["id"], id.as_str());

    let cleared = call(&handler, "clear_active_task", json!({})).await;
    assert_eq!(cleared["cleared"], true);
    let active = call(&handler, "get_active_task", json!({})).await;
    assert!(active["task"].is_null());
}

#[tokio::test]
async fn advanced_search_with_a_saved_profile() {
    let handler = handler();
    call(&handler, "create_task", json!({ "title": "Payment gateway", "priority": "high" })).await;
    call(&handler, "create_task", json!({ "title": "Payment emails" })).await;

    let found = call(&handler, "advanced_search", json!({ "query": "paymnet gateway" })).await;
    assert_eq!(found["used_fuzzy"], true);
    assert_eq!(found["results"][0]["task"]["title"], "Payment gateway");

    let err = handler
        .call_tool("advanced_search", json!({ "query": "x", "fuzzy_threshold": 1.5 }))
        .await
        .unwrap_err();
    assert_eq!(error_code(&err), Some(ErrorCode::InvalidFieldValue));

    call(
        &handler,
        "save_filter_profile",
        json!({ "name": "hot", "filters": { "priority": ["high"] }, "search_query": "payment" }),
    )
    .await;
    let hot = call(&handler, "advanced_search", json!({ "profile": "hot" })).await;
    assert_eq!(hot["total"], 1);
    assert_eq!(hot["profile"], "hot");

    let profiles = call(&handler, "list_filter_profiles", json!({})).await;
    assert_eq!(profiles["profiles"][0]["use_count"], 1);
    let history = call(&handler, "search_history", json!({ "limit": 5 })).await;
    assert_eq!(history["count"], 2);

    call(&handler, "delete_filter_profile", json!({ "profile": "hot" })).await;
    let err = handler
        .call_tool("get_filter_profile", json!({ "profile": "hot" }))
        .await
        .unwrap_err();
    assert_eq!(error_code(&err), Some(ErrorCode::ProfileNotFound));
}
