//! AI session tools: active task, views, context summary, loosely typed
//! batch edits and natural-language commands.

use super::{get_usize, make_tool, parse_args, require_string};
use crate::engine::Engine;
use crate::engine::ai_context::AiBatchEntry;
use anyhow::Result;
use rmcp::model::Tool;
use serde::Deserialize;
use serde_json::{Value, json};

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "set_active_task",
            "Mark the task the assistant is working on. A pending task is moved to in_progress.",
            json!({ "task_id": { "type": "string" } }),
            vec!["task_id"],
        ),
        make_tool(
            "get_active_task",
            "The active task, or null.",
            json!({}),
            vec![],
        ),
        make_tool(
            "clear_active_task",
            "Unset the active task.",
            json!({}),
            vec![],
        ),
        make_tool(
            "record_view",
            "Record that a task was looked at. Moves a pending task with satisfied dependencies to in_progress.",
            json!({ "task_id": { "type": "string" } }),
            vec!["task_id"],
        ),
        make_tool(
            "context_summary",
            "Active task, recent tasks, working project, interaction counts, next priorities and blockers.",
            json!({}),
            vec![],
        ),
        make_tool(
            "ai_batch_update",
            "Apply field updates to several tasks. Each entry succeeds or fails on its own; unknown fields are ignored.",
            json!({
                "updates": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "updates": {
                                "type": "object",
                                "description": "title, description, priority, status, due_date"
                            }
                        },
                        "required": ["id"]
                    }
                }
            }),
            vec!["updates"],
        ),
        make_tool(
            "nlp_query",
            "Run a natural-language command such as 'complete task #42', 'show high priority tasks due this week' or 'create task: write release notes'.",
            json!({ "query": { "type": "string" } }),
            vec!["query"],
        ),
        make_tool(
            "recent_interactions",
            "Newest AI interactions first.",
            json!({ "limit": { "type": "integer", "description": "Default from server config" } }),
            vec![],
        ),
    ]
}

#[derive(Deserialize)]
struct AiBatchArgs {
    updates: Vec<AiBatchEntry>,
}

pub fn set_active_task(engine: &Engine, args: Value) -> Result<Value> {
    let task_id = require_string(&args, "task_id")?;
    Ok(serde_json::to_value(engine.set_active(&task_id)?)?)
}

pub fn get_active_task(engine: &Engine, _args: Value) -> Result<Value> {
    Ok(json!({ "task": engine.tracker.get_active()? }))
}

pub fn clear_active_task(engine: &Engine, _args: Value) -> Result<Value> {
    Ok(json!({ "cleared": engine.tracker.clear_active()? }))
}

pub fn record_view(engine: &Engine, args: Value) -> Result<Value> {
    let task_id = require_string(&args, "task_id")?;
    Ok(serde_json::to_value(engine.view(&task_id)?)?)
}

pub fn context_summary(engine: &Engine, _args: Value) -> Result<Value> {
    Ok(serde_json::to_value(engine.tracker.summary()?)?)
}

pub fn ai_batch_update(engine: &Engine, args: Value) -> Result<Value> {
    let input: AiBatchArgs = parse_args(args)?;
    Ok(serde_json::to_value(engine.ai_batch_update(input.updates)?)?)
}

pub fn nlp_query(engine: &Engine, args: Value) -> Result<Value> {
    let query = require_string(&args, "query")?;
    Ok(serde_json::to_value(engine.nlp(&query)?)?)
}

pub fn recent_interactions(engine: &Engine, args: Value) -> Result<Value> {
    let limit = get_usize(&args, "limit").unwrap_or(engine.recent_limit());
    let interactions = engine.tracker.recent_interactions(limit)?;
    Ok(json!({ "count": interactions.len(), "interactions": interactions }))
}
