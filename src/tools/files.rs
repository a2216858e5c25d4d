//! File-to-task association tools.

use super::{get_string, make_tool, require_string};
use crate::engine::Engine;
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::{Value, json};

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "watch_file",
            "Associate a file or directory with a task. Changes below it count as activity on the task. Adding the same path twice is a no-op.",
            json!({
                "task_id": { "type": "string" },
                "file_path": { "type": "string" }
            }),
            vec!["task_id", "file_path"],
        ),
        make_tool(
            "list_watches",
            "Watched files, optionally for one task, or the task owning a path.",
            json!({
                "task_id": { "type": "string" },
                "file_path": { "type": "string", "description": "Look up the task watching this path" }
            }),
            vec![],
        ),
        make_tool(
            "unwatch_file",
            "Remove a file association.",
            json!({
                "task_id": { "type": "string" },
                "file_path": { "type": "string" }
            }),
            vec!["task_id", "file_path"],
        ),
    ]
}

pub fn watch_file(engine: &Engine, args: Value) -> Result<Value> {
    let task_id = require_string(&args, "task_id")?;
    let file_path = require_string(&args, "file_path")?;
    let watch = engine.watch_file(&task_id, &file_path)?;
    Ok(serde_json::to_value(watch)?)
}

pub fn list_watches(engine: &Engine, args: Value) -> Result<Value> {
    if let Some(path) = get_string(&args, "file_path").filter(|p| !p.trim().is_empty()) {
        let task_id = engine.db().task_for_file(path.trim())?;
        return Ok(json!({ "file_path": path, "task_id": task_id }));
    }
    let task_id = get_string(&args, "task_id").filter(|t| !t.trim().is_empty());
    let watches = engine.db().list_file_watches(task_id.as_deref())?;
    Ok(json!({ "count": watches.len(), "watches": watches }))
}

pub fn unwatch_file(engine: &Engine, args: Value) -> Result<Value> {
    let task_id = require_string(&args, "task_id")?;
    let file_path = require_string(&args, "file_path")?;
    let removed = engine.unwatch_file(&task_id, &file_path)?;
    Ok(json!({ "removed": removed }))
}
