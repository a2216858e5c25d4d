//! Dependency link tools.

use super::{get_string, make_tool, require_string};
use crate::engine::Engine;
use crate::types::DEP_PRECEDES;
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::{Value, json};

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "add_dependency",
            "Link two tasks. With kind 'precedes' (default) the target cannot start until the source is completed; cycles are rejected.",
            json!({
                "source_id": { "type": "string", "description": "Task that must finish first" },
                "target_id": { "type": "string", "description": "Task that waits" },
                "kind": { "type": "string", "description": "Link kind (default: precedes). Other kinds are informational." }
            }),
            vec!["source_id", "target_id"],
        ),
        make_tool(
            "remove_dependency",
            "Remove the link between two tasks.",
            json!({
                "source_id": { "type": "string" },
                "target_id": { "type": "string" }
            }),
            vec!["source_id", "target_id"],
        ),
        make_tool(
            "dependency_status",
            "Whether a task can start, the titles blocking it and its links.",
            json!({ "task_id": { "type": "string" } }),
            vec!["task_id"],
        ),
    ]
}

pub fn add_dependency(engine: &Engine, args: Value) -> Result<Value> {
    let source_id = require_string(&args, "source_id")?;
    let target_id = require_string(&args, "target_id")?;
    let kind = get_string(&args, "kind");
    let dependency = engine.tasks.depend(&source_id, &target_id, kind.as_deref())?;
    Ok(serde_json::to_value(dependency)?)
}

pub fn remove_dependency(engine: &Engine, args: Value) -> Result<Value> {
    let source_id = require_string(&args, "source_id")?;
    let target_id = require_string(&args, "target_id")?;
    let removed = engine.db().remove_dependency(&source_id, &target_id)?;
    Ok(json!({ "removed": removed }))
}

pub fn dependency_status(engine: &Engine, args: Value) -> Result<Value> {
    let task_id = require_string(&args, "task_id")?;
    let readiness = engine.tasks.dependency_ready(&task_id)?;
    let links = engine.db().dependencies_for_task(&task_id)?;
    let (waits_on, blocks): (Vec<_>, Vec<_>) = links.into_iter().partition(|d| d.target_id == task_id);
    Ok(json!({
        "task_id": task_id,
        "ready": readiness.ready,
        "blocking": readiness.blocking,
        "depends_on": waits_on,
        "dependents": blocks,
        "gating_kind": DEP_PRECEDES,
    }))
}
