//! Batch tools. Each task in a request is handled on its own.

use super::{get_bool, get_string, get_string_array, make_tool, parse_args, require_string};
use crate::engine::Engine;
use crate::engine::batch::{BatchUpdateRequest, BulkDeleteRequest, BulkStatusRequest, BulkTagRequest, TagOperation};
use crate::error::ToolError;
use anyhow::Result;
use rmcp::model::Tool;
use serde::Deserialize;
use serde_json::{Value, json};

pub fn get_tools() -> Vec<Tool> {
    let task_ids = json!({ "type": "array", "items": { "type": "string" } });
    vec![
        make_tool(
            "batch_update",
            "Apply per-task field updates (status, priority, title, description, due_date, tags). Invalid values become warnings instead of failing the batch.",
            json!({
                "updates": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "task_id": { "type": "string" },
                            "updates": { "type": "object" },
                            "dry_run": { "type": "boolean" }
                        },
                        "required": ["task_id", "updates"]
                    }
                }
            }),
            vec!["updates"],
        ),
        make_tool(
            "bulk_status",
            "Set the status of several tasks. Invalid transitions fail unless force is set; check_dependencies applies the dependency gate when starting.",
            json!({
                "task_ids": task_ids,
                "new_status": { "type": "string", "enum": ["pending", "in_progress", "completed", "cancelled"] },
                "force": { "type": "boolean" },
                "check_dependencies": { "type": "boolean" },
                "dry_run": { "type": "boolean" }
            }),
            vec!["task_ids", "new_status"],
        ),
        make_tool(
            "bulk_tags",
            "Add, remove or replace tags on several tasks.",
            json!({
                "task_ids": task_ids,
                "tags": { "type": "array", "items": { "type": "string" } },
                "operation": { "type": "string", "enum": ["add", "remove", "replace"] },
                "dry_run": { "type": "boolean" }
            }),
            vec!["task_ids", "tags", "operation"],
        ),
        make_tool(
            "bulk_delete",
            "Delete several tasks. confirmation must be exactly 'DELETE <n> TASKS' where n is the number of ids.",
            json!({
                "task_ids": task_ids,
                "confirmation": { "type": "string" },
                "force": { "type": "boolean", "description": "Delete tasks that still have dependents" },
                "delete_subtasks": { "type": "boolean", "description": "Delete whole subtrees" },
                "dry_run": { "type": "boolean" }
            }),
            vec!["task_ids", "confirmation"],
        ),
    ]
}

#[derive(Deserialize)]
struct BatchUpdateArgs {
    updates: Vec<BatchUpdateRequest>,
}

fn task_ids(args: &Value) -> Result<Vec<String>, ToolError> {
    get_string_array(args, "task_ids")
        .filter(|ids| !ids.is_empty())
        .ok_or_else(|| ToolError::missing_field("task_ids"))
}

pub fn batch_update(engine: &Engine, args: Value) -> Result<Value> {
    let input: BatchUpdateArgs = parse_args(args)?;
    Ok(serde_json::to_value(engine.batch_update(input.updates)?)?)
}

pub fn bulk_status(engine: &Engine, args: Value) -> Result<Value> {
    let request = BulkStatusRequest {
        task_ids: task_ids(&args)?,
        new_status: require_string(&args, "new_status")?,
        force: get_bool(&args, "force").unwrap_or(false),
        check_dependencies: get_bool(&args, "check_dependencies").unwrap_or(false),
        dry_run: get_bool(&args, "dry_run").unwrap_or(false),
    };
    Ok(serde_json::to_value(engine.bulk_status(request)?)?)
}

pub fn bulk_tags(engine: &Engine, args: Value) -> Result<Value> {
    let request = BulkTagRequest {
        task_ids: task_ids(&args)?,
        tags: get_string_array(&args, "tags").ok_or_else(|| ToolError::missing_field("tags"))?,
        operation: TagOperation::parse(&require_string(&args, "operation")?)?,
        dry_run: get_bool(&args, "dry_run").unwrap_or(false),
    };
    Ok(serde_json::to_value(engine.batch.bulk_tags(request)?)?)
}

pub fn bulk_delete(engine: &Engine, args: Value) -> Result<Value> {
    let request = BulkDeleteRequest {
        task_ids: task_ids(&args)?,
        confirmation: get_string(&args, "confirmation").unwrap_or_default(),
        force: get_bool(&args, "force").unwrap_or(false),
        delete_subtasks: get_bool(&args, "delete_subtasks").unwrap_or(false),
        dry_run: get_bool(&args, "dry_run").unwrap_or(false),
    };
    Ok(serde_json::to_value(engine.bulk_delete(request)?)?)
}
