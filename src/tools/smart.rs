//! Analysis-driven task creation and suggestions.

use super::{get_bool, get_string, get_string_array, get_usize, make_tool, require_string};
use crate::engine::Engine;
use crate::engine::intelligent::SmartTaskRequest;
use crate::engine::suggestions::{SuggestionKind, SuggestionRequest};
use crate::error::ToolError;
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::{Value, json};

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "create_smart_task",
            "Create a task and analyse it: keyword priority, hour estimate from similar completed tasks, a matching template, similar tasks and subtasks split from a numbered or bulleted description.",
            json!({
                "title": { "type": "string" },
                "description": { "type": "string" },
                "project_id": { "type": "string", "description": "Default: active project" },
                "due_date": { "type": "string", "description": "YYYY-MM-DD" },
                "tags": { "type": "array", "items": { "type": "string" } },
                "auto_split": { "type": "boolean", "description": "Create subtasks from list items (default: true)" },
                "estimate_time": { "type": "boolean", "description": "default: true" },
                "smart_priority": { "type": "boolean", "description": "default: true" },
                "suggest_template": { "type": "boolean", "description": "default: true" }
            }),
            vec!["title"],
        ),
        make_tool(
            "suggestions",
            "Next actions, similar completed tasks, template ideas and deadline risks, most important first.",
            json!({
                "active_task_id": { "type": "string", "description": "Default: the AI context's active task" },
                "limit": { "type": "integer", "description": "default: 10" },
                "types": {
                    "type": "array",
                    "items": { "type": "string", "enum": ["next_action", "similar_task", "template", "deadline_risk"] }
                }
            }),
            vec![],
        ),
    ]
}

pub fn create_smart_task(engine: &Engine, args: Value) -> Result<Value> {
    let request = SmartTaskRequest {
        title: require_string(&args, "title").map_err(|_| ToolError::empty_title())?,
        description: get_string(&args, "description").unwrap_or_default(),
        project_id: get_string(&args, "project_id").filter(|p| !p.trim().is_empty()),
        due_date: get_string(&args, "due_date").filter(|d| !d.trim().is_empty()),
        tags: get_string_array(&args, "tags").unwrap_or_default(),
        auto_split: get_bool(&args, "auto_split").unwrap_or(true),
        estimate_time: get_bool(&args, "estimate_time").unwrap_or(true),
        smart_priority: get_bool(&args, "smart_priority").unwrap_or(true),
        suggest_template: get_bool(&args, "suggest_template").unwrap_or(true),
    };
    let response = engine.intelligent.create(request)?;
    engine.tracker.record_interaction(
        &response.main_task.id,
        "created",
        json!({ "smart": true, "subtasks": response.subtasks.len() }),
    )?;
    Ok(serde_json::to_value(response)?)
}

pub fn suggestions(engine: &Engine, args: Value) -> Result<Value> {
    let types = get_string_array(&args, "types")
        .unwrap_or_default()
        .iter()
        .map(|t| {
            SuggestionKind::parse(t).ok_or_else(|| {
                ToolError::invalid_value(
                    "types",
                    &format!("unknown suggestion type '{}', expected next_action, similar_task, template or deadline_risk", t),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let request = SuggestionRequest {
        active_task_id: get_string(&args, "active_task_id").filter(|t| !t.trim().is_empty()),
        limit: get_usize(&args, "limit"),
        types,
    };
    Ok(serde_json::to_value(engine.suggestions.suggest(&request)?)?)
}
