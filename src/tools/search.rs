//! Advanced search, search history and saved filter profiles.

use super::{
    format_property, get_bool, get_i64, get_string, get_usize, make_tool, output_format, parse_args,
    require_string, respond,
};
use crate::db::now_ms;
use crate::engine::Engine;
use crate::engine::search::{SearchRequest, SearchResponse};
use crate::error::ToolError;
use crate::format::{OutputFormat, format_tasks_markdown};
use crate::types::{SearchFilters, Task};
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::{Value, json};

const DEFAULT_HISTORY_LIMIT: usize = 20;
const DEFAULT_HISTORY_DAYS: i64 = 30;
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

fn filters_property() -> Value {
    json!({
        "type": "object",
        "description": "Empty fields match everything. Dates are YYYY-MM-DD, inclusive.",
        "properties": {
            "status": { "type": "array", "items": { "type": "string", "enum": ["pending", "in_progress", "completed", "cancelled"] } },
            "priority": { "type": "array", "items": { "type": "string", "enum": ["low", "medium", "high"] } },
            "project_ids": { "type": "array", "items": { "type": "string" } },
            "tags": { "type": "array", "items": { "type": "string" }, "description": "All must be present" },
            "due_after": { "type": "string" },
            "due_before": { "type": "string" },
            "created_after": { "type": "string" },
            "created_before": { "type": "string" }
        }
    })
}

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "advanced_search",
            "Search titles, descriptions, tags and project names. Falls back to typo-tolerant matching when few exact hits are found. Without a query the filters alone select tasks.",
            json!({
                "query": { "type": "string" },
                "filters": filters_property(),
                "profile": { "type": "string", "description": "Saved filter profile id or name" },
                "use_fuzzy": { "type": "boolean", "description": "default: true" },
                "fuzzy_threshold": { "type": "number", "description": "0..1, default: 0.6" },
                "include_completed": { "type": "boolean", "description": "default: false" },
                "sort_by": { "type": "string", "enum": ["relevance", "created", "updated", "due_date", "priority"] },
                "sort_order": { "type": "string", "enum": ["asc", "desc"] },
                "limit": { "type": "integer", "description": "default: 50" },
                "format": format_property()
            }),
            vec![],
        ),
        make_tool(
            "search_history",
            "Recent searches, newest first.",
            json!({ "limit": { "type": "integer", "description": "default: 20" } }),
            vec![],
        ),
        make_tool(
            "clean_search_history",
            "Forget searches older than the given number of days.",
            json!({ "days": { "type": "integer", "description": "default: 30" } }),
            vec![],
        ),
        make_tool(
            "save_filter_profile",
            "Save a named search. Names are unique.",
            json!({
                "name": { "type": "string" },
                "description": { "type": "string" },
                "filters": filters_property(),
                "search_query": { "type": "string" },
                "is_default": { "type": "boolean" }
            }),
            vec!["name"],
        ),
        make_tool(
            "list_filter_profiles",
            "Saved filter profiles, the default first, then by use.",
            json!({ "defaults_only": { "type": "boolean" } }),
            vec![],
        ),
        make_tool(
            "get_filter_profile",
            "A saved filter profile by id or name.",
            json!({ "profile": { "type": "string" } }),
            vec!["profile"],
        ),
        make_tool(
            "delete_filter_profile",
            "Delete a saved filter profile by id or name.",
            json!({ "profile": { "type": "string" } }),
            vec!["profile"],
        ),
    ]
}

fn format_search_markdown(response: &SearchResponse) -> String {
    let tasks: Vec<Task> = response.results.iter().map(|hit| hit.task.clone()).collect();
    let mut md = format!("**Search:** {} ({} found", response.query, response.total);
    if response.used_fuzzy {
        md.push_str(", fuzzy");
    }
    md.push_str(")\n\n");
    md.push_str(&format_tasks_markdown(&tasks));
    md
}

fn filters_arg(args: &Value) -> Result<SearchFilters, ToolError> {
    match args.get("filters") {
        None | Some(Value::Null) => Ok(SearchFilters::default()),
        Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| ToolError::invalid_value("filters", &e.to_string())),
    }
}

pub fn advanced_search(engine: &Engine, default: OutputFormat, args: Value) -> Result<Value> {
    let format = output_format(&args, default);
    let mut args = args;
    if let Some(obj) = args.as_object_mut() {
        obj.remove("format");
    }
    let request: SearchRequest = parse_args(args)?;
    if request.fuzzy_threshold.is_some_and(|t| !(0.0..=1.0).contains(&t)) {
        return Err(ToolError::invalid_value("fuzzy_threshold", "must be between 0 and 1").into());
    }
    let response = engine.search.search(request)?;
    respond(format, &response, format_search_markdown)
}

pub fn search_history(engine: &Engine, args: Value) -> Result<Value> {
    let limit = get_usize(&args, "limit").unwrap_or(DEFAULT_HISTORY_LIMIT);
    let entries = engine.db().search_history(limit)?;
    Ok(json!({ "count": entries.len(), "history": entries }))
}

pub fn clean_search_history(engine: &Engine, args: Value) -> Result<Value> {
    let days = get_i64(&args, "days").unwrap_or(DEFAULT_HISTORY_DAYS);
    if days < 0 {
        return Err(ToolError::invalid_value("days", "must not be negative").into());
    }
    let removed = engine.db().clean_search_history(now_ms() - days * DAY_MS)?;
    Ok(json!({ "removed": removed, "older_than_days": days }))
}

pub fn save_filter_profile(engine: &Engine, args: Value) -> Result<Value> {
    let name = require_string(&args, "name")?;
    let profile = engine.search.save_profile(
        &name,
        &get_string(&args, "description").unwrap_or_default(),
        &filters_arg(&args)?,
        &get_string(&args, "search_query").unwrap_or_default(),
        get_bool(&args, "is_default").unwrap_or(false),
    )?;
    Ok(serde_json::to_value(profile)?)
}

pub fn list_filter_profiles(engine: &Engine, args: Value) -> Result<Value> {
    let profiles = engine
        .db()
        .list_filter_profiles(get_bool(&args, "defaults_only").unwrap_or(false))?;
    Ok(json!({ "count": profiles.len(), "profiles": profiles }))
}

pub fn get_filter_profile(engine: &Engine, args: Value) -> Result<Value> {
    let profile = engine.search.profile(&require_string(&args, "profile")?)?;
    Ok(serde_json::to_value(profile)?)
}

pub fn delete_filter_profile(engine: &Engine, args: Value) -> Result<Value> {
    let reference = require_string(&args, "profile")?;
    if !engine.db().delete_filter_profile(reference.trim())? {
        return Err(ToolError::profile_not_found(&reference).into());
    }
    Ok(json!({ "deleted": true, "profile": reference }))
}
