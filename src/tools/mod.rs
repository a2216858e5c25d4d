//! MCP tool implementations.

pub mod ai;
pub mod batch;
pub mod data;
pub mod deps;
pub mod files;
pub mod projects;
pub mod search;
pub mod smart;
pub mod tasks;
pub mod templates;

use crate::engine::Engine;
use crate::error::ToolError;
use crate::format::{OutputFormat, markdown_to_json};
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::{Value, json};

/// Tool handler that processes MCP tool calls.
pub struct ToolHandler {
    pub engine: Engine,
    pub default_format: OutputFormat,
    pub export_pretty: bool,
}

impl ToolHandler {
    pub fn new(engine: Engine, default_format: OutputFormat, export_pretty: bool) -> Self {
        Self {
            engine,
            default_format,
            export_pretty,
        }
    }

    /// Get all available tools.
    pub fn get_tools(&self) -> Vec<Tool> {
        let mut tools = Vec::new();
        tools.extend(tasks::get_tools());
        tools.extend(projects::get_tools());
        tools.extend(deps::get_tools());
        tools.extend(templates::get_tools());
        tools.extend(ai::get_tools());
        tools.extend(batch::get_tools());
        tools.extend(smart::get_tools());
        tools.extend(data::get_tools());
        tools.extend(files::get_tools());
        tools.extend(search::get_tools());
        tools
    }

    /// Call a tool by name.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        let e = &self.engine;
        let f = self.default_format;
        match name {
            // Task tools
            "create_task" => tasks::create_task(e, arguments),
            "create_subtask" => tasks::create_subtask(e, arguments),
            "get_task" => tasks::get_task(e, f, arguments),
            "list_tasks" => tasks::list_tasks(e, f, arguments),
            "update_status" => tasks::update_status(e, arguments),
            "edit_task" => tasks::edit_task(e, arguments),
            "delete_task" => tasks::delete_task(e, arguments),
            "change_parent" => tasks::change_parent(e, arguments),
            "task_hierarchy" => tasks::task_hierarchy(e, f, arguments),
            "search_tasks" => tasks::search_tasks(e, f, arguments),
            "summary" => tasks::summary(e, f, arguments),

            // Project tools
            "create_project" => projects::create_project(e, arguments),
            "list_projects" => projects::list_projects(e, f, arguments),
            "project_tasks" => projects::project_tasks(e, f, arguments),
            "set_active_project" => projects::set_active_project(e, arguments),
            "get_active_project" => projects::get_active_project(e, arguments),
            "clear_active_project" => projects::clear_active_project(e, arguments),
            "delete_project" => projects::delete_project(e, arguments),

            // Dependency tools
            "add_dependency" => deps::add_dependency(e, arguments),
            "remove_dependency" => deps::remove_dependency(e, arguments),
            "dependency_status" => deps::dependency_status(e, arguments),

            // Template tools
            "list_templates" => templates::list_templates(e, f, arguments),
            "get_template" => templates::get_template(e, arguments),
            "create_from_template" => templates::create_from_template(e, arguments),
            "create_template" => templates::create_template(e, arguments),
            "deactivate_template" => templates::deactivate_template(e, arguments),

            // AI context tools
            "set_active_task" => ai::set_active_task(e, arguments),
            "get_active_task" => ai::get_active_task(e, arguments),
            "clear_active_task" => ai::clear_active_task(e, arguments),
            "record_view" => ai::record_view(e, arguments),
            "context_summary" => ai::context_summary(e, arguments),
            "ai_batch_update" => ai::ai_batch_update(e, arguments),
            "nlp_query" => ai::nlp_query(e, arguments),
            "recent_interactions" => ai::recent_interactions(e, arguments),

            // Batch tools
            "batch_update" => batch::batch_update(e, arguments),
            "bulk_status" => batch::bulk_status(e, arguments),
            "bulk_tags" => batch::bulk_tags(e, arguments),
            "bulk_delete" => batch::bulk_delete(e, arguments),

            // Smart tools
            "create_smart_task" => smart::create_smart_task(e, arguments),
            "suggestions" => smart::suggestions(e, arguments),

            // Data tools
            "export_data" => data::export_data(e, self.export_pretty, arguments),
            "import_data" => data::import_data(e, arguments),

            // File watch tools
            "watch_file" => files::watch_file(e, arguments),
            "list_watches" => files::list_watches(e, arguments),
            "unwatch_file" => files::unwatch_file(e, arguments),

            // Search tools
            "advanced_search" => search::advanced_search(e, f, arguments),
            "search_history" => search::search_history(e, arguments),
            "clean_search_history" => search::clean_search_history(e, arguments),
            "save_filter_profile" => search::save_filter_profile(e, arguments),
            "list_filter_profiles" => search::list_filter_profiles(e, arguments),
            "get_filter_profile" => search::get_filter_profile(e, arguments),
            "delete_filter_profile" => search::delete_filter_profile(e, arguments),

            _ => Err(ToolError::unknown_tool(name).into()),
        }
    }
}

/// Helper to create a tool definition.
pub fn make_tool(name: &str, description: &str, properties: Value, required: Vec<&str>) -> Tool {
    let input_schema = rmcp::model::JsonObject::from_iter([
        ("type".to_string(), json!("object")),
        ("properties".to_string(), properties),
        ("required".to_string(), json!(required)),
    ]);

    Tool::new(name.to_string(), description.to_string(), input_schema)
}

/// Schema fragment for the `format` argument of listing tools.
pub fn format_property() -> Value {
    json!({
        "type": "string",
        "enum": ["json", "markdown"],
        "description": "Output format (default from server config)"
    })
}

/// The requested output format, or the server default.
pub fn output_format(args: &Value, default: OutputFormat) -> OutputFormat {
    get_string(args, "format")
        .and_then(|s| OutputFormat::parse(&s))
        .unwrap_or(default)
}

/// Render `json` as-is or `markdown` through `render`.
pub fn respond<T: serde::Serialize>(format: OutputFormat, value: &T, render: impl FnOnce(&T) -> String) -> Result<Value> {
    match format {
        OutputFormat::Markdown => Ok(markdown_to_json(render(value))),
        OutputFormat::Json => Ok(serde_json::to_value(value)?),
    }
}

/// Helper to get a string from arguments.
pub fn get_string(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str().map(String::from))
}

/// A non-empty string argument or `MISSING_FIELD`.
pub fn require_string(args: &Value, key: &str) -> Result<String, ToolError> {
    get_string(args, key)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::missing_field(key))
}

/// Helper to get an i64 from arguments.
pub fn get_i64(args: &Value, key: &str) -> Option<i64> {
    args.get(key).and_then(|v| v.as_i64())
}

/// Helper to get a non-negative count from arguments.
pub fn get_usize(args: &Value, key: &str) -> Option<usize> {
    args.get(key).and_then(|v| v.as_u64()).map(|n| n as usize)
}

/// Helper to get a bool from arguments.
pub fn get_bool(args: &Value, key: &str) -> Option<bool> {
    args.get(key).and_then(|v| v.as_bool())
}

/// Helper to get a string array from arguments. A single string is
/// accepted as a one-element array.
pub fn get_string_array(args: &Value, key: &str) -> Option<Vec<String>> {
    match args.get(key)? {
        Value::Array(arr) => Some(arr.iter().filter_map(|v| v.as_str().map(String::from)).collect()),
        Value::String(s) => Some(vec![s.clone()]),
        _ => None,
    }
}

/// Deserialize a typed request from the whole argument object.
pub fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::invalid_value("arguments", &e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_array_accepts_single_string() {
        let args = json!({ "a": ["x", "y"], "b": "z", "c": 3 });
        assert_eq!(get_string_array(&args, "a"), Some(vec!["x".into(), "y".into()]));
        assert_eq!(get_string_array(&args, "b"), Some(vec!["z".into()]));
        assert_eq!(get_string_array(&args, "c"), None);
    }

    #[test]
    fn require_rejects_blank() {
        let args = json!({ "title": "  " });
        assert!(require_string(&args, "title").is_err());
        assert!(require_string(&args, "missing").is_err());
    }

    #[test]
    fn every_listed_tool_is_dispatched() {
        let handler = ToolHandler::new(Engine::in_memory().unwrap(), OutputFormat::Json, true);
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        for tool in handler.get_tools() {
            let result = runtime.block_on(handler.call_tool(&tool.name, json!({})));
            if let Err(e) = result {
                assert_ne!(
                    crate::error::error_code(&e),
                    Some(crate::error::ErrorCode::UnknownTool),
                    "{} is listed but not dispatched",
                    tool.name
                );
            }
        }
    }
}
