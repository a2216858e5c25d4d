//! Task CRUD, hierarchy and listing tools.

use super::{
    format_property, get_bool, get_string, get_string_array, get_usize, make_tool, output_format,
    require_string, respond,
};
use crate::engine::Engine;
use crate::engine::tasks::ListQuery;
use crate::error::ToolError;
use crate::format::{
    OutputFormat, format_hierarchy_markdown, format_summary_markdown, format_task_markdown,
    format_tasks_markdown,
};
use crate::types::{ListPreset, NewTask, Priority, SortKey, TaskEdit, TaskStatus};
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::{Value, json};

const DEFAULT_SEARCH_LIMIT: usize = 20;

pub fn get_tools() -> Vec<Tool> {
    let task_fields = json!({
        "title": { "type": "string", "description": "Task title (required, non-empty)" },
        "description": { "type": "string" },
        "priority": { "type": "string", "enum": ["low", "medium", "high"] },
        "project_id": { "type": "string", "description": "Project (default: active project)" },
        "due_date": { "type": "string", "description": "YYYY-MM-DD" },
        "tags": { "type": "array", "items": { "type": "string" } }
    });
    let mut subtask_fields = task_fields.clone();
    if let Some(obj) = subtask_fields.as_object_mut() {
        obj.remove("project_id");
        obj.insert("parent_id".into(), json!({ "type": "string", "description": "Parent task ID" }));
    }

    vec![
        make_tool(
            "create_task",
            "Create a pending task. Tags are created on first use.",
            task_fields,
            vec!["title"],
        ),
        make_tool(
            "create_subtask",
            "Create a task under a parent. The subtask inherits the parent's project.",
            subtask_fields,
            vec!["parent_id", "title"],
        ),
        make_tool(
            "get_task",
            "Get a task by ID. Records a view for the AI context and may start a pending task.",
            json!({
                "task_id": { "type": "string" },
                "format": format_property()
            }),
            vec!["task_id"],
        ),
        make_tool(
            "list_tasks",
            "List tasks. Completed tasks are hidden unless include_completed is set or a status is given.",
            json!({
                "status": { "type": "string", "enum": ["pending", "in_progress", "completed", "cancelled"] },
                "priority": { "type": "string", "enum": ["low", "medium", "high"] },
                "sort": { "type": "string", "enum": ["due_asc", "due_desc", "created_desc"] },
                "preset": { "type": "string", "enum": ["urgent", "overdue"], "description": "urgent: due within 7 days; overdue: due before today" },
                "project_id": { "type": "string" },
                "tag": { "type": "string" },
                "include_completed": { "type": "boolean" },
                "limit": { "type": "integer" },
                "format": format_property()
            }),
            vec![],
        ),
        make_tool(
            "update_status",
            "Change a task's status. Starting a task requires its 'precedes' dependencies to be completed; completing requires all subtasks completed. Completing the last open subtask completes the parent.",
            json!({
                "task_id": { "type": "string" },
                "status": { "type": "string", "enum": ["pending", "in_progress", "completed", "cancelled"] }
            }),
            vec!["task_id", "status"],
        ),
        make_tool(
            "edit_task",
            "Edit task fields. Only the fields given are changed; an empty due_date clears it.",
            json!({
                "task_id": { "type": "string" },
                "title": { "type": "string" },
                "description": { "type": "string" },
                "priority": { "type": "string", "enum": ["low", "medium", "high"] },
                "project_id": { "type": "string" },
                "due_date": { "type": "string" }
            }),
            vec!["task_id"],
        ),
        make_tool(
            "delete_task",
            "Delete a task without subtasks. Use bulk_delete with delete_subtasks to remove a subtree.",
            json!({ "task_id": { "type": "string" } }),
            vec!["task_id"],
        ),
        make_tool(
            "change_parent",
            "Move a task under another parent, or to the root when parent_id is omitted.",
            json!({
                "task_id": { "type": "string" },
                "parent_id": { "type": "string" }
            }),
            vec!["task_id"],
        ),
        make_tool(
            "task_hierarchy",
            "Ancestors, descendant counts by status and progress of a task.",
            json!({
                "task_id": { "type": "string" },
                "format": format_property()
            }),
            vec!["task_id"],
        ),
        make_tool(
            "search_tasks",
            "Full-text search over titles and descriptions.",
            json!({
                "query": { "type": "string" },
                "limit": { "type": "integer" },
                "format": format_property()
            }),
            vec!["query"],
        ),
        make_tool(
            "summary",
            "Totals by status and priority, overdue count and the active project.",
            json!({ "format": format_property() }),
            vec![],
        ),
    ]
}

fn parse_priority(args: &Value) -> Result<Option<Priority>, ToolError> {
    match get_string(args, "priority").filter(|p| !p.trim().is_empty()) {
        Some(p) => Priority::parse(&p).map(Some).ok_or_else(|| ToolError::invalid_priority(&p)),
        None => Ok(None),
    }
}

fn parse_status(args: &Value, key: &str) -> Result<Option<TaskStatus>, ToolError> {
    match get_string(args, key).filter(|s| !s.trim().is_empty()) {
        Some(s) => TaskStatus::parse(&s).map(Some).ok_or_else(|| ToolError::invalid_status(&s)),
        None => Ok(None),
    }
}

fn new_task(args: &Value) -> Result<NewTask, ToolError> {
    Ok(NewTask {
        title: require_string(args, "title").map_err(|_| ToolError::empty_title())?,
        description: get_string(args, "description").unwrap_or_default(),
        priority: parse_priority(args)?.unwrap_or_default(),
        project_id: get_string(args, "project_id").filter(|p| !p.trim().is_empty()),
        parent_id: None,
        due_date: get_string(args, "due_date").filter(|d| !d.trim().is_empty()),
        tags: get_string_array(args, "tags").unwrap_or_default(),
    })
}

pub fn create_task(engine: &Engine, args: Value) -> Result<Value> {
    let mut input = new_task(&args)?;
    if input.project_id.is_none() {
        input.project_id = engine.db().active_project()?.map(|p| p.id);
    }
    let task = engine.tasks.create(input)?;
    engine
        .tracker
        .record_interaction(&task.id, "created", json!({ "title": task.title }))?;
    Ok(serde_json::to_value(task)?)
}

pub fn create_subtask(engine: &Engine, args: Value) -> Result<Value> {
    let parent_id = require_string(&args, "parent_id")?;
    let task = engine.tasks.create_subtask(&parent_id, new_task(&args)?)?;
    engine
        .tracker
        .record_interaction(&task.id, "created", json!({ "title": task.title, "parent_id": parent_id }))?;
    Ok(serde_json::to_value(task)?)
}

pub fn get_task(engine: &Engine, default: OutputFormat, args: Value) -> Result<Value> {
    let task_id = require_string(&args, "task_id")?;
    let task = engine.view(&task_id)?;
    respond(output_format(&args, default), &task, format_task_markdown)
}

pub fn list_tasks(engine: &Engine, default: OutputFormat, args: Value) -> Result<Value> {
    let sort = match get_string(&args, "sort") {
        Some(s) => Some(SortKey::parse(&s).ok_or_else(|| {
            ToolError::invalid_value("sort", &format!("unknown sort '{}', expected due_asc, due_desc or created_desc", s))
        })?),
        None => None,
    };
    let preset = match get_string(&args, "preset").filter(|p| !p.trim().is_empty()) {
        Some(p) => Some(ListPreset::parse(&p).ok_or_else(|| {
            ToolError::invalid_value("preset", &format!("unknown preset '{}', expected urgent or overdue", p))
        })?),
        None => None,
    };

    let query = ListQuery {
        status: parse_status(&args, "status")?,
        priority: parse_priority(&args)?,
        sort,
        preset,
        project_id: get_string(&args, "project_id"),
        tag: get_string(&args, "tag"),
        include_completed: get_bool(&args, "include_completed").unwrap_or(false),
        limit: get_usize(&args, "limit"),
    };
    let tasks = engine.tasks.list(&query)?;
    respond(output_format(&args, default), &tasks, |t| format_tasks_markdown(t))
}

pub fn update_status(engine: &Engine, args: Value) -> Result<Value> {
    let task_id = require_string(&args, "task_id")?;
    let status = parse_status(&args, "status")?.ok_or_else(|| ToolError::missing_field("status"))?;
    let change = engine.update_status(&task_id, status)?;
    Ok(serde_json::to_value(change)?)
}

pub fn edit_task(engine: &Engine, args: Value) -> Result<Value> {
    let task_id = require_string(&args, "task_id")?;
    let edit = TaskEdit {
        title: get_string(&args, "title"),
        description: get_string(&args, "description"),
        priority: parse_priority(&args)?,
        project_id: get_string(&args, "project_id"),
        due_date: get_string(&args, "due_date"),
    };
    if edit.is_empty() {
        return Err(ToolError::invalid_value("arguments", "no fields to edit").into());
    }
    let task = engine.tasks.edit(&task_id, edit)?;
    engine.tracker.record_interaction(&task.id, "updated", json!({ "edited": true }))?;
    Ok(serde_json::to_value(task)?)
}

pub fn delete_task(engine: &Engine, args: Value) -> Result<Value> {
    let task_id = require_string(&args, "task_id")?;
    let task = engine.delete_task(&task_id)?;
    Ok(json!({ "deleted": task.id, "title": task.title }))
}

pub fn change_parent(engine: &Engine, args: Value) -> Result<Value> {
    let task_id = require_string(&args, "task_id")?;
    let parent_id = get_string(&args, "parent_id").filter(|p| !p.trim().is_empty());
    let task = engine.tasks.change_parent(&task_id, parent_id.as_deref())?;
    Ok(serde_json::to_value(task)?)
}

pub fn task_hierarchy(engine: &Engine, default: OutputFormat, args: Value) -> Result<Value> {
    let task_id = require_string(&args, "task_id")?;
    let hierarchy = engine.tasks.hierarchy(&task_id)?;
    respond(output_format(&args, default), &hierarchy, format_hierarchy_markdown)
}

pub fn search_tasks(engine: &Engine, default: OutputFormat, args: Value) -> Result<Value> {
    let query = require_string(&args, "query")?;
    let limit = get_usize(&args, "limit").unwrap_or(DEFAULT_SEARCH_LIMIT);
    let tasks = engine.tasks.search(&query, limit)?;
    respond(output_format(&args, default), &tasks, |t| format_tasks_markdown(t))
}

pub fn summary(engine: &Engine, default: OutputFormat, args: Value) -> Result<Value> {
    let summary = engine.tasks.summary()?;
    respond(output_format(&args, default), &summary, format_summary_markdown)
}
