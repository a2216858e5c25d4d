//! Project tools and the active-project setting.

use super::{format_property, get_string, make_tool, output_format, require_string, respond};
use crate::engine::Engine;
use crate::error::ToolError;
use crate::format::{OutputFormat, format_projects_markdown, format_tasks_markdown};
use crate::types::Project;
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::{Value, json};
use tracing::info;

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "create_project",
            "Create a project.",
            json!({
                "name": { "type": "string" },
                "description": { "type": "string" },
                "set_active": { "type": "boolean", "description": "Make it the active project (default: false)" }
            }),
            vec!["name"],
        ),
        make_tool(
            "list_projects",
            "List projects with their task counts. The active project is marked.",
            json!({ "format": format_property() }),
            vec![],
        ),
        make_tool(
            "project_tasks",
            "Tasks of a project, newest first. Defaults to the active project.",
            json!({
                "project_id": { "type": "string" },
                "format": format_property()
            }),
            vec![],
        ),
        make_tool(
            "set_active_project",
            "Set the project new tasks land in when none is given.",
            json!({ "project_id": { "type": "string" } }),
            vec!["project_id"],
        ),
        make_tool(
            "get_active_project",
            "The active project, or null.",
            json!({}),
            vec![],
        ),
        make_tool(
            "clear_active_project",
            "Unset the active project.",
            json!({}),
            vec![],
        ),
        make_tool(
            "delete_project",
            "Delete a project. Its tasks are kept without a project.",
            json!({ "project_id": { "type": "string" } }),
            vec!["project_id"],
        ),
    ]
}

fn require_project(engine: &Engine, project_id: &str) -> Result<Project> {
    engine
        .db()
        .get_project(project_id)?
        .ok_or_else(|| ToolError::project_not_found(project_id).into())
}

pub fn create_project(engine: &Engine, args: Value) -> Result<Value> {
    let name = require_string(&args, "name")?;
    let description = get_string(&args, "description").unwrap_or_default();
    let project = engine.db().create_project(&name, &description)?;
    let active = args.get("set_active").and_then(|v| v.as_bool()).unwrap_or(false);
    if active {
        engine.db().set_active_project(&project.id)?;
    }
    info!(project_id = %project.id, name = %project.name, active, "project created");
    Ok(json!({ "project": project, "active": active }))
}

pub fn list_projects(engine: &Engine, default: OutputFormat, args: Value) -> Result<Value> {
    let projects = engine.db().list_projects()?;
    let active = engine.db().active_project()?.map(|p| p.id);
    match output_format(&args, default) {
        OutputFormat::Markdown => respond(OutputFormat::Markdown, &projects, |p| {
            format_projects_markdown(p, active.as_deref())
        }),
        OutputFormat::Json => Ok(json!({
            "projects": projects,
            "active_project_id": active,
        })),
    }
}

pub fn project_tasks(engine: &Engine, default: OutputFormat, args: Value) -> Result<Value> {
    let project = match get_string(&args, "project_id").filter(|p| !p.trim().is_empty()) {
        Some(id) => require_project(engine, &id)?,
        None => engine.db().active_project()?.ok_or_else(ToolError::no_active_project)?,
    };
    let tasks = engine.db().project_tasks(&project.id)?;
    match output_format(&args, default) {
        OutputFormat::Markdown => respond(OutputFormat::Markdown, &tasks, |t| {
            format!("# {}\n\n{}", project.name, format_tasks_markdown(t))
        }),
        OutputFormat::Json => Ok(json!({ "project": project, "tasks": tasks })),
    }
}

pub fn set_active_project(engine: &Engine, args: Value) -> Result<Value> {
    let project_id = require_string(&args, "project_id")?;
    let project = require_project(engine, &project_id)?;
    engine.db().set_active_project(&project.id)?;
    info!(project_id = %project.id, "active project set");
    Ok(serde_json::to_value(project)?)
}

pub fn get_active_project(engine: &Engine, _args: Value) -> Result<Value> {
    Ok(json!({ "project": engine.db().active_project()? }))
}

pub fn clear_active_project(engine: &Engine, _args: Value) -> Result<Value> {
    let cleared = engine.db().clear_active_project()?;
    Ok(json!({ "cleared": cleared }))
}

pub fn delete_project(engine: &Engine, args: Value) -> Result<Value> {
    let project_id = require_string(&args, "project_id")?;
    let project = require_project(engine, &project_id)?;
    let was_active = engine.db().active_project()?.is_some_and(|p| p.id == project.id);
    if was_active {
        engine.db().clear_active_project()?;
    }
    engine.db().delete_project(&project.id)?;
    info!(project_id = %project.id, "project deleted");
    Ok(json!({ "deleted": project.id, "name": project.name, "was_active": was_active }))
}
