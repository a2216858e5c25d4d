//! Export and import tools.

use super::{get_bool, get_string, get_string_array, make_tool};
use crate::db::export::ExportOptions;
use crate::db::import::{ConflictPolicy, ImportMode, ImportOptions};
use crate::engine::Engine;
use crate::error::ToolError;
use crate::export::{self, Archive, ExportFormat};
use anyhow::Result;
use chrono::{Days, NaiveDate};
use rmcp::model::Tool;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "export_data",
            "Export tasks, projects, tags and dependency links as a versioned JSON archive or a CSV task list. Writes to output_path when given (gzip for .gz paths), otherwise returns the content.",
            json!({
                "format": { "type": "string", "enum": ["json", "csv"] },
                "output_path": { "type": "string" },
                "gzip": { "type": "boolean" },
                "project_ids": { "type": "array", "items": { "type": "string" } },
                "created_from": { "type": "string", "description": "YYYY-MM-DD, inclusive" },
                "created_to": { "type": "string", "description": "YYYY-MM-DD, inclusive" },
                "include_completed": { "type": "boolean", "description": "default: true" },
                "include_dependencies": { "type": "boolean", "description": "default: true" },
                "include_templates": { "type": "boolean" },
                "include_ai_context": { "type": "boolean" },
                "exported_by": { "type": "string" },
                "description": { "type": "string" }
            }),
            vec![],
        ),
        make_tool(
            "import_data",
            "Import an archive from file_path (plain or gzip JSON) or inline data. Conflicts are resolved by conflict_resolution; prompt reports them without writing.",
            json!({
                "file_path": { "type": "string" },
                "data": { "type": "object", "description": "Archive object, used when file_path is absent" },
                "import_mode": { "type": "string", "enum": ["merge", "replace"] },
                "conflict_resolution": { "type": "string", "enum": ["skip", "overwrite", "prompt"] },
                "preserve_ids": { "type": "boolean", "description": "default: true" },
                "dry_run": { "type": "boolean" },
                "project_mapping": { "type": "object", "additionalProperties": { "type": "string" } }
            }),
            vec![],
        ),
    ]
}

fn date_arg(args: &Value, key: &str) -> Result<Option<NaiveDate>, ToolError> {
    match get_string(args, key).filter(|d| !d.trim().is_empty()) {
        Some(d) => crate::engine::tasks::parse_due_date(&d)
            .map(Some)
            .map_err(|_| ToolError::invalid_date(&d).with_field(key)),
        None => Ok(None),
    }
}

fn day_start_ms(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_default()
}

pub fn export_options(args: &Value) -> Result<ExportOptions, ToolError> {
    let created_to = date_arg(args, "created_to")?
        .and_then(|d| d.checked_add_days(Days::new(1)))
        .map(|d| day_start_ms(d) - 1);
    let options = ExportOptions {
        project_ids: get_string_array(args, "project_ids").unwrap_or_default(),
        created_from: date_arg(args, "created_from")?.map(day_start_ms),
        created_to,
        include_completed: get_bool(args, "include_completed").unwrap_or(true),
        include_dependencies: get_bool(args, "include_dependencies").unwrap_or(true),
        include_templates: get_bool(args, "include_templates").unwrap_or(false),
        include_ai_context: get_bool(args, "include_ai_context").unwrap_or(false),
        exported_by: get_string(args, "exported_by"),
        description: get_string(args, "description"),
    };
    options.validate()?;
    Ok(options)
}

pub fn export_data(engine: &Engine, pretty: bool, args: Value) -> Result<Value> {
    let format = ExportFormat::parse(&get_string(&args, "format").unwrap_or_default())?;
    let options = export_options(&args)?;
    let outcome = engine.db().export_archive(&options)?;
    let content = export::render(&outcome.archive, format, pretty).map_err(ToolError::from)?;

    let mut response = json!({
        "format": format,
        "total_tasks": outcome.archive.metadata.total_tasks,
        "total_projects": outcome.archive.metadata.total_projects,
        "warnings": outcome.warnings,
    });
    match get_string(&args, "output_path").filter(|p| !p.trim().is_empty()) {
        Some(path) => {
            let path = Path::new(&path);
            let gzip = get_bool(&args, "gzip").unwrap_or(false) || export::wants_gzip(path);
            export::write_file(path, &content, gzip).map_err(ToolError::from)?;
            info!(path = %path.display(), gzip, "export written");
            response["output_path"] = json!(path.display().to_string());
            response["gzip"] = json!(gzip);
        }
        None => response["content"] = json!(content),
    }
    Ok(response)
}

fn import_options(args: &Value) -> Result<ImportOptions, ToolError> {
    let project_mapping: HashMap<String, String> = match args.get("project_mapping") {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
            .collect(),
        Some(Value::Null) | None => HashMap::new(),
        Some(_) => return Err(ToolError::invalid_value("project_mapping", "expected an object")),
    };
    Ok(ImportOptions {
        mode: ImportMode::parse(&get_string(args, "import_mode").unwrap_or_default())?,
        conflict: ConflictPolicy::parse(&get_string(args, "conflict_resolution").unwrap_or_default())?,
        preserve_ids: get_bool(args, "preserve_ids").unwrap_or(true),
        dry_run: get_bool(args, "dry_run").unwrap_or(false),
        project_mapping,
    })
}

pub fn import_data(engine: &Engine, args: Value) -> Result<Value> {
    let options = import_options(&args)?;
    let archive = match get_string(&args, "file_path").filter(|p| !p.trim().is_empty()) {
        Some(path) => Archive::from_file(Path::new(&path)).map_err(ToolError::from)?,
        None => match args.get("data") {
            Some(data) if data.is_object() => serde_json::from_value::<Archive>(data.clone())
                .map_err(|e| ToolError::invalid_value("data", &e.to_string()))?,
            _ => return Err(ToolError::missing_field("file_path").into()),
        },
    };
    let result = engine.db().import_archive(&archive, &options)?;
    info!(
        tasks = result.imported_tasks,
        projects = result.imported_projects,
        conflicts = result.conflicts.len(),
        dry_run = result.dry_run,
        "import finished"
    );
    Ok(serde_json::to_value(result)?)
}
