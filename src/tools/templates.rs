//! Template tools.

use super::{format_property, get_bool, get_string, make_tool, output_format, parse_args, require_string, respond};
use crate::engine::Engine;
use crate::engine::templates::NewTemplate;
use crate::error::ToolError;
use crate::format::{OutputFormat, format_templates_markdown};
use crate::types::TemplateField;
use anyhow::Result;
use rmcp::model::Tool;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "list_templates",
            "List active templates in the configured language.",
            json!({
                "category": { "type": "string" },
                "include_inactive": { "type": "boolean" },
                "format": format_property()
            }),
            vec![],
        ),
        make_tool(
            "get_template",
            "Get a template by ID or alias, including its fields.",
            json!({ "template": { "type": "string", "description": "Template ID or alias (e.g. bug_report)" } }),
            vec!["template"],
        ),
        make_tool(
            "create_from_template",
            "Create a task from a template. Values fill {{field}} placeholders; priority, due_date, tags and project_id also set task fields. Without project_id the active project is used.",
            json!({
                "template": { "type": "string", "description": "Template ID or alias" },
                "values": { "type": "object", "additionalProperties": { "type": ["string", "number", "boolean"] } }
            }),
            vec!["template"],
        ),
        make_tool(
            "create_template",
            "Define a custom template.",
            json!({
                "name": { "type": "string" },
                "alias": { "type": "string" },
                "category": { "type": "string" },
                "description": { "type": "string" },
                "title_pattern": { "type": "string", "description": "e.g. 'Bug: {{title}}'" },
                "body_pattern": { "type": "string" },
                "fields": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "type": { "type": "string", "enum": ["text", "select", "date", "number"] },
                            "required": { "type": "boolean" },
                            "default": { "type": "string" },
                            "options": { "type": "array", "items": { "type": "string" } }
                        },
                        "required": ["name", "type"]
                    }
                },
                "language_code": { "type": "string" }
            }),
            vec!["name", "title_pattern"],
        ),
        make_tool(
            "deactivate_template",
            "Hide a template from listings and block instantiation.",
            json!({ "template": { "type": "string" } }),
            vec!["template"],
        ),
    ]
}

#[derive(Deserialize)]
struct CreateTemplateArgs {
    name: String,
    #[serde(default)]
    alias: Option<String>,
    #[serde(default)]
    category: String,
    #[serde(default)]
    description: String,
    title_pattern: String,
    #[serde(default)]
    body_pattern: String,
    #[serde(default)]
    fields: Vec<TemplateField>,
    #[serde(default)]
    language_code: Option<String>,
}

/// Template values as strings. Numbers and booleans are stringified.
fn template_values(args: &Value) -> Result<BTreeMap<String, String>, ToolError> {
    let mut values = BTreeMap::new();
    let Some(raw) = args.get("values") else {
        return Ok(values);
    };
    let Some(obj) = raw.as_object() else {
        return Err(ToolError::invalid_value("values", "expected an object"));
    };
    for (key, value) in obj {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => continue,
            _ => {
                return Err(ToolError::invalid_value(
                    key,
                    "template values must be strings, numbers or booleans",
                ));
            }
        };
        values.insert(key.clone(), text);
    }
    Ok(values)
}

pub fn list_templates(engine: &Engine, default: OutputFormat, args: Value) -> Result<Value> {
    let category = get_string(&args, "category");
    let include_inactive = get_bool(&args, "include_inactive").unwrap_or(false);
    let templates = engine.templates.list(category.as_deref(), include_inactive)?;
    respond(output_format(&args, default), &templates, |t| format_templates_markdown(t))
}

pub fn get_template(engine: &Engine, args: Value) -> Result<Value> {
    let template = require_string(&args, "template")?;
    Ok(serde_json::to_value(engine.templates.get(&template)?)?)
}

pub fn create_from_template(engine: &Engine, args: Value) -> Result<Value> {
    let template = require_string(&args, "template")?;
    let values = template_values(&args)?;
    let task = engine.instantiate_template(&template, &values)?;
    Ok(serde_json::to_value(task)?)
}

pub fn create_template(engine: &Engine, args: Value) -> Result<Value> {
    let input: CreateTemplateArgs = parse_args(args)?;
    let template = engine.templates.create_template(NewTemplate {
        name: input.name,
        alias: input.alias,
        category: input.category,
        description: input.description,
        title_pattern: input.title_pattern,
        body_pattern: input.body_pattern,
        fields: input.fields,
        language_code: input.language_code,
    })?;
    Ok(serde_json::to_value(template)?)
}

pub fn deactivate_template(engine: &Engine, args: Value) -> Result<Value> {
    let template = require_string(&args, "template")?;
    Ok(serde_json::to_value(engine.templates.deactivate(&template)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_stringified() {
        let args = json!({ "values": { "title": "crash", "points": 3, "urgent": true, "skip": null } });
        let values = template_values(&args).unwrap();
        assert_eq!(values["title"], "crash");
        assert_eq!(values["points"], "3");
        assert_eq!(values["urgent"], "true");
        assert!(!values.contains_key("skip"));
    }

    #[test]
    fn nested_values_are_rejected() {
        let args = json!({ "values": { "title": ["a"] } });
        assert!(template_values(&args).is_err());
    }
}
