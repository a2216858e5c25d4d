//! Template engine: lookup, typed field validation, placeholder
//! substitution and instantiation into tasks.

use super::seeds::default_templates;
use super::tasks::{TaskEngine, parse_due_date};
use crate::db::{Database, new_id, now_ms};
use crate::error::ToolError;
use crate::types::{FieldType, NewTask, Priority, Task, Template, TemplateField};
use anyhow::Result;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

/// Replace every `{{key}}` with its value in one left-to-right pass.
/// Unknown placeholders stay as they are and substituted values are never
/// scanned again.
pub fn render_pattern(pattern: &str, values: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        let key = &after[..close];
        match values.get(key) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    out
}

fn check_field(field: &TemplateField, value: &str) -> Result<(), ToolError> {
    match field.field_type {
        FieldType::Text => Ok(()),
        FieldType::Select => {
            if field.options.is_empty() || field.options.iter().any(|o| o == value) {
                Ok(())
            } else {
                Err(ToolError::invalid_value(
                    &field.name,
                    &format!(
                        "'{}' is not one of: {}",
                        value,
                        field.options.join(", ")
                    ),
                ))
            }
        }
        FieldType::Date => parse_due_date(value).map(|_| ()).map_err(|_| {
            ToolError::invalid_value(&field.name, &format!("'{}' is not a YYYY-MM-DD date", value))
        }),
        FieldType::Number => value.trim().parse::<f64>().map(|_| ()).map_err(|_| {
            ToolError::invalid_value(&field.name, &format!("'{}' is not a number", value))
        }),
    }
}

/// Merge supplied values with field defaults and validate them.
///
/// Keys that are not declared fields (e.g. `project_id`) pass through.
pub fn resolve_values(
    template: &Template,
    supplied: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, ToolError> {
    let mut values = supplied.clone();
    for field in &template.fields {
        let present = values
            .get(&field.name)
            .is_some_and(|v| !v.trim().is_empty());
        if !present {
            if field.required {
                return Err(ToolError::required_template_field(&field.name));
            }
            if let Some(ref default) = field.default {
                values.insert(field.name.clone(), default.clone());
            }
            continue;
        }
        if let Some(value) = values.get(&field.name) {
            check_field(field, value)?;
        }
    }
    Ok(values)
}

fn split_tags(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Input for a custom template.
#[derive(Debug, Clone, Default)]
pub struct NewTemplate {
    pub name: String,
    pub alias: Option<String>,
    pub category: String,
    pub description: String,
    pub title_pattern: String,
    pub body_pattern: String,
    pub fields: Vec<TemplateField>,
    pub language_code: Option<String>,
}

#[derive(Clone)]
pub struct TemplateEngine {
    tasks: TaskEngine,
    language: String,
}

impl TemplateEngine {
    pub fn new(tasks: TaskEngine, language: impl Into<String>) -> Self {
        Self {
            tasks,
            language: language.into(),
        }
    }

    fn db(&self) -> &Database {
        self.tasks.db()
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Insert the built-in templates that are not present yet.
    /// Returns how many were added.
    pub fn seed_defaults(&self) -> Result<usize> {
        let mut added = 0;
        let now = now_ms();
        for mut template in default_templates() {
            let alias = template.alias.clone().unwrap_or_default();
            if self
                .db()
                .get_template_by_alias(&alias, &template.language_code)?
                .is_some()
                || self.db().get_template(&template.id)?.is_some()
            {
                continue;
            }
            template.created_at = now;
            self.db().save_template(&template)?;
            added += 1;
        }
        if added > 0 {
            info!(added, "seeded default templates");
        }
        Ok(added)
    }

    pub fn list(&self, category: Option<&str>, include_inactive: bool) -> Result<Vec<Template>> {
        self.db().list_templates(category, include_inactive)
    }

    /// Find a template by id or alias, preferring the configured language.
    pub fn get(&self, id_or_alias: &str) -> Result<Template> {
        self.db()
            .find_template(id_or_alias, &self.language)?
            .ok_or_else(|| ToolError::template_not_found(id_or_alias).into())
    }

    /// Add a custom template.
    pub fn create_template(&self, input: NewTemplate) -> Result<Template> {
        if input.name.trim().is_empty() {
            return Err(ToolError::missing_field("name").into());
        }
        if input.title_pattern.trim().is_empty() {
            return Err(ToolError::missing_field("title_pattern").into());
        }
        let mut seen = HashSet::new();
        for field in &input.fields {
            if field.name.trim().is_empty() {
                return Err(ToolError::invalid_value("fields", "field names cannot be empty").into());
            }
            if !seen.insert(field.name.as_str()) {
                return Err(ToolError::invalid_value(
                    "fields",
                    &format!("duplicate field '{}'", field.name),
                )
                .into());
            }
            if field.field_type == FieldType::Select && field.options.is_empty() {
                return Err(ToolError::invalid_value(
                    &field.name,
                    "select fields need at least one option",
                )
                .into());
            }
        }

        let language = input
            .language_code
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| self.language.clone());
        let alias = input.alias.filter(|a| !a.trim().is_empty());
        if let Some(ref alias) = alias {
            if self.db().get_template_by_alias(alias, &language)?.is_some() {
                return Err(ToolError::invalid_value(
                    "alias",
                    &format!("alias '{}' is already used for language {}", alias, language),
                )
                .into());
            }
        }

        let template = Template {
            id: new_id(),
            name: input.name.trim().to_string(),
            alias,
            category: input.category,
            description: input.description,
            title_pattern: input.title_pattern,
            body_pattern: input.body_pattern,
            fields: input.fields,
            active: true,
            language_code: language,
            base_template_id: None,
            created_at: now_ms(),
        };
        self.db().save_template(&template)?;
        info!(template_id = %template.id, name = %template.name, "template created");
        Ok(template)
    }

    /// Soft-disable a template.
    pub fn deactivate(&self, id_or_alias: &str) -> Result<Template> {
        let mut template = self.get(id_or_alias)?;
        self.db().set_template_active(&template.id, false)?;
        template.active = false;
        Ok(template)
    }

    /// Create a task from a template and a value map.
    pub fn instantiate(&self, id_or_alias: &str, supplied: &BTreeMap<String, String>) -> Result<Task> {
        let template = self.get(id_or_alias)?;
        if !template.active {
            return Err(ToolError::template_not_found(id_or_alias)
                .with_details("template is inactive")
                .into());
        }

        let values = resolve_values(&template, supplied)?;
        let title = render_pattern(&template.title_pattern, &values);
        let description = render_pattern(&template.body_pattern, &values);

        let priority = match values.get("priority").map(|p| p.trim()).filter(|p| !p.is_empty()) {
            Some(p) => Priority::parse(p).ok_or_else(|| ToolError::invalid_priority(p))?,
            None => Priority::Medium,
        };
        let due_date = values
            .get("due_date")
            .filter(|d| !d.trim().is_empty())
            .cloned();
        let tags = values.get("tags").map(|t| split_tags(t)).unwrap_or_default();

        let project_id = match values.get("project_id").filter(|p| !p.trim().is_empty()) {
            Some(p) => p.clone(),
            None => self
                .db()
                .active_project()?
                .map(|p| p.id)
                .ok_or_else(ToolError::no_active_project)?,
        };

        debug!(template = %template.id, title = %title, "instantiating template");
        self.tasks.create(NewTask {
            title,
            description,
            priority,
            project_id: Some(project_id),
            parent_id: values.get("parent_id").filter(|p| !p.trim().is_empty()).cloned(),
            due_date,
            tags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn render_replaces_all_occurrences() {
        let rendered = render_pattern(
            "{{a}} and {{a}} but not {{b}}",
            &values(&[("a", "x")]),
        );
        assert_eq!(rendered, "x and x but not {{b}}");
    }

    #[test]
    fn substituted_values_are_not_expanded_again() {
        let rendered = render_pattern("{{a}}-{{b}}", &values(&[("a", "{{b}}"), ("b", "y")]));
        assert_eq!(rendered, "{{b}}-y");

        let rendered = render_pattern("{{b}} then {{a", &values(&[("a", "x"), ("b", "y")]));
        assert_eq!(rendered, "y then {{a");
    }

    #[test]
    fn resolve_applies_defaults_and_checks_types() {
        let bug = default_templates()
            .into_iter()
            .find(|t| t.id == "bug-report-en")
            .unwrap();

        let resolved = resolve_values(&bug, &values(&[("title", "crash"), ("severity", "high")])).unwrap();
        assert_eq!(resolved["module"], "general");
        assert_eq!(resolved["tags"], "bug");

        let err = resolve_values(&bug, &values(&[("title", "crash")])).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::RequiredFieldMissing);

        let err = resolve_values(&bug, &values(&[("title", "crash"), ("severity", "urgent")])).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidFieldValue);
    }

    #[test]
    fn number_and_date_fields() {
        let mut template = default_templates()
            .into_iter()
            .find(|t| t.id == "tech-debt-en")
            .unwrap();
        template.fields.push(TemplateField::date("deadline", false));
        let base = [("title", "t"), ("description", "d"), ("area", "db")];

        let mut ok = values(&base);
        ok.insert("estimated_hours".into(), "4.5".into());
        ok.insert("deadline".into(), "2025-01-31".into());
        assert!(resolve_values(&template, &ok).is_ok());

        let mut bad = values(&base);
        bad.insert("estimated_hours".into(), "four".into());
        assert!(resolve_values(&template, &bad).is_err());

        let mut bad = values(&base);
        bad.insert("deadline".into(), "31.01.2025".into());
        assert!(resolve_values(&template, &bad).is_err());
    }

    #[test]
    fn tags_are_split_and_trimmed() {
        assert_eq!(split_tags("bug, ui ,,backend"), vec!["bug", "ui", "backend"]);
    }
}
