//! Importing an export archive into the store.
//!
//! Import runs in a single transaction in a fixed order: projects, tags,
//! templates, tasks (parents before children), task-tag links, dependency
//! links and finally AI interactions. Failures of individual rows are
//! collected on the result and do not stop the import.

use super::ai::insert_interaction_internal;
use super::deps::insert_dependency_internal;
use super::projects::{get_project_internal, upsert_project_internal};
use super::tasks::{get_task_internal, insert_task_internal, upsert_task_internal};
use super::templates::save_template_internal;
use super::{Database, new_id};
use crate::error::ToolError;
use crate::export::Archive;
use crate::types::{Task, Template};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// What to do when an incoming entity already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Keep the existing row.
    #[default]
    Skip,
    /// Replace the existing row with the incoming one.
    Overwrite,
    /// Leave both untouched and report the conflict for the caller to decide.
    Prompt,
}

impl ConflictPolicy {
    pub fn parse(s: &str) -> Result<Self, ToolError> {
        match s.trim() {
            "" | "skip" => Ok(ConflictPolicy::Skip),
            "overwrite" => Ok(ConflictPolicy::Overwrite),
            "prompt" => Ok(ConflictPolicy::Prompt),
            other => Err(ToolError::invalid_value(
                "conflict_resolution",
                &format!("Invalid conflict resolution '{}', expected skip, overwrite or prompt", other),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::Skip => "skip",
            ConflictPolicy::Overwrite => "overwrite",
            ConflictPolicy::Prompt => "prompt",
        }
    }
}

/// How existing data is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Keep existing data and add the archive's.
    #[default]
    Merge,
    /// Clear tasks, projects, tags and AI history first.
    Replace,
}

impl ImportMode {
    pub fn parse(s: &str) -> Result<Self, ToolError> {
        match s.trim() {
            "" | "merge" => Ok(ImportMode::Merge),
            "replace" => Ok(ImportMode::Replace),
            other => Err(ToolError::invalid_value(
                "import_mode",
                &format!("Invalid import mode '{}', expected merge or replace", other),
            )),
        }
    }
}

/// Options for [`Database::import_archive`].
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub mode: ImportMode,
    pub conflict: ConflictPolicy,
    /// Keep incoming ids. When false every id is replaced with a fresh one.
    pub preserve_ids: bool,
    /// Report conflicts only, without writing.
    pub dry_run: bool,
    /// Incoming project id -> existing project id.
    pub project_mapping: HashMap<String, String>,
}

/// An incoming entity that collides with an existing one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    #[serde(rename = "type")]
    pub entity: String,
    pub id: String,
    pub existing: Value,
    pub incoming: Value,
    pub resolution: String,
}

/// Outcome of an import.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportResult {
    pub success: bool,
    pub dry_run: bool,
    pub imported_projects: usize,
    pub imported_tags: usize,
    pub imported_templates: usize,
    pub imported_tasks: usize,
    pub imported_task_tags: usize,
    pub imported_dependencies: usize,
    pub imported_interactions: usize,
    pub conflicts: Vec<Conflict>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Old id -> new id, filled when ids were not preserved.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub id_map: HashMap<String, String>,
}

/// Check version and cross-references of an archive.
pub fn validate_archive(archive: &Archive, options: &ImportOptions) -> Result<(), ToolError> {
    archive.check_version()?;

    let project_ids: HashSet<&str> = archive.projects.iter().map(|p| p.id.as_str()).collect();
    let task_ids: HashSet<&str> = archive.tasks.iter().map(|t| t.id.as_str()).collect();
    let tag_ids: HashSet<&str> = archive.tags.iter().map(|t| t.id.as_str()).collect();

    for task in &archive.tasks {
        if let Some(ref project_id) = task.project_id {
            if !project_ids.contains(project_id.as_str())
                && !options.project_mapping.contains_key(project_id)
            {
                return Err(ToolError::invalid_value(
                    "tasks",
                    &format!("task {} references unknown project {}", task.id, project_id),
                ));
            }
        }
    }
    for link in &archive.task_tags {
        if !task_ids.contains(link.task_id.as_str()) {
            return Err(ToolError::invalid_value(
                "task_tags",
                &format!("task-tag link references unknown task {}", link.task_id),
            ));
        }
        if !tag_ids.contains(link.tag_id.as_str()) {
            return Err(ToolError::invalid_value(
                "task_tags",
                &format!("task-tag link references unknown tag {}", link.tag_id),
            ));
        }
    }
    for dep in &archive.dependencies {
        for endpoint in [&dep.source_id, &dep.target_id] {
            if !task_ids.contains(endpoint.as_str()) {
                return Err(ToolError::invalid_value(
                    "dependencies",
                    &format!("dependency references unknown task {}", endpoint),
                ));
            }
        }
    }
    Ok(())
}

/// Order tasks so every parent inside the archive comes before its children.
/// Tasks caught in a parent loop are appended last.
fn parents_first(tasks: &[Task]) -> (Vec<&Task>, Vec<&Task>) {
    let ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    let mut placed: HashSet<&str> = HashSet::new();
    let mut ordered = Vec::with_capacity(tasks.len());
    let mut remaining: Vec<&Task> = tasks.iter().collect();

    loop {
        let before = remaining.len();
        remaining.retain(|&task| {
            let ready = match task.parent_id.as_deref() {
                None => true,
                Some(parent) => !ids.contains(parent) || placed.contains(parent),
            };
            if ready {
                placed.insert(task.id.as_str());
                ordered.push(task);
            }
            !ready
        });
        if remaining.is_empty() || remaining.len() == before {
            break;
        }
    }
    (ordered, remaining)
}

/// Old -> new id translation, identity when ids are preserved.
struct IdMapper {
    preserve: bool,
    map: HashMap<String, String>,
}

impl IdMapper {
    fn new(preserve: bool) -> Self {
        Self {
            preserve,
            map: HashMap::new(),
        }
    }

    fn assign(&mut self, old: &str) -> String {
        if self.preserve {
            return old.to_string();
        }
        self.map
            .entry(old.to_string())
            .or_insert_with(new_id)
            .clone()
    }

    fn get(&self, old: &str) -> Option<String> {
        if self.preserve {
            Some(old.to_string())
        } else {
            self.map.get(old).cloned()
        }
    }
}

fn clear_user_data(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "DELETE FROM task_tags;
         DELETE FROM dependencies;
         DELETE FROM file_watches;
         DELETE FROM tasks;
         DELETE FROM tags;
         DELETE FROM active_project;
         DELETE FROM projects;
         DELETE FROM ai_interactions;
         DELETE FROM ai_context;",
    )?;
    Ok(())
}

fn template_by_alias(conn: &Connection, template: &Template) -> Result<Option<String>> {
    let Some(ref alias) = template.alias else {
        return Ok(None);
    };
    let id = conn
        .query_row(
            "SELECT id FROM templates WHERE alias = ?1 AND language_code = ?2",
            params![alias, template.language_code],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

fn template_json(conn: &Connection, id: &str) -> Result<Option<Value>> {
    let row = conn
        .query_row(
            "SELECT name, alias, language_code FROM templates WHERE id = ?1",
            params![id],
            |row| {
                Ok(serde_json::json!({
                    "id": id,
                    "name": row.get::<_, String>(0)?,
                    "alias": row.get::<_, Option<String>>(1)?,
                    "language_code": row.get::<_, String>(2)?,
                }))
            },
        )
        .optional()?;
    Ok(row)
}

fn conflict(entity: &str, id: &str, existing: Value, incoming: Value, policy: ConflictPolicy) -> Conflict {
    Conflict {
        entity: entity.to_string(),
        id: id.to_string(),
        existing,
        incoming,
        resolution: policy.as_str().to_string(),
    }
}

impl Database {
    /// Conflicts an import with `options` would hit. Writes nothing.
    pub fn detect_import_conflicts(&self, archive: &Archive, options: &ImportOptions) -> Result<Vec<Conflict>> {
        let mut conflicts = Vec::new();
        if !options.preserve_ids {
            return Ok(conflicts);
        }
        self.with_conn(|conn| {
            for project in &archive.projects {
                if options.project_mapping.contains_key(&project.id) {
                    continue;
                }
                if let Some(existing) = get_project_internal(conn, &project.id)? {
                    conflicts.push(conflict(
                        "project",
                        &project.id,
                        serde_json::to_value(&existing)?,
                        serde_json::to_value(project)?,
                        options.conflict,
                    ));
                }
            }
            for template in &archive.templates {
                let existing_id = match template_json(conn, &template.id)? {
                    Some(_) => Some(template.id.clone()),
                    None => template_by_alias(conn, template)?,
                };
                if let Some(id) = existing_id {
                    let existing = template_json(conn, &id)?.unwrap_or(Value::Null);
                    conflicts.push(conflict(
                        "template",
                        &template.id,
                        existing,
                        serde_json::to_value(template)?,
                        options.conflict,
                    ));
                }
            }
            for task in &archive.tasks {
                if let Some(existing) = get_task_internal(conn, &task.id)? {
                    conflicts.push(conflict(
                        "task",
                        &task.id,
                        serde_json::to_value(&existing)?,
                        serde_json::to_value(task)?,
                        options.conflict,
                    ));
                }
            }
            Ok(())
        })?;
        Ok(conflicts)
    }

    /// Import an archive.
    ///
    /// Structural problems (version, dangling references) fail the whole
    /// call before anything is written. With `dry_run` only the detected
    /// conflicts are returned.
    pub fn import_archive(&self, archive: &Archive, options: &ImportOptions) -> Result<ImportResult> {
        validate_archive(archive, options)?;

        let mut result = ImportResult {
            success: true,
            dry_run: options.dry_run,
            ..Default::default()
        };

        if options.dry_run {
            result.conflicts = self.detect_import_conflicts(archive, options)?;
            return Ok(result);
        }

        let mut projects = IdMapper::new(options.preserve_ids);
        let mut tasks = IdMapper::new(options.preserve_ids);
        let mut templates = IdMapper::new(options.preserve_ids);
        let mut tag_ids: HashMap<String, String> = HashMap::new();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if options.mode == ImportMode::Replace {
                clear_user_data(&tx)?;
                info!("cleared existing data before import");
            }

            // Projects
            for project in &archive.projects {
                if let Some(target) = options.project_mapping.get(&project.id) {
                    if get_project_internal(&tx, target)?.is_none() {
                        result
                            .warnings
                            .push(format!("project mapping target {} does not exist", target));
                    }
                    continue;
                }
                let id = projects.assign(&project.id);
                let mut incoming = project.clone();
                incoming.id = id.clone();

                if let Some(existing) = get_project_internal(&tx, &id)? {
                    let c = conflict(
                        "project",
                        &id,
                        serde_json::to_value(&existing)?,
                        serde_json::to_value(&incoming)?,
                        options.conflict,
                    );
                    result.conflicts.push(c);
                    if options.conflict != ConflictPolicy::Overwrite {
                        continue;
                    }
                }
                match upsert_project_internal(&tx, &incoming) {
                    Ok(()) => result.imported_projects += 1,
                    Err(e) => result.errors.push(format!("project {}: {}", project.id, e)),
                }
            }

            // Tags are matched by name; existing tags are reused.
            for tag in &archive.tags {
                match super::tags::resolve_or_create_tags_internal(&tx, std::slice::from_ref(&tag.name)) {
                    Ok(resolved) => {
                        if let Some(stored) = resolved.into_iter().next() {
                            tag_ids.insert(tag.id.clone(), stored.id);
                            result.imported_tags += 1;
                        } else {
                            result.warnings.push(format!("tag {} has an empty name", tag.id));
                        }
                    }
                    Err(e) => result.errors.push(format!("tag {}: {}", tag.name, e)),
                }
            }

            // Templates
            for template in &archive.templates {
                let mut incoming = template.clone();
                incoming.id = templates.assign(&template.id);
                if let Some(ref base) = template.base_template_id {
                    incoming.base_template_id = Some(templates.assign(base));
                }

                let existing_id = match template_json(&tx, &incoming.id)? {
                    Some(_) => Some(incoming.id.clone()),
                    None => template_by_alias(&tx, &incoming)?,
                };
                if let Some(existing_id) = existing_id {
                    let existing = template_json(&tx, &existing_id)?.unwrap_or(Value::Null);
                    result.conflicts.push(conflict(
                        "template",
                        &incoming.id,
                        existing,
                        serde_json::to_value(&incoming)?,
                        options.conflict,
                    ));
                    if options.conflict != ConflictPolicy::Overwrite {
                        continue;
                    }
                    incoming.id = existing_id;
                }
                match save_template_internal(&tx, &incoming) {
                    Ok(()) => result.imported_templates += 1,
                    Err(e) => result.errors.push(format!("template {}: {}", template.id, e)),
                }
            }

            // Tasks, parents first
            let (ordered, looped) = parents_first(&archive.tasks);
            for task in &archive.tasks {
                tasks.assign(&task.id);
            }
            for task in &looped {
                result
                    .warnings
                    .push(format!("task {} is part of a parent loop; imported as a root", task.id));
            }

            let looped_ids: HashSet<&str> = looped.iter().map(|t| t.id.as_str()).collect();
            for task in ordered.into_iter().chain(looped.iter().copied()) {
                let mut incoming = task.clone();
                incoming.id = tasks.get(&task.id).unwrap_or_else(|| task.id.clone());
                incoming.project_id = match task.project_id.as_deref() {
                    Some(p) => match options.project_mapping.get(p) {
                        Some(mapped) => Some(mapped.clone()),
                        None => projects.get(p),
                    },
                    None => None,
                };
                incoming.parent_id = match task.parent_id.as_deref() {
                    Some(_) if looped_ids.contains(task.id.as_str()) => None,
                    Some(p) => {
                        let mapped = tasks.get(p).unwrap_or_else(|| p.to_string());
                        if get_task_internal(&tx, &mapped)?.is_some() {
                            Some(mapped)
                        } else {
                            result
                                .warnings
                                .push(format!("task {} parent {} not found; imported as a root", task.id, p));
                            None
                        }
                    }
                    None => None,
                };

                if let Some(existing) = get_task_internal(&tx, &incoming.id)? {
                    result.conflicts.push(conflict(
                        "task",
                        &incoming.id,
                        serde_json::to_value(&existing)?,
                        serde_json::to_value(&incoming)?,
                        options.conflict,
                    ));
                    if options.conflict != ConflictPolicy::Overwrite {
                        continue;
                    }
                    match upsert_task_internal(&tx, &incoming) {
                        Ok(()) => result.imported_tasks += 1,
                        Err(e) => result.errors.push(format!("task {}: {}", task.id, e)),
                    }
                } else {
                    match insert_task_internal(&tx, &incoming) {
                        Ok(()) => result.imported_tasks += 1,
                        Err(e) => result.errors.push(format!("task {}: {}", task.id, e)),
                    }
                }
            }

            // Task-tag links
            for link in &archive.task_tags {
                let (Some(task_id), Some(tag_id)) = (tasks.get(&link.task_id), tag_ids.get(&link.tag_id)) else {
                    result
                        .warnings
                        .push(format!("skipped tag link {} -> {}", link.task_id, link.tag_id));
                    continue;
                };
                if get_task_internal(&tx, &task_id)?.is_none() {
                    result
                        .warnings
                        .push(format!("skipped tag link for missing task {}", link.task_id));
                    continue;
                }
                match tx.execute(
                    "INSERT OR IGNORE INTO task_tags (task_id, tag_id) VALUES (?1, ?2)",
                    params![task_id, tag_id],
                ) {
                    Ok(n) => result.imported_task_tags += n,
                    Err(e) => result.errors.push(format!("tag link {}: {}", link.task_id, e)),
                }
            }

            // Dependencies
            for dep in &archive.dependencies {
                let (Some(source), Some(target)) = (tasks.get(&dep.source_id), tasks.get(&dep.target_id)) else {
                    continue;
                };
                if get_task_internal(&tx, &source)?.is_none() || get_task_internal(&tx, &target)?.is_none() {
                    result.warnings.push(format!(
                        "skipped dependency {} -> {}: endpoint not imported",
                        dep.source_id, dep.target_id
                    ));
                    continue;
                }
                let mut incoming = dep.clone();
                incoming.id = if options.preserve_ids { dep.id.clone() } else { new_id() };
                incoming.source_id = source;
                incoming.target_id = target;
                match insert_dependency_internal(&tx, &incoming) {
                    Ok(true) => result.imported_dependencies += 1,
                    Ok(false) => debug!(dep = %dep.id, "dependency already present"),
                    Err(e) => result.errors.push(format!("dependency {}: {}", dep.id, e)),
                }
            }

            // AI interactions
            for interaction in &archive.ai_context {
                let mut incoming = interaction.clone();
                incoming.id = if options.preserve_ids { interaction.id.clone() } else { new_id() };
                if let Some(task_id) = tasks.get(&interaction.task_id) {
                    incoming.task_id = task_id;
                }
                match insert_interaction_internal(&tx, &incoming) {
                    Ok(()) => result.imported_interactions += 1,
                    Err(e) => result.errors.push(format!("interaction {}: {}", interaction.id, e)),
                }
            }

            tx.commit()?;
            Ok(())
        })?;

        if !options.preserve_ids {
            result.id_map = tasks.map;
            result.id_map.extend(projects.map);
            result.id_map.extend(templates.map);
        }
        result.success = result.errors.is_empty();
        if !result.errors.is_empty() {
            warn!(errors = result.errors.len(), "import finished with errors");
        }
        info!(
            tasks = result.imported_tasks,
            projects = result.imported_projects,
            conflicts = result.conflicts.len(),
            "import finished"
        );
        Ok(result)
    }
}
