//! Collecting an export archive from the store.

use super::Database;
use crate::error::ToolError;
use crate::export::{Archive, TaskTagLink};
use crate::types::{Project, Tag, TaskFilter};
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Options controlling what goes into an archive.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Restrict to these projects. Empty means all.
    pub project_ids: Vec<String>,
    /// Creation time lower bound (ms, inclusive).
    pub created_from: Option<i64>,
    /// Creation time upper bound (ms, inclusive).
    pub created_to: Option<i64>,
    pub include_completed: bool,
    pub include_dependencies: bool,
    pub include_templates: bool,
    pub include_ai_context: bool,
    pub exported_by: Option<String>,
    pub description: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            project_ids: Vec::new(),
            created_from: None,
            created_to: None,
            include_completed: true,
            include_dependencies: true,
            include_templates: false,
            include_ai_context: false,
            exported_by: None,
            description: None,
        }
    }
}

impl ExportOptions {
    pub fn validate(&self) -> Result<(), ToolError> {
        if let (Some(from), Some(to)) = (self.created_from, self.created_to) {
            if from > to {
                return Err(ToolError::invalid_value(
                    "date_range",
                    "date range start is after its end",
                ));
            }
        }
        Ok(())
    }
}

/// An archive plus any non-fatal problems hit while building it.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub archive: Archive,
    pub warnings: Vec<String>,
}

impl Database {
    /// Build an archive according to `options`.
    ///
    /// Tags are limited to those used by exported tasks; dependency links are
    /// kept only when both endpoints are exported. Failing to collect the
    /// optional AI interactions is reported as a warning.
    pub fn export_archive(&self, options: &ExportOptions) -> Result<ExportOutcome> {
        options.validate()?;
        let mut archive = Archive::new(options.exported_by.clone(), options.description.clone());
        let mut warnings = Vec::new();

        let all_projects = self.list_projects()?;
        let wanted: HashSet<&str> = options.project_ids.iter().map(String::as_str).collect();
        let projects: Vec<Project> = if wanted.is_empty() {
            all_projects
        } else {
            all_projects
                .into_iter()
                .filter(|p| wanted.contains(p.id.as_str()))
                .collect()
        };

        let mut tasks = self.list_tasks(&TaskFilter {
            created_from: options.created_from,
            created_before: options.created_to.map(|to| to + 1),
            exclude_completed: !options.include_completed,
            ..Default::default()
        })?;
        if !wanted.is_empty() {
            tasks.retain(|t| t.project_id.as_deref().is_some_and(|p| wanted.contains(p)));
        }
        // Oldest first so parents precede children on re-import.
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let task_ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();

        let all_tags: HashMap<String, Tag> = self
            .list_tags()?
            .into_iter()
            .map(|t| (t.name.clone(), t))
            .collect();
        let mut used_tags: Vec<Tag> = Vec::new();
        let mut task_tags = Vec::new();
        for task in &tasks {
            for name in &task.tags {
                let Some(tag) = all_tags.get(name) else {
                    continue;
                };
                if !used_tags.iter().any(|t| t.id == tag.id) {
                    used_tags.push(tag.clone());
                }
                task_tags.push(TaskTagLink {
                    task_id: task.id.clone(),
                    tag_id: tag.id.clone(),
                });
            }
        }
        used_tags.sort_by(|a, b| a.name.cmp(&b.name));

        if options.include_dependencies {
            archive.dependencies = self
                .all_dependencies()?
                .into_iter()
                .filter(|d| {
                    task_ids.contains(d.source_id.as_str()) && task_ids.contains(d.target_id.as_str())
                })
                .collect();
        }

        if options.include_templates {
            archive.templates = self.list_templates(None, true)?;
        }

        if options.include_ai_context {
            let ids: Vec<String> = task_ids.iter().map(|s| s.to_string()).collect();
            match self.interactions_for_tasks(&ids) {
                Ok(interactions) => archive.ai_context = interactions,
                Err(e) => {
                    warn!(error = %e, "failed to export AI interactions");
                    warnings.push(format!("AI context export failed: {}", e));
                }
            }
        }

        archive.metadata.total_tasks = tasks.len();
        archive.metadata.total_projects = projects.len();
        archive.projects = projects;
        archive.tasks = tasks;
        archive.tags = used_tags;
        archive.task_tags = task_tags;

        Ok(ExportOutcome { archive, warnings })
    }
}
