//! Multi-task operations. Each task is handled on its own; one failing task
//! never aborts the rest of the batch.

use super::ai_context::AiContextTracker;
use super::tasks::{TaskEngine, parse_due_date};
use crate::db::tags::normalize_tag_names;
use crate::error::ToolError;
use crate::types::{Priority, Task, TaskEdit, TaskStatus};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
    pub task_id: String,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchWarning {
    pub task_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Result shared by every batch entry point.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub successful: Vec<String>,
    pub failed: Vec<BatchFailure>,
    pub warnings: Vec<BatchWarning>,
    pub total_processed: usize,
    /// Wall time in milliseconds.
    #[serde(rename = "execution_time")]
    pub execution_time_ms: u64,
    pub summary: String,
}

impl BatchResult {
    fn fail(&mut self, task_id: &str, error: impl Into<String>, field: Option<&str>) {
        self.failed.push(BatchFailure {
            task_id: task_id.to_string(),
            error: error.into(),
            field: field.map(String::from),
        });
    }

    fn warn(&mut self, task_id: &str, message: impl Into<String>, field: Option<&str>) {
        self.warnings.push(BatchWarning {
            task_id: task_id.to_string(),
            message: message.into(),
            field: field.map(String::from),
        });
    }

    fn finish(mut self, total: usize, started: Instant) -> Self {
        self.total_processed = total;
        self.execution_time_ms = started.elapsed().as_millis() as u64;
        self.summary = format!(
            "Processed {} tasks: {} successful, {} failed, {} warnings",
            total,
            self.successful.len(),
            self.failed.len(),
            self.warnings.len()
        );
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchUpdateRequest {
    pub task_id: String,
    #[serde(default)]
    pub updates: Map<String, Value>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkStatusRequest {
    pub task_ids: Vec<String>,
    pub new_status: String,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub check_dependencies: bool,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagOperation {
    Add,
    Remove,
    Replace,
}

impl TagOperation {
    pub fn parse(s: &str) -> Result<Self, ToolError> {
        match s.trim().to_lowercase().as_str() {
            "add" => Ok(TagOperation::Add),
            "remove" => Ok(TagOperation::Remove),
            "replace" => Ok(TagOperation::Replace),
            other => Err(ToolError::invalid_value(
                "operation",
                &format!("unknown tag operation '{}', expected add, remove or replace", other),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TagOperation::Add => "add",
            TagOperation::Remove => "remove",
            TagOperation::Replace => "replace",
        }
    }

    /// The tag set after applying this operation to `current`.
    pub fn apply(&self, current: &BTreeSet<String>, tags: &BTreeSet<String>) -> BTreeSet<String> {
        match self {
            TagOperation::Add => current.union(tags).cloned().collect(),
            TagOperation::Remove => current.difference(tags).cloned().collect(),
            TagOperation::Replace => tags.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkTagRequest {
    pub task_ids: Vec<String>,
    pub tags: Vec<String>,
    pub operation: TagOperation,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkDeleteRequest {
    pub task_ids: Vec<String>,
    #[serde(default)]
    pub confirmation: String,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub delete_subtasks: bool,
    #[serde(default)]
    pub dry_run: bool,
}

/// The confirmation phrase a bulk delete of `count` tasks requires.
pub fn delete_confirmation(count: usize) -> String {
    format!("DELETE {} TASKS", count)
}

/// Field changes extracted from a loosely typed update map.
#[derive(Debug, Default)]
struct PlannedUpdate {
    status: Option<TaskStatus>,
    edit: TaskEdit,
    tags: Option<Vec<String>>,
    warnings: Vec<(String, &'static str)>,
}

impl PlannedUpdate {
    fn has_changes(&self) -> bool {
        self.status.is_some() || !self.edit.is_empty() || self.tags.is_some()
    }
}

fn tag_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect(),
        ),
        Value::String(s) => Some(s.split(',').map(|t| t.trim().to_string()).collect()),
        _ => None,
    }
}

fn plan_update(task: &Task, updates: &Map<String, Value>) -> PlannedUpdate {
    let mut plan = PlannedUpdate::default();
    let text = |key: &str| updates.get(key).and_then(Value::as_str);

    if let Some(status) = text("status") {
        match TaskStatus::parse(status) {
            Some(s) if s == task.status => {}
            Some(s) if task.status.can_transition_to(s) => plan.status = Some(s),
            Some(s) => plan
                .warnings
                .push((format!("invalid status transition: {} -> {}", task.status, s), "status")),
            None => plan.warnings.push((format!("invalid status: {}", status), "status")),
        }
    }
    if let Some(priority) = text("priority") {
        match Priority::parse(priority) {
            Some(p) => plan.edit.priority = Some(p),
            None => plan.warnings.push((format!("invalid priority: {}", priority), "priority")),
        }
    }
    if let Some(title) = text("title") {
        if title.trim().is_empty() {
            plan.warnings.push(("empty title not allowed".to_string(), "title"));
        } else {
            plan.edit.title = Some(title.trim().to_string());
        }
    }
    if let Some(description) = text("description") {
        plan.edit.description = Some(description.to_string());
    }
    if let Some(due) = text("due_date") {
        if due.trim().is_empty() || parse_due_date(due).is_ok() {
            plan.edit.due_date = Some(due.to_string());
        } else {
            plan.warnings.push((format!("invalid date format: {}", due), "due_date"));
        }
    }
    if let Some(tags) = updates.get("tags").and_then(tag_list) {
        plan.tags = Some(normalize_tag_names(&tags));
    }
    plan
}

#[derive(Clone)]
pub struct BatchProcessor {
    tasks: TaskEngine,
    tracker: AiContextTracker,
}

impl BatchProcessor {
    pub fn new(tasks: TaskEngine, tracker: AiContextTracker) -> Self {
        Self { tasks, tracker }
    }

    fn record(&self, task_id: &str, action: &str, context: Value) {
        if let Err(e) = self.tracker.record_interaction(task_id, action, context) {
            warn!(task_id, action, error = %e, "failed to record batch interaction");
        }
    }

    /// Apply per-task field updates. Invalid values become warnings; a
    /// request with nothing valid left to apply is not counted as a success.
    pub fn process_batch_update(&self, requests: Vec<BatchUpdateRequest>) -> Result<BatchResult> {
        let started = Instant::now();
        let total = requests.len();
        let mut result = BatchResult::default();

        for request in requests {
            let id = request.task_id.as_str();
            let task = match self.tasks.get(id) {
                Ok(task) => task,
                Err(e) => {
                    result.fail(id, ToolError::from(e).message, None);
                    continue;
                }
            };

            let plan = plan_update(&task, &request.updates);
            for (message, field) in &plan.warnings {
                result.warn(id, message.clone(), Some(field));
            }

            if request.dry_run {
                if plan.has_changes() {
                    result.warn(id, "dry run - would be updated", None);
                }
                continue;
            }
            if !plan.has_changes() {
                if plan.warnings.is_empty() {
                    result.warn(id, "no changes needed", None);
                }
                continue;
            }

            if let Err(e) = self.apply(&task, plan) {
                let err = ToolError::from(e);
                let field = err.field.clone();
                result.fail(id, err.message, field.as_deref());
                continue;
            }
            self.record(id, "batch_update", Value::Object(request.updates));
            result.successful.push(request.task_id);
        }

        let result = result.finish(total, started);
        info!(summary = %result.summary, "batch update finished");
        Ok(result)
    }

    fn apply(&self, task: &Task, plan: PlannedUpdate) -> Result<()> {
        self.tasks.apply(&task.id, plan.edit, plan.status, plan.tags.as_deref())?;
        Ok(())
    }

    /// Move many tasks to one status along the allowed transition matrix.
    pub fn bulk_status(&self, request: BulkStatusRequest) -> Result<BatchResult> {
        let started = Instant::now();
        let new_status =
            TaskStatus::parse(&request.new_status).ok_or_else(|| ToolError::invalid_status(&request.new_status))?;
        let mut result = BatchResult::default();

        for id in &request.task_ids {
            let task = match self.tasks.get(id) {
                Ok(task) => task,
                Err(e) => {
                    result.fail(id, ToolError::from(e).message, None);
                    continue;
                }
            };

            if task.status == new_status {
                result.warn(id, format!("already in status {}", new_status), Some("status"));
                continue;
            }
            let allowed = task.status.can_transition_to(new_status);
            if request.dry_run {
                if allowed || request.force {
                    result.warn(id, "dry run - would be updated", None);
                } else {
                    result.warn(id, format!("invalid transition: {} -> {}", task.status, new_status), Some("status"));
                }
                continue;
            }
            if !allowed && !request.force {
                result.fail(
                    id,
                    format!("invalid status transition: {} -> {}", task.status, new_status),
                    Some("status"),
                );
                continue;
            }
            if request.check_dependencies && new_status == TaskStatus::InProgress {
                match self.tasks.blocking_titles(id) {
                    Ok(blocking) if !blocking.is_empty() => {
                        result.fail(
                            id,
                            format!("task has incomplete dependencies: {}", blocking.join(", ")),
                            Some("dependencies"),
                        );
                        continue;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        result.fail(id, format!("dependency check failed: {}", e), None);
                        continue;
                    }
                }
            }
            if new_status == TaskStatus::Completed && !request.force {
                let open = match self.tasks.db().children(id) {
                    Ok(children) => children.iter().filter(|c| c.status != TaskStatus::Completed).count(),
                    Err(e) => {
                        result.fail(id, format!("subtask check failed: {}", e), None);
                        continue;
                    }
                };
                if open > 0 {
                    result.fail(id, ToolError::subtasks_incomplete(open).message, Some("status"));
                    continue;
                }
            }

            if let Err(e) = self.tasks.db().update_task_status(id, new_status) {
                result.fail(id, format!("update failed: {}", e), None);
                continue;
            }
            self.record(
                id,
                "bulk_status_change",
                json!({ "old_status": task.status, "new_status": new_status }),
            );
            result.successful.push(id.clone());
        }

        let result = result.finish(request.task_ids.len(), started);
        info!(status = %new_status, summary = %result.summary, "bulk status change finished");
        Ok(result)
    }

    /// Add, remove or replace tags on many tasks.
    pub fn bulk_tags(&self, request: BulkTagRequest) -> Result<BatchResult> {
        let started = Instant::now();
        let wanted: BTreeSet<String> = normalize_tag_names(&request.tags).into_iter().collect();
        if wanted.is_empty() && request.operation != TagOperation::Replace {
            return Err(ToolError::missing_field("tags").into());
        }
        let mut result = BatchResult::default();

        for id in &request.task_ids {
            let task = match self.tasks.get(id) {
                Ok(task) => task,
                Err(e) => {
                    result.fail(id, ToolError::from(e).message, None);
                    continue;
                }
            };

            let current: BTreeSet<String> = task.tags.iter().cloned().collect();
            let next = request.operation.apply(&current, &wanted);
            if next == current {
                result.warn(id, "no changes needed", Some("tags"));
                continue;
            }
            if request.dry_run {
                result.warn(
                    id,
                    format!("dry run - would {} tags: {}", request.operation.as_str(), request.tags.join(", ")),
                    Some("tags"),
                );
                continue;
            }

            let names: Vec<String> = next.into_iter().collect();
            if let Err(e) = self.tasks.db().set_task_tags(id, &names) {
                result.fail(id, format!("tag operation failed: {}", e), Some("tags"));
                continue;
            }
            self.record(
                id,
                "bulk_tag_operation",
                json!({ "operation": request.operation, "tags": request.tags }),
            );
            result.successful.push(id.clone());
        }

        let result = result.finish(request.task_ids.len(), started);
        info!(operation = request.operation.as_str(), summary = %result.summary, "bulk tag operation finished");
        Ok(result)
    }

    /// Delete many tasks. Needs the literal `DELETE <N> TASKS` phrase unless
    /// forced.
    pub fn bulk_delete(&self, request: BulkDeleteRequest) -> Result<BatchResult> {
        let started = Instant::now();
        let expected = delete_confirmation(request.task_ids.len());
        if !request.force && request.confirmation.trim() != expected {
            return Err(ToolError::confirmation_required(&expected).into());
        }
        let mut result = BatchResult::default();

        for id in &request.task_ids {
            let task = match self.tasks.get(id) {
                Ok(task) => task,
                Err(e) => {
                    result.fail(id, ToolError::from(e).message, None);
                    continue;
                }
            };

            let children = match self.tasks.db().children(id) {
                Ok(children) => children.len(),
                Err(e) => {
                    result.fail(id, format!("subtask check failed: {}", e), None);
                    continue;
                }
            };
            if children > 0 && !request.delete_subtasks {
                result.fail(
                    id,
                    format!("task has {} subtasks, use delete_subtasks=true to force", children),
                    None,
                );
                continue;
            }
            if request.dry_run {
                result.warn(id, "dry run - would be deleted", None);
                continue;
            }

            let deleted = if children > 0 {
                self.tasks.db().delete_task_tree(id)
            } else {
                self.tasks.db().delete_task(id).map(usize::from)
            };
            match deleted {
                Ok(count) => {
                    self.record(id, "bulk_delete", json!({ "title": task.title, "deleted": count }));
                    result.successful.push(id.clone());
                }
                Err(e) => result.fail(id, format!("delete failed: {}", e), None),
            }
        }

        let result = result.finish(request.task_ids.len(), started);
        info!(summary = %result.summary, "bulk delete finished");
        Ok(result)
    }
}
