//! Domain engines and the [`Engine`] that wires them to one database.
//!
//! The facade owns the cross-component hooks: status changes made through it
//! reach the auto-state manager, so completions propagate to parents and
//! inactivity timers follow the task's status.

pub mod ai_context;
pub mod auto_state;
pub mod batch;
pub mod file_watcher;
pub mod intelligent;
pub mod nlp;
pub mod search;
pub mod seeds;
pub mod suggestions;
pub mod tasks;
pub mod templates;

use crate::config::Config;
use crate::db::Database;
use crate::types::{FileWatch, Task, TaskStatus};
use ai_context::{AiBatchEntry, AiBatchResult, AiContextTracker};
use anyhow::Result;
use auto_state::{AutoStateManager, NlpDispatch};
use batch::{BatchProcessor, BatchResult, BatchUpdateRequest, BulkDeleteRequest, BulkStatusRequest};
use file_watcher::FileWatcher;
use intelligent::IntelligentCreator;
use search::SearchEngine;
use serde::Serialize;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use suggestions::SuggestionEngine;
use tasks::TaskEngine;
use templates::TemplateEngine;
use tracing::{debug, info, warn};

/// A status change and the parents it completed on the way.
#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub task: Task,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub auto_completed: Vec<Task>,
}

#[derive(Clone)]
pub struct Engine {
    pub tasks: TaskEngine,
    pub templates: TemplateEngine,
    pub tracker: AiContextTracker,
    pub auto_state: AutoStateManager,
    pub batch: BatchProcessor,
    pub intelligent: IntelligentCreator,
    pub suggestions: SuggestionEngine,
    pub search: SearchEngine,
    pub watcher: FileWatcher,
    language: String,
    recent_limit: usize,
}

impl Engine {
    pub fn new(db: Database, config: &Config) -> Result<Self> {
        let tasks = TaskEngine::new(db);
        let tracker = AiContextTracker::new(tasks.clone(), config.ai.summary_interaction_window);
        let templates = TemplateEngine::new(tasks.clone(), config.templates.language.clone());
        if config.templates.seed_defaults {
            templates.seed_defaults()?;
        }

        let auto_state = AutoStateManager::new(
            tasks.clone(),
            tracker.clone(),
            config.auto_state.timeout(),
            config.auto_state.enabled,
        );
        let engine = Self {
            watcher: FileWatcher::new(tasks.clone(), tracker.clone(), auto_state.clone(), config.watcher.clone()),
            auto_state,
            batch: BatchProcessor::new(tasks.clone(), tracker.clone()),
            intelligent: IntelligentCreator::new(tasks.clone()),
            suggestions: SuggestionEngine::new(tasks.clone()),
            search: SearchEngine::new(tasks.clone()),
            templates,
            tracker,
            tasks,
            language: config.server.language.clone(),
            recent_limit: config.ai.recent_limit,
        };
        info!(
            auto_state = config.auto_state.enabled,
            timeout_secs = config.auto_state.inactivity_timeout_secs,
            "engine ready"
        );
        Ok(engine)
    }

    /// Engine over a fresh in-memory database with default settings.
    pub fn in_memory() -> Result<Self> {
        Self::new(Database::open_in_memory()?, &Config::default())
    }

    pub fn db(&self) -> &Database {
        self.tasks.db()
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn recent_limit(&self) -> usize {
        self.recent_limit
    }

    /// Gated status change followed by the auto-state hooks.
    pub fn update_status(&self, task_id: &str, status: TaskStatus) -> Result<StatusChange> {
        let before = self.tasks.get(task_id)?;
        let task = self.tasks.update_status(task_id, status)?;
        if before.status != status {
            self.tracker.record_interaction(
                &task.id,
                "updated",
                json!({ "from": before.status, "to": status }),
            )?;
        }
        let auto_completed = self.auto_state.on_status_change(&task.id, status)?;
        let task = if auto_completed.is_empty() { task } else { self.tasks.get(task_id)? };
        Ok(StatusChange { task, auto_completed })
    }

    /// Read a task as the AI client sees it: log the view, start it when
    /// possible and reset its inactivity timer.
    pub fn view(&self, task_id: &str) -> Result<Task> {
        let task = self.tracker.record_view(task_id)?;
        if task.status == TaskStatus::InProgress {
            return self.auto_state.on_access(&task.id);
        }
        Ok(task)
    }

    pub fn set_active(&self, task_id: &str) -> Result<Task> {
        let task = self.tracker.set_active(task_id)?;
        self.auto_state.on_access(&task.id)
    }

    pub fn delete_task(&self, task_id: &str) -> Result<Task> {
        let task = self.tasks.delete(task_id)?;
        self.auto_state.clear_timer(&task.id)?;
        Ok(task)
    }

    /// Link a file to a task and register it with the running watcher.
    pub fn watch_file(&self, task_id: &str, file_path: &str) -> Result<FileWatch> {
        let task = self.tasks.get(task_id)?;
        let watch = self.db().add_file_watch(&task.id, file_path.trim())?;
        self.sync_watcher();
        Ok(watch)
    }

    pub fn unwatch_file(&self, task_id: &str, file_path: &str) -> Result<bool> {
        let removed = self.db().remove_file_watch(task_id, file_path.trim())?;
        if removed {
            self.sync_watcher();
        }
        Ok(removed)
    }

    fn sync_watcher(&self) {
        if let Err(e) = self.watcher.sync() {
            warn!(error = %e, "file watcher not updated");
        }
    }

    pub fn instantiate_template(&self, template: &str, values: &BTreeMap<String, String>) -> Result<Task> {
        let task = self.templates.instantiate(template, values)?;
        self.tracker
            .record_interaction(&task.id, "created", json!({ "template": template }))?;
        Ok(task)
    }

    pub fn batch_update(&self, requests: Vec<BatchUpdateRequest>) -> Result<BatchResult> {
        let statuses: Vec<(String, Option<TaskStatus>)> = requests
            .iter()
            .filter(|r| !r.dry_run)
            .map(|r| {
                let status = r.updates.get("status").and_then(|v| v.as_str()).and_then(TaskStatus::parse);
                (r.task_id.clone(), status)
            })
            .collect();
        let result = self.batch.process_batch_update(requests)?;
        for (id, status) in statuses {
            if let Some(status) = status {
                self.after_batch(&result, &id, status);
            }
        }
        Ok(result)
    }

    pub fn bulk_status(&self, request: BulkStatusRequest) -> Result<BatchResult> {
        let status = TaskStatus::parse(&request.new_status);
        let dry_run = request.dry_run;
        let result = self.batch.bulk_status(request)?;
        if let (Some(status), false) = (status, dry_run) {
            for id in result.successful.clone() {
                self.after_batch(&result, &id, status);
            }
        }
        Ok(result)
    }

    /// Bulk delete, then drop the timers of every removed task, including
    /// subtasks removed with their parent.
    pub fn bulk_delete(&self, request: BulkDeleteRequest) -> Result<BatchResult> {
        let mut subtrees: HashMap<String, Vec<String>> = HashMap::new();
        if request.delete_subtasks && !request.dry_run {
            for id in &request.task_ids {
                match self.db().descendants(id) {
                    Ok(found) => {
                        subtrees.insert(id.clone(), found.into_iter().map(|(t, _)| t.id).collect());
                    }
                    Err(e) => debug!(task_id = %id, error = %e, "subtree not resolved before delete"),
                }
            }
        }

        let result = self.batch.bulk_delete(request)?;
        for id in &result.successful {
            let removed = std::iter::once(id).chain(subtrees.get(id).into_iter().flatten());
            for task_id in removed {
                if let Err(e) = self.auto_state.clear_timer(task_id) {
                    warn!(task_id = %task_id, error = %e, "failed to clear timer after delete");
                }
            }
        }
        Ok(result)
    }

    pub fn ai_batch_update(&self, entries: Vec<AiBatchEntry>) -> Result<AiBatchResult> {
        let statuses: Vec<(String, Option<TaskStatus>)> = entries
            .iter()
            .map(|e| {
                let status = e.updates.get("status").and_then(|v| v.as_str()).and_then(TaskStatus::parse);
                (e.id.clone(), status)
            })
            .collect();
        let result = self.tracker.batch_update(entries)?;
        for (id, status) in statuses {
            if let (Some(status), true) = (status, result.successful.contains(&id)) {
                if let Err(e) = self.auto_state.on_status_change(&id, status) {
                    warn!(task_id = %id, error = %e, "auto-state hook failed after AI batch update");
                }
            }
        }
        Ok(result)
    }

    fn after_batch(&self, result: &BatchResult, task_id: &str, status: TaskStatus) {
        if !result.successful.iter().any(|id| id == task_id) {
            return;
        }
        if let Err(e) = self.auto_state.on_status_change(task_id, status) {
            warn!(task_id, error = %e, "auto-state hook failed after batch");
        }
    }

    /// Run a natural-language command in the configured response language.
    pub fn nlp(&self, text: &str) -> Result<NlpDispatch> {
        self.auto_state.nlp_dispatch(text, &self.language)
    }

    /// Stop background timers.
    pub fn shutdown(&self) {
        self.watcher.stop();
        let stopped = self.auto_state.cleanup();
        info!(stopped, "engine shut down");
    }
}
