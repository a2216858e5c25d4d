//! AI session context: the active task, the MRU list of recently touched
//! tasks and the interaction log.

use super::tasks::TaskEngine;
use crate::db::Database;
use crate::error::ToolError;
use crate::types::{
    AiContext, AiInteraction, ContextSummary, Priority, SessionSummary, Task, TaskEdit, TaskFilter,
    TaskStatus,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

/// How many MRU entries the summary resolves.
const SUMMARY_RECENT: usize = 5;
/// How many next priorities and blockers the summary lists.
const SUMMARY_LIST: usize = 5;

/// One entry of an AI batch update: a task id and loosely typed field values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiBatchEntry {
    pub id: String,
    #[serde(default)]
    pub updates: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiBatchFailure {
    pub task_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiBatchResult {
    pub successful: Vec<String>,
    pub failed: Vec<AiBatchFailure>,
    pub total_processed: usize,
}

#[derive(Clone)]
pub struct AiContextTracker {
    tasks: TaskEngine,
    summary_window: usize,
}

impl AiContextTracker {
    pub fn new(tasks: TaskEngine, summary_window: usize) -> Self {
        Self {
            tasks,
            summary_window: summary_window.max(1),
        }
    }

    fn db(&self) -> &Database {
        self.tasks.db()
    }

    /// Append to the interaction log.
    pub fn record_interaction(&self, task_id: &str, action: &str, context: Value) -> Result<AiInteraction> {
        debug!(task_id, action, "interaction recorded");
        self.db().record_interaction(task_id, action, context)
    }

    pub fn context(&self) -> Result<AiContext> {
        self.db().load_ai_context()
    }

    /// Make `task_id` the active task.
    ///
    /// A pending task is promoted to in_progress without consulting its
    /// dependencies. The promotion is logged as an `updated` interaction.
    pub fn set_active(&self, task_id: &str) -> Result<Task> {
        let task = self.tasks.get(task_id)?;

        let mut ctx = self.context()?;
        ctx.active_task_id = Some(task.id.clone());
        ctx.push_recent(&task.id);
        self.db().save_ai_context(&ctx)?;
        self.record_interaction(&task.id, "set_active", json!({ "title": task.title }))?;

        if task.status == TaskStatus::Pending {
            self.db().update_task_status(&task.id, TaskStatus::InProgress)?;
            self.record_interaction(
                &task.id,
                "updated",
                json!({
                    "auto_state_change": true,
                    "via": "set_active",
                    "from": TaskStatus::Pending,
                    "to": TaskStatus::InProgress,
                }),
            )?;
            info!(task_id = %task.id, "active task promoted to in_progress");
        }

        self.tasks.get(&task.id)
    }

    /// The active task, if one is set and still exists.
    pub fn get_active(&self) -> Result<Option<Task>> {
        match self.context()?.active_task_id {
            Some(id) => self.db().get_task(&id),
            None => Ok(None),
        }
    }

    /// Unset the active task. Returns whether one was set.
    pub fn clear_active(&self) -> Result<bool> {
        let mut ctx = self.context()?;
        let had = ctx.active_task_id.take().is_some();
        if had {
            self.db().save_ai_context(&ctx)?;
        }
        Ok(had)
    }

    /// Log a view. A pending task whose predecessors are all completed moves
    /// to in_progress.
    pub fn record_view(&self, task_id: &str) -> Result<Task> {
        let task = self.tasks.get(task_id)?;
        self.record_interaction(&task.id, "view", json!({ "status": task.status }))?;

        if task.status == TaskStatus::Pending {
            let blocking = self.tasks.blocking_titles(&task.id)?;
            if blocking.is_empty() {
                self.db().update_task_status(&task.id, TaskStatus::InProgress)?;
                self.record_interaction(
                    &task.id,
                    "updated",
                    json!({
                        "auto_state_change": true,
                        "from": TaskStatus::Pending,
                        "to": TaskStatus::InProgress,
                    }),
                )?;
            } else {
                debug!(task_id = %task.id, blocked_by = blocking.len(), "view left blocked task pending");
            }
        }

        self.db().touch_last_interaction()?;
        let mut ctx = self.context()?;
        ctx.push_recent(&task.id);
        self.db().save_ai_context(&ctx)?;

        self.tasks.get(&task.id)
    }

    pub fn summary(&self) -> Result<ContextSummary> {
        let ctx = self.context()?;

        let active_task = match ctx.active_task_id {
            Some(ref id) => self.db().get_task(id)?,
            None => None,
        };

        let mut recent_tasks = Vec::new();
        for id in &ctx.recent_tasks {
            if recent_tasks.len() == SUMMARY_RECENT {
                break;
            }
            if let Some(task) = self.db().get_task(id)? {
                recent_tasks.push(task);
            }
        }

        let working_project = match active_task.as_ref().and_then(|t| t.project_id.as_deref()) {
            Some(project_id) => self.db().get_project(project_id)?,
            None => None,
        };

        let interactions = self.db().last_interactions(self.summary_window)?;
        let mut session = SessionSummary {
            total_interactions: interactions.len(),
            ..Default::default()
        };
        for interaction in &interactions {
            *session.by_action.entry(interaction.action.clone()).or_default() += 1;
        }

        let next_priorities = self.db().list_tasks(&TaskFilter {
            status: Some(TaskStatus::Pending),
            priority: Some(Priority::High),
            limit: Some(SUMMARY_LIST),
            ..Default::default()
        })?;
        let blockers = self.db().blocked_tasks(SUMMARY_LIST)?;

        Ok(ContextSummary {
            active_task,
            recent_tasks,
            working_project,
            session,
            next_priorities,
            blockers,
        })
    }

    /// Newest interactions first.
    pub fn recent_interactions(&self, limit: usize) -> Result<Vec<AiInteraction>> {
        self.db().last_interactions(limit)
    }

    /// Apply loosely typed updates entry by entry. Unknown fields are ignored.
    pub fn batch_update(&self, entries: Vec<AiBatchEntry>) -> Result<AiBatchResult> {
        let mut result = AiBatchResult {
            total_processed: entries.len(),
            ..Default::default()
        };

        for entry in entries {
            match self.apply_entry(&entry) {
                Ok(()) => {
                    if let Err(e) =
                        self.record_interaction(&entry.id, "bulk_operation", Value::Object(entry.updates.clone()))
                    {
                        warn!(task_id = %entry.id, error = %e, "failed to record bulk operation");
                    }
                    result.successful.push(entry.id);
                }
                Err(e) => result.failed.push(AiBatchFailure {
                    task_id: entry.id,
                    error: ToolError::from(e).message,
                }),
            }
        }

        Ok(result)
    }

    fn apply_entry(&self, entry: &AiBatchEntry) -> Result<()> {
        let text = |key: &str| entry.updates.get(key).and_then(Value::as_str);

        let status = match text("status") {
            Some(s) => Some(TaskStatus::parse(s).ok_or_else(|| ToolError::invalid_status(s))?),
            None => None,
        };
        let priority = match text("priority") {
            Some(p) => Some(Priority::parse(p).ok_or_else(|| ToolError::invalid_priority(p))?),
            None => None,
        };

        let edit = TaskEdit {
            title: text("title").map(String::from),
            description: text("description").map(String::from),
            priority,
            project_id: None,
            due_date: text("due_date").map(String::from),
        };
        self.tasks.apply(&entry.id, edit, status, None)?;
        Ok(())
    }

    /// Tasks whose title or description contains every word of `query`.
    pub fn keyword_search(&self, query: &str) -> Result<Vec<Task>> {
        let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        let tasks = self.db().list_tasks(&TaskFilter::default())?;
        Ok(tasks
            .into_iter()
            .filter(|task| {
                let haystack = format!("{} {}", task.title, task.description).to_lowercase();
                terms.iter().all(|term| haystack.contains(term.as_str()))
            })
            .collect())
    }
}
