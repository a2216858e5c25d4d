//! Automatic status changes: start on access, pause after inactivity,
//! complete parents whose subtasks are all done, and execution of parsed
//! natural-language commands.
//!
//! Starts on access and pauses on inactivity run while holding the timer map
//! lock, so an access and a firing timer for the same task never interleave.
//! Completion handling and parent auto-completion do not hold it across the
//! status write; they take it only to clear timers. A timer carries the
//! generation it was armed with; if its slot has since been re-armed or
//! cleared, the callback does nothing, and a pause never touches a task
//! that is no longer in progress.

use super::ai_context::AiContextTracker;
use super::nlp::{NlpAction, NlpProcessor, Outcome, QueryIntent, format_response};
use super::tasks::TaskEngine;
use crate::db::Database;
use crate::error::ToolError;
use crate::types::{NewTask, Priority, Task, TaskEdit, TaskFilter, TaskStatus};
use anyhow::{Result, anyhow};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Inactivity period after which an in-progress task drops back to pending.
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Interaction log task id for commands not tied to one task.
const SYSTEM_TASK_ID: &str = "system";

struct TimerSlot {
    generation: u64,
    handle: JoinHandle<()>,
}

type TimerMap = HashMap<String, TimerSlot>;

/// Result of a natural-language command.
#[derive(Debug, Clone, Serialize)]
pub struct NlpDispatch {
    pub intent: QueryIntent,
    pub result: Value,
    pub message: String,
}

#[derive(Clone)]
pub struct AutoStateManager {
    tasks: TaskEngine,
    tracker: AiContextTracker,
    nlp: NlpProcessor,
    timeout: Duration,
    enabled: bool,
    timers: Arc<Mutex<TimerMap>>,
    next_generation: Arc<AtomicU64>,
}

impl AutoStateManager {
    pub fn new(tasks: TaskEngine, tracker: AiContextTracker, timeout: Duration, enabled: bool) -> Self {
        Self {
            tasks,
            tracker,
            nlp: NlpProcessor::new(),
            timeout,
            enabled,
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(1)),
        }
    }

    fn db(&self) -> &Database {
        self.tasks.db()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn lock_timers(&self) -> Result<MutexGuard<'_, TimerMap>> {
        self.timers.lock().map_err(|_| anyhow!("timer map mutex poisoned"))
    }

    pub fn active_timer_count(&self) -> usize {
        self.lock_timers().map(|map| map.len()).unwrap_or(0)
    }

    pub fn has_timer(&self, task_id: &str) -> bool {
        self.lock_timers().is_ok_and(|map| map.contains_key(task_id))
    }

    /// (Re)start the inactivity timer for `task_id`.
    fn arm_locked(&self, map: &mut TimerMap, task_id: &str) {
        if !self.enabled {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(task_id, "no async runtime, inactivity timer not armed");
            return;
        };

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let manager = self.clone();
        let id = task_id.to_string();
        let timeout = self.timeout;
        let handle = runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            manager.on_timer_fire(&id, generation);
        });

        if let Some(old) = map.insert(task_id.to_string(), TimerSlot { generation, handle }) {
            old.handle.abort();
        }
        debug!(task_id, generation, "inactivity timer armed");
    }

    fn clear_locked(map: &mut TimerMap, task_id: &str) -> bool {
        match map.remove(task_id) {
            Some(slot) => {
                slot.handle.abort();
                true
            }
            None => false,
        }
    }

    /// A task was touched: start it if possible and reset its timer.
    pub fn on_access(&self, task_id: &str) -> Result<Task> {
        if !self.enabled {
            return self.tasks.get(task_id);
        }
        let mut map = self.lock_timers()?;
        if !self.start_locked(&mut map, task_id)? {
            let task = self.tasks.get(task_id)?;
            if task.status == TaskStatus::InProgress {
                self.arm_locked(&mut map, task_id);
            }
        }
        drop(map);
        self.tasks.get(task_id)
    }

    /// Move a pending, unblocked task to in_progress. Returns whether it moved.
    pub fn auto_transition_to_in_progress(&self, task_id: &str) -> Result<bool> {
        if !self.enabled {
            return Ok(false);
        }
        let mut map = self.lock_timers()?;
        self.start_locked(&mut map, task_id)
    }

    fn start_locked(&self, map: &mut TimerMap, task_id: &str) -> Result<bool> {
        let task = self.tasks.get(task_id)?;
        if task.status != TaskStatus::Pending || !self.tasks.blocking_titles(task_id)?.is_empty() {
            return Ok(false);
        }

        self.tasks.update_status(task_id, TaskStatus::InProgress)?;
        self.tracker.record_interaction(
            task_id,
            "auto_transition_start",
            json!({
                "from": TaskStatus::Pending,
                "to": TaskStatus::InProgress,
                "reason": "task_accessed",
            }),
        )?;
        self.arm_locked(map, task_id);
        info!(task_id, "task started on access");
        Ok(true)
    }

    /// Timer callback. Stale generations are ignored.
    pub fn on_timer_fire(&self, task_id: &str, generation: u64) {
        let mut map = match self.lock_timers() {
            Ok(map) => map,
            Err(e) => {
                warn!(task_id, error = %e, "timer fired without lock");
                return;
            }
        };
        if map.get(task_id).map(|slot| slot.generation) != Some(generation) {
            debug!(task_id, generation, "stale timer ignored");
            return;
        }
        // The running task is this callback; dropping the handle detaches it.
        map.remove(task_id);

        if let Err(e) = self.pause_locked(task_id) {
            warn!(task_id, error = %e, "inactivity pause failed");
        }
    }

    /// Move an in_progress task back to pending and drop its timer.
    pub fn auto_transition_to_pending(&self, task_id: &str) -> Result<bool> {
        let mut map = self.lock_timers()?;
        Self::clear_locked(&mut map, task_id);
        self.pause_locked(task_id)
    }

    fn pause_locked(&self, task_id: &str) -> Result<bool> {
        let Some(task) = self.db().get_task(task_id)? else {
            debug!(task_id, "paused task no longer exists");
            return Ok(false);
        };
        if task.status != TaskStatus::InProgress {
            return Ok(false);
        }

        self.tasks.update_status(task_id, TaskStatus::Pending)?;
        self.tracker.record_interaction(
            task_id,
            "auto_transition_pause",
            json!({
                "from": TaskStatus::InProgress,
                "to": TaskStatus::Pending,
                "reason": "inactivity_timeout",
                "timeout_secs": self.timeout.as_secs(),
            }),
        )?;
        info!(task_id, timeout_secs = self.timeout.as_secs(), "task paused after inactivity");
        Ok(true)
    }

    /// Drop the task's timer without changing its status.
    pub fn clear_timer(&self, task_id: &str) -> Result<bool> {
        let mut map = self.lock_timers()?;
        Ok(Self::clear_locked(&mut map, task_id))
    }

    /// A task was completed: stop its timer and complete any ancestors
    /// whose subtasks are now all done. Returns the parents completed.
    pub fn on_completion(&self, task_id: &str) -> Result<Vec<Task>> {
        self.clear_timer(task_id)?;
        self.parent_auto_complete(task_id)
    }

    /// Walk up from `task_id`, completing each parent whose children are all
    /// completed. Stops at the first parent that still has open work.
    pub fn parent_auto_complete(&self, task_id: &str) -> Result<Vec<Task>> {
        let mut completed = Vec::new();
        let mut current = self.tasks.get(task_id)?;

        while let Some(parent_id) = current.parent_id.clone() {
            let parent = self.tasks.get(&parent_id)?;
            if parent.status == TaskStatus::Completed {
                break;
            }
            let children = self.db().children(&parent_id)?;
            if children.iter().any(|c| c.status != TaskStatus::Completed) {
                break;
            }

            let parent = self.tasks.update_status(&parent_id, TaskStatus::Completed)?;
            self.tracker.record_interaction(
                &parent_id,
                "auto_complete_parent",
                json!({
                    "reason": "all_subtasks_completed",
                    "subtask_count": children.len(),
                }),
            )?;
            self.clear_timer(&parent_id)?;
            info!(task_id = %parent_id, subtasks = children.len(), "parent auto-completed");

            completed.push(parent.clone());
            current = parent;
        }

        Ok(completed)
    }

    /// React to a status set through the normal update path.
    pub fn on_status_change(&self, task_id: &str, status: TaskStatus) -> Result<Vec<Task>> {
        match status {
            TaskStatus::Completed => self.on_completion(task_id),
            TaskStatus::InProgress => {
                let mut map = self.lock_timers()?;
                self.arm_locked(&mut map, task_id);
                Ok(Vec::new())
            }
            TaskStatus::Pending | TaskStatus::Cancelled => {
                self.clear_timer(task_id)?;
                Ok(Vec::new())
            }
        }
    }

    /// Stop every timer. Returns how many were running.
    pub fn cleanup(&self) -> usize {
        let Ok(mut map) = self.lock_timers() else {
            return 0;
        };
        let count = map.len();
        for (_, slot) in map.drain() {
            slot.handle.abort();
        }
        if count > 0 {
            debug!(count, "inactivity timers stopped");
        }
        count
    }

    /// Parse and execute a free-text command. `language` is the configured
    /// `server.language` (default `en`); any value other than `en` selects
    /// the Turkish messages.
    pub fn nlp_dispatch(&self, text: &str, language: &str) -> Result<NlpDispatch> {
        let intent = self.nlp.parse(text);
        self.nlp.validate(&intent)?;
        self.tracker.record_interaction(
            SYSTEM_TASK_ID,
            "nlp_query",
            json!({
                "query": text,
                "action": intent.action,
                "confidence": intent.confidence,
            }),
        )?;

        let (result, message) = match self.execute(&intent, text) {
            Ok(Executed::Tasks(tasks)) => {
                let message = format_response(intent.action, Outcome::Tasks(tasks.len()), language);
                (serde_json::to_value(&tasks)?, message)
            }
            Ok(Executed::Task(task)) => {
                let message = format_response(intent.action, Outcome::Title(&task.title), language);
                (serde_json::to_value(&task)?, message)
            }
            Err(e) => {
                let err = ToolError::from(e);
                let message = format_response(intent.action, Outcome::Failed(&err.message), language);
                return Err(err.with_details(message).into());
            }
        };

        debug!(action = intent.action.as_str(), confidence = intent.confidence, "nlp command executed");
        Ok(NlpDispatch { intent, result, message })
    }

    fn execute(&self, intent: &QueryIntent, text: &str) -> Result<Executed> {
        match intent.action {
            NlpAction::List => Ok(Executed::Tasks(self.filtered_tasks(intent)?)),
            NlpAction::Search => {
                if intent.filters.is_empty() && intent.time_range.is_none() {
                    let content = self.nlp.extract_task_content(text, NlpAction::Search);
                    let terms = content.title.unwrap_or_else(|| text.to_string());
                    Ok(Executed::Tasks(self.tracker.keyword_search(&terms)?))
                } else {
                    Ok(Executed::Tasks(self.filtered_tasks(intent)?))
                }
            }
            NlpAction::Status => match intent.parameters.task_references.first() {
                Some(reference) => Ok(Executed::Task(self.tasks.resolve_reference(reference)?)),
                None => Ok(Executed::Tasks(self.filtered_tasks(intent)?)),
            },
            NlpAction::Create => self.create_from_text(intent, text).map(Executed::Task),
            NlpAction::Update => self.update_from_text(intent, text).map(Executed::Task),
            NlpAction::Complete => {
                let task = self.referenced(intent)?;
                self.tasks.update_status(&task.id, TaskStatus::Completed)?;
                self.on_completion(&task.id)?;
                self.tasks.get(&task.id).map(Executed::Task)
            }
            NlpAction::Delete => {
                let task = self.referenced(intent)?;
                let deleted = self.tasks.delete(&task.id)?;
                self.clear_timer(&deleted.id)?;
                Ok(Executed::Task(deleted))
            }
        }
    }

    fn referenced(&self, intent: &QueryIntent) -> Result<Task> {
        let reference = intent
            .parameters
            .task_references
            .first()
            .ok_or_else(|| ToolError::missing_field("task_reference"))?;
        self.tasks.resolve_reference(reference)
    }

    fn filtered_tasks(&self, intent: &QueryIntent) -> Result<Vec<Task>> {
        let filters = &intent.filters;
        let mut filter = TaskFilter {
            priority: filters.priority.as_deref().and_then(intent_priority),
            ..Default::default()
        };
        match filters.status.as_deref() {
            Some("open") => filter.exclude_completed = true,
            Some(status) => filter.status = TaskStatus::parse(status),
            None => {}
        }
        if let Some(ref range) = intent.time_range {
            filter.created_from = Some(range.start_ms());
            filter.created_before = Some(range.end_ms());
        }

        let wanted: Vec<String> = filters.tags.iter().map(|t| t.to_lowercase()).collect();
        let category = filters.category.as_deref();
        Ok(self
            .db()
            .list_tasks(&filter)?
            .into_iter()
            .filter(|task| {
                let tags: Vec<String> = task.tags.iter().map(|t| t.to_lowercase()).collect();
                wanted.iter().all(|w| tags.contains(w))
                    && category.is_none_or(|c| {
                        tags.iter().any(|t| t == c)
                            || format!("{} {}", task.title, task.description).to_lowercase().contains(c)
                    })
            })
            .collect())
    }

    fn create_from_text(&self, intent: &QueryIntent, text: &str) -> Result<Task> {
        let content = self.nlp.extract_task_content(text, NlpAction::Create);
        let title = content.title.ok_or_else(|| ToolError::missing_field("title"))?;

        let mut tags = intent.filters.tags.clone();
        if let Some(ref category) = intent.filters.category {
            tags.push(category.clone());
        }
        let task = self.tasks.create(NewTask {
            title,
            description: content.description.unwrap_or_default(),
            priority: intent
                .filters
                .priority
                .as_deref()
                .and_then(intent_priority)
                .unwrap_or_default(),
            project_id: self.db().active_project()?.map(|p| p.id),
            parent_id: None,
            due_date: content.due_date.map(|d| d.to_string()),
            tags,
        })?;
        self.tracker
            .record_interaction(&task.id, "nlp_create", json!({ "query": text }))?;
        Ok(task)
    }

    /// Applies the priority and status named in the text, plus whatever
    /// follows the first `:` as the new description.
    fn update_from_text(&self, intent: &QueryIntent, text: &str) -> Result<Task> {
        let task = self.referenced(intent)?;

        let edit = TaskEdit {
            description: text
                .split_once(':')
                .map(|(_, rest)| rest.trim().to_string())
                .filter(|d| !d.is_empty()),
            priority: intent.filters.priority.as_deref().and_then(intent_priority),
            ..Default::default()
        };
        if !edit.is_empty() {
            self.tasks.edit(&task.id, edit)?;
        }

        if let Some(status) = intent.filters.status.as_deref().and_then(TaskStatus::parse) {
            self.tasks.update_status(&task.id, status)?;
            self.on_status_change(&task.id, status)?;
        }
        self.tasks.get(&task.id)
    }
}

enum Executed {
    Tasks(Vec<Task>),
    Task(Task),
}

fn intent_priority(value: &str) -> Option<Priority> {
    match value {
        "urgent" => Some(Priority::High),
        other => Priority::parse(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(timeout: Duration) -> (AutoStateManager, TaskEngine) {
        let tasks = TaskEngine::new(Database::open_in_memory().unwrap());
        let tracker = AiContextTracker::new(tasks.clone(), 50);
        (AutoStateManager::new(tasks.clone(), tracker, timeout, true), tasks)
    }

    fn add(tasks: &TaskEngine, title: &str, parent: Option<&str>) -> Task {
        let input = NewTask {
            title: title.into(),
            ..Default::default()
        };
        match parent {
            Some(p) => tasks.create_subtask(p, input).unwrap(),
            None => tasks.create(input).unwrap(),
        }
    }

    #[test]
    fn access_without_runtime_starts_but_arms_nothing() {
        let (manager, tasks) = manager(DEFAULT_INACTIVITY_TIMEOUT);
        let t = add(&tasks, "t", None);
        assert_eq!(manager.on_access(&t.id).unwrap().status, TaskStatus::InProgress);
        assert_eq!(manager.active_timer_count(), 0);
    }

    #[test]
    fn blocked_task_is_not_started() {
        let (manager, tasks) = manager(DEFAULT_INACTIVITY_TIMEOUT);
        let a = add(&tasks, "a", None);
        let b = add(&tasks, "b", None);
        tasks.depend(&a.id, &b.id, None).unwrap();
        assert!(!manager.auto_transition_to_in_progress(&b.id).unwrap());
        assert_eq!(tasks.get(&b.id).unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn disabled_manager_leaves_status_alone() {
        let tasks = TaskEngine::new(Database::open_in_memory().unwrap());
        let tracker = AiContextTracker::new(tasks.clone(), 50);
        let manager = AutoStateManager::new(tasks.clone(), tracker, DEFAULT_INACTIVITY_TIMEOUT, false);
        let t = add(&tasks, "t", None);
        assert_eq!(manager.on_access(&t.id).unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn completion_walks_up_the_tree() {
        let (manager, tasks) = manager(DEFAULT_INACTIVITY_TIMEOUT);
        let root = add(&tasks, "root", None);
        let mid = add(&tasks, "mid", Some(&root.id));
        let leaf = add(&tasks, "leaf", Some(&mid.id));

        tasks.update_status(&leaf.id, TaskStatus::InProgress).unwrap();
        tasks.update_status(&leaf.id, TaskStatus::Completed).unwrap();
        let completed = manager.on_completion(&leaf.id).unwrap();

        let ids: Vec<&str> = completed.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec![mid.id.as_str(), root.id.as_str()]);
        assert_eq!(tasks.get(&root.id).unwrap().status, TaskStatus::Completed);
    }

    #[test]
    fn open_sibling_stops_the_walk() {
        let (manager, tasks) = manager(DEFAULT_INACTIVITY_TIMEOUT);
        let root = add(&tasks, "root", None);
        let done = add(&tasks, "done", Some(&root.id));
        add(&tasks, "open", Some(&root.id));

        tasks.update_status(&done.id, TaskStatus::Completed).unwrap();
        assert!(manager.on_completion(&done.id).unwrap().is_empty());
        assert_eq!(tasks.get(&root.id).unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn inactivity_pauses_task() {
        let (manager, tasks) = manager(Duration::from_millis(50));
        let t = add(&tasks, "t", None);

        manager.on_access(&t.id).unwrap();
        assert_eq!(manager.active_timer_count(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(tasks.get(&t.id).unwrap().status, TaskStatus::Pending);
        assert_eq!(manager.active_timer_count(), 0);

        let actions: Vec<String> = tasks
            .db()
            .last_interactions(5)
            .unwrap()
            .into_iter()
            .map(|i| i.action)
            .collect();
        assert_eq!(actions[0], "auto_transition_pause");
    }

    #[tokio::test]
    async fn stale_generation_is_ignored() {
        let (manager, tasks) = manager(Duration::from_secs(60));
        let t = add(&tasks, "t", None);
        manager.on_access(&t.id).unwrap();

        manager.on_timer_fire(&t.id, 0);
        assert_eq!(tasks.get(&t.id).unwrap().status, TaskStatus::InProgress);
        assert!(manager.has_timer(&t.id));

        assert_eq!(manager.cleanup(), 1);
        assert!(!manager.has_timer(&t.id));
    }
}
