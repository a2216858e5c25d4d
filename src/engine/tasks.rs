//! Task engine: creation, status transitions with dependency and subtask
//! gating, edits, hierarchy aggregation and reference resolution.

use crate::db::{Database, new_id, now_ms};
use crate::error::ToolError;
use crate::types::{
    DATE_FORMAT, DEP_PRECEDES, Dependency, DependencyReadiness, ListPreset, NewTask, Priority,
    SortKey, Summary, Task, TaskEdit, TaskFilter, TaskHierarchy, TaskStatus,
};
use anyhow::Result;
use chrono::{Days, Local, NaiveDate};
use tracing::{debug, info};

/// Parse a `YYYY-MM-DD` due date.
pub fn parse_due_date(value: &str) -> Result<NaiveDate, ToolError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| ToolError::invalid_date(value))
}

/// Listing parameters accepted by [`TaskEngine::list`].
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub sort: Option<SortKey>,
    pub preset: Option<ListPreset>,
    pub project_id: Option<String>,
    pub tag: Option<String>,
    pub include_completed: bool,
    pub limit: Option<usize>,
}

/// Percentage of completed descendants, or 0/100 for a leaf depending on
/// its own status.
pub fn progress(task_status: TaskStatus, total: usize, completed: usize) -> f64 {
    if total == 0 {
        return if task_status == TaskStatus::Completed { 100.0 } else { 0.0 };
    }
    (completed as f64 / total as f64) * 100.0
}

#[derive(Clone)]
pub struct TaskEngine {
    db: Database,
}

impl TaskEngine {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Create a pending task and assign its tags in one transaction.
    pub fn create(&self, input: NewTask) -> Result<Task> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(ToolError::empty_title().into());
        }
        let due_date = match input.due_date.as_deref() {
            Some(d) if !d.trim().is_empty() => Some(parse_due_date(d)?),
            _ => None,
        };
        if let Some(ref project_id) = input.project_id {
            if self.db.get_project(project_id)?.is_none() {
                return Err(ToolError::project_not_found(project_id).into());
            }
        }
        if let Some(ref parent_id) = input.parent_id {
            if self.db.get_task(parent_id)?.is_none() {
                return Err(ToolError::task_not_found(parent_id).into());
            }
        }

        let now = now_ms();
        let task = Task {
            id: new_id(),
            title: title.to_string(),
            description: input.description,
            status: TaskStatus::Pending,
            priority: input.priority,
            project_id: input.project_id,
            parent_id: input.parent_id,
            created_at: now,
            updated_at: now,
            due_date,
            tags: Vec::new(),
            dependency_count: 0,
            uncompleted_dependency_count: 0,
            dependent_count: 0,
        };

        let created = self.db.create_task(&task, &input.tags)?;
        info!(task_id = %created.id, title = %created.title, "task created");
        Ok(created)
    }

    /// Create a task under `parent_id`. The subtask lives in the parent's project.
    pub fn create_subtask(&self, parent_id: &str, mut input: NewTask) -> Result<Task> {
        let parent = self.get(parent_id)?;
        input.parent_id = Some(parent.id);
        input.project_id = parent.project_id;
        self.create(input)
    }

    /// Task with tags and counters.
    pub fn get(&self, task_id: &str) -> Result<Task> {
        self.db
            .get_task(task_id)?
            .ok_or_else(|| ToolError::task_not_found(task_id).into())
    }

    pub fn list(&self, query: &ListQuery) -> Result<Vec<Task>> {
        let mut filter = TaskFilter {
            status: query.status,
            priority: query.priority,
            project_id: query.project_id.clone(),
            tag: query.tag.clone(),
            exclude_completed: !query.include_completed && query.status.is_none(),
            sort: query.sort,
            limit: query.limit,
            ..Default::default()
        };

        let today = Local::now().date_naive();
        match query.preset {
            Some(ListPreset::Urgent) => {
                filter.due_from = Some(today);
                filter.due_before = today.checked_add_days(Days::new(8));
                filter.exclude_completed = true;
                filter.sort.get_or_insert(SortKey::DueAsc);
            }
            Some(ListPreset::Overdue) => {
                filter.due_before = Some(today);
                filter.exclude_completed = true;
                filter.sort.get_or_insert(SortKey::DueAsc);
            }
            None => {}
        }

        self.db.list_tasks(&filter)
    }

    /// Titles of unfinished `precedes` predecessors.
    pub fn blocking_titles(&self, task_id: &str) -> Result<Vec<String>> {
        Ok(self
            .db
            .incomplete_predecessors(task_id)?
            .into_iter()
            .map(|t| t.title)
            .collect())
    }

    /// Reject a status change the dependency or subtask gates forbid.
    fn check_status(&self, task: &Task, status: TaskStatus) -> Result<()> {
        if task.status == TaskStatus::Pending && status == TaskStatus::InProgress {
            let blocking = self.blocking_titles(&task.id)?;
            if !blocking.is_empty() {
                return Err(ToolError::deps_not_satisfied(&blocking).into());
            }
        }

        if status == TaskStatus::Completed {
            let open = self
                .db
                .children(&task.id)?
                .iter()
                .filter(|c| c.status != TaskStatus::Completed)
                .count();
            if open > 0 {
                return Err(ToolError::subtasks_incomplete(open).into());
            }
        }
        Ok(())
    }

    /// Change a task's status through the normal, gated path.
    pub fn update_status(&self, task_id: &str, status: TaskStatus) -> Result<Task> {
        let task = self.get(task_id)?;
        if task.status == status {
            return Ok(task);
        }
        self.check_status(&task, status)?;

        self.db.update_task_status(task_id, status)?;
        debug!(task_id, from = %task.status, to = %status, "status changed");
        self.get(task_id)
    }

    /// Apply the fields present in `edit`.
    ///
    /// An empty due date clears it. Moving a task to another project moves
    /// its whole subtree with it.
    pub fn edit(&self, task_id: &str, edit: TaskEdit) -> Result<Task> {
        self.apply(task_id, edit, None, None)
    }

    /// Field edits, a status change and a tag set applied together.
    ///
    /// Everything is validated and gated before anything is written, and
    /// the write is a single transaction: either the whole change lands or
    /// the task is left as it was.
    pub fn apply(
        &self,
        task_id: &str,
        edit: TaskEdit,
        status: Option<TaskStatus>,
        tags: Option<&[String]>,
    ) -> Result<Task> {
        let mut task = self.get(task_id)?;
        let from = task.status;
        let status = status.filter(|s| *s != from);
        if edit.is_empty() && status.is_none() && tags.is_none() {
            return Ok(task);
        }
        if let Some(status) = status {
            self.check_status(&task, status)?;
        }

        if let Some(title) = edit.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(ToolError::empty_title().into());
            }
            task.title = title.to_string();
        }
        if let Some(description) = edit.description {
            task.description = description;
        }
        if let Some(priority) = edit.priority {
            task.priority = priority;
        }
        if let Some(due) = edit.due_date {
            task.due_date = if due.trim().is_empty() {
                None
            } else {
                Some(parse_due_date(&due)?)
            };
        }

        let mut moved = Vec::new();
        if let Some(project_id) = edit.project_id {
            let project_id = if project_id.trim().is_empty() {
                None
            } else {
                if self.db.get_project(&project_id)?.is_none() {
                    return Err(ToolError::project_not_found(&project_id).into());
                }
                Some(project_id)
            };
            if project_id != task.project_id {
                moved = self
                    .db
                    .descendants(task_id)?
                    .into_iter()
                    .map(|(t, _)| t.id)
                    .collect();
            }
            task.project_id = project_id;
        }
        if let Some(status) = status {
            task.status = status;
        }

        self.db.commit_task_changes(&task, &moved, tags)?;
        if let Some(status) = status {
            debug!(task_id, from = %from, to = %status, "status changed");
        }
        if !moved.is_empty() {
            debug!(task_id, moved = moved.len(), "subtree moved with parent");
        }

        self.get(task_id)
    }

    /// Delete a task without children.
    pub fn delete(&self, task_id: &str) -> Result<Task> {
        let task = self.get(task_id)?;
        let children = self.db.children(task_id)?;
        if !children.is_empty() {
            return Err(ToolError::subtasks_present(children.len()).into());
        }
        self.db.delete_task(task_id)?;
        info!(task_id, "task deleted");
        Ok(task)
    }

    /// Record a link `source -> target`. Both tasks must exist.
    pub fn depend(&self, source_id: &str, target_id: &str, kind: Option<&str>) -> Result<Dependency> {
        self.get(source_id)?;
        self.get(target_id)?;
        let kind = kind.filter(|k| !k.trim().is_empty()).unwrap_or(DEP_PRECEDES);
        if kind == DEP_PRECEDES && self.db.precedes_would_cycle(source_id, target_id)? {
            return Err(ToolError::cycle(source_id, target_id).into());
        }
        self.db.add_dependency(source_id, target_id, kind)
    }

    pub fn dependency_ready(&self, task_id: &str) -> Result<DependencyReadiness> {
        self.get(task_id)?;
        let blocking = self.blocking_titles(task_id)?;
        Ok(DependencyReadiness {
            ready: blocking.is_empty(),
            blocking,
        })
    }

    /// Ancestors (direct parent first), descendant counts by status and progress.
    pub fn hierarchy(&self, task_id: &str) -> Result<TaskHierarchy> {
        let task = self.get(task_id)?;
        let ancestors = self.db.ancestors(task_id)?;
        let descendants = self.db.descendants(task_id)?;

        let count = |status: TaskStatus| descendants.iter().filter(|(t, _)| t.status == status).count();
        let total = descendants.len();
        let completed = count(TaskStatus::Completed);

        Ok(TaskHierarchy {
            direct_children: descendants.iter().filter(|(_, depth)| *depth == 1).count(),
            total_descendants: total,
            completed_descendants: completed,
            in_progress_descendants: count(TaskStatus::InProgress),
            pending_descendants: count(TaskStatus::Pending),
            cancelled_descendants: count(TaskStatus::Cancelled),
            progress: progress(task.status, total, completed),
            ancestors,
            task,
        })
    }

    /// Whether `candidate_parent` may not become the parent of `task_id`.
    pub fn cycle_check(&self, task_id: &str, candidate_parent: &str) -> Result<bool> {
        self.db.would_create_parent_cycle(task_id, candidate_parent)
    }

    /// Move a task under a new parent, or make it a root with `None`.
    pub fn change_parent(&self, task_id: &str, new_parent: Option<&str>) -> Result<Task> {
        let task = self.get(task_id)?;
        if let Some(parent_id) = new_parent {
            let parent = self.get(parent_id)?;
            if self.cycle_check(task_id, parent_id)? {
                return Err(ToolError::cycle(task_id, parent_id).into());
            }
            if parent.project_id != task.project_id {
                return Err(ToolError::invalid_value(
                    "parent_id",
                    "parent task belongs to a different project",
                )
                .into());
            }
        }
        self.db.set_parent(task_id, new_parent)?;
        self.get(task_id)
    }

    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<Task>> {
        self.db.search_tasks(query, limit)
    }

    /// Totals across the store.
    pub fn summary(&self) -> Result<Summary> {
        let tasks = self.db.list_tasks(&TaskFilter::default())?;
        let today = Local::now().date_naive();

        let mut summary = Summary {
            total_tasks: tasks.len(),
            total_projects: self.db.count_projects()?,
            active_project: self.db.active_project()?.map(|p| p.id),
            ..Default::default()
        };
        for status in TaskStatus::ALL {
            summary.by_status.insert(status.as_str().to_string(), 0);
        }
        for task in &tasks {
            *summary.by_status.entry(task.status.as_str().to_string()).or_default() += 1;
            *summary.by_priority.entry(task.priority.as_str().to_string()).or_default() += 1;
            if task.is_overdue(today) {
                summary.overdue += 1;
            }
        }
        Ok(summary)
    }

    /// Resolve `id:X` (exact, then unique prefix), `title:T` or `recent:N`.
    /// A bare string is treated as an id.
    pub fn resolve_reference(&self, reference: &str) -> Result<Task> {
        let reference = reference.trim();
        if let Some(title) = reference.strip_prefix("title:") {
            return self
                .db
                .search_tasks(title, 1)?
                .into_iter()
                .next()
                .ok_or_else(|| ToolError::task_not_found(reference).into());
        }
        if let Some(n) = reference.strip_prefix("recent:") {
            let n: usize = n
                .trim()
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ToolError::invalid_value("reference", "recent:<n> needs a positive number"))?;
            return self
                .db
                .recent_tasks(n)?
                .into_iter()
                .nth(n - 1)
                .ok_or_else(|| ToolError::task_not_found(reference).into());
        }

        let id = reference.strip_prefix("id:").unwrap_or(reference);
        if let Some(task) = self.db.get_task(id)? {
            return Ok(task);
        }
        let matches = self.db.find_tasks_by_id_prefix(id, 2)?;
        match matches.as_slice() {
            [only] => self.get(&only.id),
            [] => Err(ToolError::task_not_found(id).into()),
            _ => Err(ToolError::invalid_value("reference", &format!("id prefix '{}' is ambiguous", id)).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_progress_follows_own_status() {
        assert_eq!(progress(TaskStatus::Completed, 0, 0), 100.0);
        assert_eq!(progress(TaskStatus::InProgress, 0, 0), 0.0);
        assert_eq!(progress(TaskStatus::Pending, 4, 1), 25.0);
    }

    #[test]
    fn due_date_must_be_calendar_day() {
        assert!(parse_due_date("2024-02-29").is_ok());
        let err = parse_due_date("2024-13-01").unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidDateFormat);
        assert!(parse_due_date("01/02/2024").is_err());
    }
}
