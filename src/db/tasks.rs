//! Task CRUD operations.

use super::{Database, now_ms};
use crate::types::{
    DATE_FORMAT, DependencyCounts, SortKey, Task, TaskFilter, TaskStatus,
};
use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{Connection, Row, ToSql, params};

pub(crate) const TASK_COLUMNS: &str =
    "id, title, description, status, priority, project_id, parent_id, due_date, created_at, updated_at";

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

/// Parse a task row selected with `TASK_COLUMNS`.
pub fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    let status: String = row.get("status")?;
    let priority: String = row.get("priority")?;
    let due_date: Option<String> = row.get("due_date")?;

    let status = TaskStatus::parse(&status)
        .ok_or_else(|| conversion_error(3, format!("unknown status '{}'", status)))?;
    let priority = crate::types::Priority::parse(&priority)
        .ok_or_else(|| conversion_error(4, format!("unknown priority '{}'", priority)))?;
    let due_date = match due_date {
        Some(d) if !d.is_empty() => Some(
            NaiveDate::parse_from_str(&d, DATE_FORMAT)
                .map_err(|e| conversion_error(7, e.to_string()))?,
        ),
        _ => None,
    };

    Ok(Task {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status,
        priority,
        project_id: row.get("project_id")?,
        parent_id: row.get("parent_id")?,
        due_date,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        tags: Vec::new(),
        dependency_count: 0,
        uncompleted_dependency_count: 0,
        dependent_count: 0,
    })
}

fn format_due(due: Option<NaiveDate>) -> Option<String> {
    due.map(|d| d.format(DATE_FORMAT).to_string())
}

/// Insert a task row using an existing connection or transaction.
pub(crate) fn insert_task_internal(conn: &Connection, task: &Task) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO tasks ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            TASK_COLUMNS
        ),
        params![
            task.id,
            task.title,
            task.description,
            task.status.as_str(),
            task.priority.as_str(),
            task.project_id,
            task.parent_id,
            format_due(task.due_date),
            task.created_at,
            task.updated_at,
        ],
    )?;
    Ok(())
}

/// Insert or overwrite a task row, keeping its id.
pub(crate) fn upsert_task_internal(conn: &Connection, task: &Task) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO tasks ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                status = excluded.status,
                priority = excluded.priority,
                project_id = excluded.project_id,
                parent_id = excluded.parent_id,
                due_date = excluded.due_date,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at",
            TASK_COLUMNS
        ),
        params![
            task.id,
            task.title,
            task.description,
            task.status.as_str(),
            task.priority.as_str(),
            task.project_id,
            task.parent_id,
            format_due(task.due_date),
            task.created_at,
            task.updated_at,
        ],
    )?;
    Ok(())
}

fn update_task_internal(conn: &Connection, task: &Task, now: i64) -> Result<()> {
    conn.execute(
        "UPDATE tasks SET title = ?1, description = ?2, status = ?3, priority = ?4,
            project_id = ?5, parent_id = ?6, due_date = ?7, updated_at = ?8
         WHERE id = ?9",
        params![
            task.title,
            task.description,
            task.status.as_str(),
            task.priority.as_str(),
            task.project_id,
            task.parent_id,
            format_due(task.due_date),
            now,
            task.id,
        ],
    )?;
    Ok(())
}

fn move_tasks_internal(conn: &Connection, task_ids: &[String], project_id: Option<&str>, now: i64) -> Result<usize> {
    if task_ids.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "UPDATE tasks SET project_id = ?1, updated_at = ?2 WHERE id IN ({})",
        super::placeholders(task_ids.len(), 3)
    );
    let mut params_vec: Vec<&dyn ToSql> = vec![&project_id as &dyn ToSql, &now as &dyn ToSql];
    params_vec.extend(task_ids.iter().map(|id| id as &dyn ToSql));
    Ok(conn.execute(&sql, params_vec.as_slice())?)
}

/// Internal helper to get a task using an existing connection (avoids deadlock).
pub(crate) fn get_task_internal(conn: &Connection, task_id: &str) -> Result<Option<Task>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS))?;

    let result = stmt.query_row(params![task_id], parse_task_row);

    match result {
        Ok(task) => Ok(Some(task)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Fill tag names and dependency counters for a batch of tasks.
///
/// Uses one tag query and the three counter queries regardless of how many
/// tasks are passed in.
pub(crate) fn hydrate_tasks(conn: &Connection, tasks: &mut [Task]) -> Result<()> {
    if tasks.is_empty() {
        return Ok(());
    }
    let ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
    let tags = super::tags::tags_for_tasks_internal(conn, &ids)?;
    let counts = super::deps::load_dependency_counts(conn)?;

    for task in tasks.iter_mut() {
        task.tags = tags.get(&task.id).cloned().unwrap_or_default();
        counts.apply(task);
    }
    Ok(())
}

fn order_clause(sort: Option<SortKey>) -> &'static str {
    match sort {
        Some(SortKey::DueAsc) => "due_date IS NULL, due_date ASC, created_at DESC",
        Some(SortKey::DueDesc) => "due_date IS NULL, due_date DESC, created_at DESC",
        Some(SortKey::CreatedDesc) | None => "created_at DESC, id ASC",
    }
}

impl Database {
    /// Insert a fully-formed task row (no tags).
    pub fn insert_task(&self, task: &Task) -> Result<()> {
        self.with_conn(|conn| insert_task_internal(conn, task))
    }

    /// Insert a task and assign its tag set in a single transaction.
    pub fn create_task(&self, task: &Task, tag_names: &[String]) -> Result<Task> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            insert_task_internal(&tx, task)?;
            let tags = super::tags::resolve_or_create_tags_internal(&tx, tag_names)?;
            super::tags::set_task_tags_internal(&tx, &task.id, &tags)?;

            tx.commit()?;

            let mut created = task.clone();
            created.tags = tags.into_iter().map(|t| t.name).collect();
            Ok(created)
        })
    }

    /// Get a task by ID, with tags and dependency counters.
    pub fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        self.with_conn(|conn| {
            let Some(task) = get_task_internal(conn, task_id)? else {
                return Ok(None);
            };
            let mut tasks = [task];
            hydrate_tasks(conn, &mut tasks)?;
            let [task] = tasks;
            Ok(Some(task))
        })
    }

    /// Get several tasks by id, preserving the requested order and skipping
    /// ids that no longer exist.
    pub fn get_tasks(&self, ids: &[String]) -> Result<Vec<Task>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM tasks WHERE id IN ({})",
                TASK_COLUMNS,
                super::placeholders(ids.len(), 1)
            );
            let mut stmt = conn.prepare(&sql)?;
            let params_refs: Vec<&dyn ToSql> = ids.iter().map(|id| id as &dyn ToSql).collect();
            let mut found: Vec<Task> = stmt
                .query_map(params_refs.as_slice(), parse_task_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            hydrate_tasks(conn, &mut found)?;

            let mut ordered = Vec::with_capacity(found.len());
            for id in ids {
                if let Some(pos) = found.iter().position(|t| &t.id == id) {
                    ordered.push(found.swap_remove(pos));
                }
            }
            Ok(ordered)
        })
    }

    /// List tasks matching a filter, with tags and counters populated.
    pub fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let mut sql = format!("SELECT {} FROM tasks WHERE 1 = 1", TASK_COLUMNS);
            let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();

            if let Some(status) = filter.status {
                sql.push_str(" AND status = ?");
                params_vec.push(Box::new(status.as_str()));
            }
            if filter.exclude_completed {
                sql.push_str(" AND status != 'completed'");
            }
            if let Some(priority) = filter.priority {
                sql.push_str(" AND priority = ?");
                params_vec.push(Box::new(priority.as_str()));
            }
            if let Some(ref project_id) = filter.project_id {
                sql.push_str(" AND project_id = ?");
                params_vec.push(Box::new(project_id.clone()));
            }
            if let Some(ref parent_id) = filter.parent_id {
                sql.push_str(" AND parent_id = ?");
                params_vec.push(Box::new(parent_id.clone()));
            }
            if let Some(ref tag) = filter.tag {
                sql.push_str(
                    " AND id IN (SELECT tt.task_id FROM task_tags tt
                                 JOIN tags g ON g.id = tt.tag_id
                                 WHERE lower(g.name) = lower(?))",
                );
                params_vec.push(Box::new(tag.clone()));
            }
            if let Some(from) = filter.due_from {
                sql.push_str(" AND due_date IS NOT NULL AND due_date >= ?");
                params_vec.push(Box::new(from.format(DATE_FORMAT).to_string()));
            }
            if let Some(before) = filter.due_before {
                sql.push_str(" AND due_date IS NOT NULL AND due_date < ?");
                params_vec.push(Box::new(before.format(DATE_FORMAT).to_string()));
            }
            if let Some(from) = filter.created_from {
                sql.push_str(" AND created_at >= ?");
                params_vec.push(Box::new(from));
            }
            if let Some(before) = filter.created_before {
                sql.push_str(" AND created_at < ?");
                params_vec.push(Box::new(before));
            }

            sql.push_str(&format!(" ORDER BY {}", order_clause(filter.sort)));

            if let Some(limit) = filter.limit {
                sql.push_str(&format!(" LIMIT {}", limit));
            }

            let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();

            let mut stmt = conn.prepare(&sql)?;
            let mut tasks: Vec<Task> = stmt
                .query_map(params_refs.as_slice(), parse_task_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            hydrate_tasks(conn, &mut tasks)?;
            Ok(tasks)
        })
    }

    /// Persist an edited task in one transaction: its row, the descendants
    /// that follow it to `task.project_id`, and optionally a new tag set.
    pub fn commit_task_changes(&self, task: &Task, moved: &[String], tag_names: Option<&[String]>) -> Result<()> {
        let now = now_ms();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            update_task_internal(&tx, task, now)?;
            move_tasks_internal(&tx, moved, task.project_id.as_deref(), now)?;
            if let Some(names) = tag_names {
                let tags = super::tags::resolve_or_create_tags_internal(&tx, names)?;
                super::tags::set_task_tags_internal(&tx, &task.id, &tags)?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Set a task's status. Returns false if the task does not exist.
    pub fn update_task_status(&self, task_id: &str, status: TaskStatus) -> Result<bool> {
        let now = now_ms();
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), now, task_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Delete a single task row. Links, tags and watches cascade.
    pub fn delete_task(&self, task_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
            Ok(deleted > 0)
        })
    }

    /// Delete a task together with its whole subtree, deepest first.
    /// Returns the number of rows removed.
    pub fn delete_task_tree(&self, task_id: &str) -> Result<usize> {
        let mut ids: Vec<String> = self
            .descendants(task_id)?
            .into_iter()
            .rev()
            .map(|(t, _)| t.id)
            .collect();
        ids.push(task_id.to_string());

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut removed = 0;
            for id in &ids {
                removed += tx.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
            }
            tx.commit()?;
            Ok(removed)
        })
    }

    /// Case-insensitive substring search over title and description.
    pub fn search_tasks(&self, query: &str, limit: usize) -> Result<Vec<Task>> {
        let pattern = format!("%{}%", query.trim().to_lowercase());
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM tasks
                 WHERE lower(title) LIKE ?1 OR lower(description) LIKE ?1
                 ORDER BY created_at DESC LIMIT ?2",
                TASK_COLUMNS
            ))?;
            let mut tasks: Vec<Task> = stmt
                .query_map(params![pattern, limit as i64], parse_task_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            hydrate_tasks(conn, &mut tasks)?;
            Ok(tasks)
        })
    }

    /// Tasks whose id starts with `prefix`.
    pub fn find_tasks_by_id_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<Task>> {
        let pattern = format!("{}%", prefix.replace('%', "").replace('_', "\\_"));
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM tasks WHERE id LIKE ?1 ESCAPE '\\' ORDER BY id LIMIT ?2",
                TASK_COLUMNS
            ))?;
            let tasks = stmt
                .query_map(params![pattern, limit as i64], parse_task_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tasks)
        })
    }

    /// Most recently created tasks, newest first.
    pub fn recent_tasks(&self, limit: usize) -> Result<Vec<Task>> {
        self.list_tasks(&TaskFilter {
            sort: Some(SortKey::CreatedDesc),
            limit: Some(limit),
            ..Default::default()
        })
    }

    /// Number of tasks in the store.
    pub fn count_tasks(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    /// All bulk dependency counters.
    pub fn dependency_counts(&self) -> Result<DependencyCounts> {
        self.with_conn(super::deps::load_dependency_counts)
    }
}
