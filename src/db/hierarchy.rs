//! Parent/child hierarchy queries.

use super::Database;
use super::tasks::{TASK_COLUMNS, get_task_internal, hydrate_tasks, parse_task_row};
use crate::types::Task;
use anyhow::Result;
use rusqlite::{Connection, params};
use std::collections::{HashSet, VecDeque};

fn children_internal(conn: &Connection, parent_id: &str) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM tasks WHERE parent_id = ?1 ORDER BY created_at, id",
        TASK_COLUMNS
    ))?;
    let tasks = stmt
        .query_map(params![parent_id], parse_task_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

/// Breadth-first walk below `task_id`. Each entry carries its depth (1 = child).
pub(crate) fn descendants_internal(conn: &Connection, task_id: &str) -> Result<Vec<(Task, usize)>> {
    let mut result = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(task_id.to_string());

    let mut queue: VecDeque<(String, usize)> = VecDeque::new();
    queue.push_back((task_id.to_string(), 0));

    while let Some((current, depth)) = queue.pop_front() {
        for child in children_internal(conn, &current)? {
            if !visited.insert(child.id.clone()) {
                continue;
            }
            queue.push_back((child.id.clone(), depth + 1));
            result.push((child, depth + 1));
        }
    }

    Ok(result)
}

/// Walk parents upward. Direct parent first, root last.
pub(crate) fn ancestors_internal(conn: &Connection, task_id: &str) -> Result<Vec<Task>> {
    let mut result = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(task_id.to_string());

    let mut current = get_task_internal(conn, task_id)?.and_then(|t| t.parent_id);
    while let Some(parent_id) = current {
        if !visited.insert(parent_id.clone()) {
            break;
        }
        let Some(parent) = get_task_internal(conn, &parent_id)? else {
            break;
        };
        current = parent.parent_id.clone();
        result.push(parent);
    }

    Ok(result)
}

impl Database {
    /// Direct children of a task, oldest first.
    pub fn children(&self, parent_id: &str) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let mut tasks = children_internal(conn, parent_id)?;
            hydrate_tasks(conn, &mut tasks)?;
            Ok(tasks)
        })
    }

    /// All transitive descendants with their depth, breadth-first.
    pub fn descendants(&self, task_id: &str) -> Result<Vec<(Task, usize)>> {
        self.with_conn(|conn| descendants_internal(conn, task_id))
    }

    /// Ancestor chain, direct parent first.
    pub fn ancestors(&self, task_id: &str) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let mut tasks = ancestors_internal(conn, task_id)?;
            hydrate_tasks(conn, &mut tasks)?;
            Ok(tasks)
        })
    }

    /// Whether making `candidate_parent` the parent of `task_id` would
    /// close a loop in the hierarchy.
    pub fn would_create_parent_cycle(&self, task_id: &str, candidate_parent: &str) -> Result<bool> {
        if task_id == candidate_parent {
            return Ok(true);
        }
        self.with_conn(|conn| {
            let chain = ancestors_internal(conn, candidate_parent)?;
            Ok(chain.iter().any(|t| t.id == task_id))
        })
    }

    /// Re-parent a task. `None` makes it a root.
    pub fn set_parent(&self, task_id: &str, parent_id: Option<&str>) -> Result<bool> {
        let now = super::now_ms();
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE tasks SET parent_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![parent_id, now, task_id],
            )?;
            Ok(changed > 0)
        })
    }
}
