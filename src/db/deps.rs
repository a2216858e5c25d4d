//! Dependency links, bulk counters and cycle detection.

use super::{Database, new_id, now_ms};
use crate::types::{DEP_PRECEDES, Dependency, DependencyCounts, Task};
use anyhow::Result;
use rusqlite::{Connection, params};
use std::collections::{HashMap, HashSet, VecDeque};

fn parse_dependency_row(row: &rusqlite::Row) -> rusqlite::Result<Dependency> {
    Ok(Dependency {
        id: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        kind: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn count_map(conn: &Connection, sql: &str) -> Result<HashMap<String, i64>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
    let mut map = HashMap::new();
    for row in rows {
        let (id, count) = row?;
        map.insert(id, count);
    }
    Ok(map)
}

/// Run the three counter queries. Each is a single round-trip.
pub(crate) fn load_dependency_counts(conn: &Connection) -> Result<DependencyCounts> {
    let dependencies = count_map(
        conn,
        "SELECT target_id, COUNT(*) FROM dependencies GROUP BY target_id",
    )?;
    let uncompleted = count_map(
        conn,
        "SELECT d.target_id, COUNT(*) FROM dependencies d
         JOIN tasks s ON s.id = d.source_id
         WHERE d.kind = 'precedes' AND s.status != 'completed'
         GROUP BY d.target_id",
    )?;
    let dependents = count_map(
        conn,
        "SELECT source_id, COUNT(*) FROM dependencies GROUP BY source_id",
    )?;
    Ok(DependencyCounts {
        dependencies,
        uncompleted,
        dependents,
    })
}

pub(crate) fn insert_dependency_internal(conn: &Connection, dep: &Dependency) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO dependencies (id, source_id, target_id, kind, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![dep.id, dep.source_id, dep.target_id, dep.kind, dep.created_at],
    )?;
    Ok(inserted > 0)
}

impl Database {
    /// Record a link `source -> target` of the given kind.
    /// Adding an existing link is a no-op that returns the stored link.
    pub fn add_dependency(&self, source_id: &str, target_id: &str, kind: &str) -> Result<Dependency> {
        let dep = Dependency {
            id: new_id(),
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            kind: kind.to_string(),
            created_at: now_ms(),
        };
        self.with_conn(|conn| {
            if insert_dependency_internal(conn, &dep)? {
                return Ok(dep);
            }
            let existing = conn.query_row(
                "SELECT id, source_id, target_id, kind, created_at FROM dependencies
                 WHERE source_id = ?1 AND target_id = ?2 AND kind = ?3",
                params![source_id, target_id, kind],
                parse_dependency_row,
            )?;
            Ok(existing)
        })
    }

    /// Remove a link. Returns false if it did not exist.
    pub fn remove_dependency(&self, source_id: &str, target_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM dependencies WHERE source_id = ?1 AND target_id = ?2",
                params![source_id, target_id],
            )?;
            Ok(removed > 0)
        })
    }

    /// Links touching a task on either endpoint.
    pub fn dependencies_for_task(&self, task_id: &str) -> Result<Vec<Dependency>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, source_id, target_id, kind, created_at FROM dependencies
                 WHERE source_id = ?1 OR target_id = ?1
                 ORDER BY created_at, id",
            )?;
            let deps = stmt
                .query_map(params![task_id], parse_dependency_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(deps)
        })
    }

    /// All links.
    pub fn all_dependencies(&self) -> Result<Vec<Dependency>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, source_id, target_id, kind, created_at FROM dependencies
                 ORDER BY created_at, id",
            )?;
            let deps = stmt
                .query_map([], parse_dependency_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(deps)
        })
    }

    /// `precedes` predecessors of a task that are not completed.
    pub fn incomplete_predecessors(&self, task_id: &str) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM tasks WHERE status != 'completed' AND id IN (
                    SELECT source_id FROM dependencies WHERE target_id = ?1 AND kind = ?2
                 ) ORDER BY created_at",
                super::tasks::TASK_COLUMNS
            ))?;
            let tasks = stmt
                .query_map(params![task_id, DEP_PRECEDES], super::tasks::parse_task_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tasks)
        })
    }

    /// Pending tasks that still wait on an unfinished predecessor.
    pub fn blocked_tasks(&self, limit: usize) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM tasks t WHERE t.status = 'pending' AND EXISTS (
                    SELECT 1 FROM dependencies d JOIN tasks s ON s.id = d.source_id
                    WHERE d.target_id = t.id AND d.kind = 'precedes' AND s.status != 'completed'
                 ) ORDER BY t.created_at LIMIT ?1",
                super::tasks::TASK_COLUMNS
            ))?;
            let mut tasks: Vec<Task> = stmt
                .query_map(params![limit as i64], super::tasks::parse_task_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            super::tasks::hydrate_tasks(conn, &mut tasks)?;
            Ok(tasks)
        })
    }

    /// Check if adding `source precedes target` would close a cycle of
    /// `precedes` links.
    pub fn precedes_would_cycle(&self, source_id: &str, target_id: &str) -> Result<bool> {
        if source_id == target_id {
            return Ok(true);
        }
        // A cycle would occur if target can already reach source.
        self.with_conn(|conn| {
            let mut visited: HashSet<String> = HashSet::new();
            let mut queue: VecDeque<String> = VecDeque::new();
            queue.push_back(target_id.to_string());

            let mut stmt = conn.prepare(
                "SELECT target_id FROM dependencies WHERE source_id = ?1 AND kind = 'precedes'",
            )?;

            while let Some(current) = queue.pop_front() {
                if current == source_id {
                    return Ok(true);
                }
                if !visited.insert(current.clone()) {
                    continue;
                }
                let next: Vec<String> = stmt
                    .query_map(params![&current], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                for id in next {
                    if !visited.contains(&id) {
                        queue.push_back(id);
                    }
                }
            }

            Ok(false)
        })
    }
}
