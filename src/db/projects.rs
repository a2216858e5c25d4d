//! Project storage and the active-project pointer.

use super::tasks::{TASK_COLUMNS, hydrate_tasks, parse_task_row};
use super::{Database, new_id, now_ms};
use crate::types::{Project, Task};
use anyhow::Result;
use rusqlite::{Connection, Row, params};

const PROJECT_SELECT: &str = "SELECT p.id, p.name, p.description, p.created_at, p.updated_at,
        (SELECT COUNT(*) FROM tasks t WHERE t.project_id = p.id) AS task_count
     FROM projects p";

fn parse_project_row(row: &Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        task_count: row.get(5)?,
    })
}

pub(crate) fn get_project_internal(conn: &Connection, project_id: &str) -> Result<Option<Project>> {
    let result = conn.query_row(
        &format!("{} WHERE p.id = ?1", PROJECT_SELECT),
        params![project_id],
        parse_project_row,
    );
    match result {
        Ok(project) => Ok(Some(project)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn upsert_project_internal(conn: &Connection, project: &Project) -> Result<()> {
    conn.execute(
        "INSERT INTO projects (id, name, description, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            description = excluded.description,
            updated_at = excluded.updated_at",
        params![
            project.id,
            project.name,
            project.description,
            project.created_at,
            project.updated_at
        ],
    )?;
    Ok(())
}

impl Database {
    /// Create a project with a fresh id.
    pub fn create_project(&self, name: &str, description: &str) -> Result<Project> {
        let now = now_ms();
        let project = Project {
            id: new_id(),
            name: name.trim().to_string(),
            description: description.to_string(),
            created_at: now,
            updated_at: now,
            task_count: 0,
        };
        self.insert_project(&project)?;
        Ok(project)
    }

    /// Insert or overwrite a project row as given.
    pub fn insert_project(&self, project: &Project) -> Result<()> {
        self.with_conn(|conn| upsert_project_internal(conn, project))
    }

    pub fn get_project(&self, project_id: &str) -> Result<Option<Project>> {
        self.with_conn(|conn| get_project_internal(conn, project_id))
    }

    /// All projects with their task counts, in one query.
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{} ORDER BY p.name, p.created_at", PROJECT_SELECT))?;
            let projects = stmt
                .query_map([], parse_project_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(projects)
        })
    }

    /// Tasks of a project, newest first.
    pub fn project_tasks(&self, project_id: &str) -> Result<Vec<Task>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM tasks WHERE project_id = ?1 ORDER BY created_at DESC",
                TASK_COLUMNS
            ))?;
            let mut tasks: Vec<Task> = stmt
                .query_map(params![project_id], parse_task_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            hydrate_tasks(conn, &mut tasks)?;
            Ok(tasks)
        })
    }

    /// Delete a project. Its tasks keep existing with no project.
    pub fn delete_project(&self, project_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM projects WHERE id = ?1", params![project_id])?;
            Ok(deleted > 0)
        })
    }

    pub fn count_projects(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    pub fn set_active_project(&self, project_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO active_project (id, project_id) VALUES (1, ?1)
                 ON CONFLICT(id) DO UPDATE SET project_id = excluded.project_id",
                params![project_id],
            )?;
            Ok(())
        })
    }

    /// The active project, if one is set and still exists.
    pub fn active_project(&self) -> Result<Option<Project>> {
        self.with_conn(|conn| {
            let id = conn.query_row("SELECT project_id FROM active_project WHERE id = 1", [], |row| {
                row.get::<_, String>(0)
            });
            match id {
                Ok(id) => get_project_internal(conn, &id),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn clear_active_project(&self) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM active_project", [])?;
            Ok(removed > 0)
        })
    }
}
