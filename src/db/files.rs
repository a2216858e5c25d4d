//! Files associated with tasks.

use super::{Database, new_id, now_ms};
use crate::types::FileWatch;
use anyhow::Result;
use rusqlite::{OptionalExtension, params};

impl Database {
    /// Associate a file path with a task. Re-adding the same path returns
    /// the existing watch.
    pub fn add_file_watch(&self, task_id: &str, file_path: &str) -> Result<FileWatch> {
        let watch = FileWatch {
            id: new_id(),
            task_id: task_id.to_string(),
            file_path: file_path.to_string(),
            created_at: now_ms(),
        };
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO file_watches (id, task_id, file_path, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![watch.id, watch.task_id, watch.file_path, watch.created_at],
            )?;
            let stored = conn.query_row(
                "SELECT id, task_id, file_path, created_at FROM file_watches
                 WHERE task_id = ?1 AND file_path = ?2",
                params![task_id, file_path],
                |row| {
                    Ok(FileWatch {
                        id: row.get(0)?,
                        task_id: row.get(1)?,
                        file_path: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )?;
            Ok(stored)
        })
    }

    /// Watches, optionally for a single task.
    pub fn list_file_watches(&self, task_id: Option<&str>) -> Result<Vec<FileWatch>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, task_id, file_path, created_at FROM file_watches
                 WHERE ?1 IS NULL OR task_id = ?1
                 ORDER BY created_at, file_path",
            )?;
            let watches = stmt
                .query_map(params![task_id], |row| {
                    Ok(FileWatch {
                        id: row.get(0)?,
                        task_id: row.get(1)?,
                        file_path: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(watches)
        })
    }

    /// Remove a watch by task and path.
    pub fn remove_file_watch(&self, task_id: &str, file_path: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM file_watches WHERE task_id = ?1 AND file_path = ?2",
                params![task_id, file_path],
            )?;
            Ok(removed > 0)
        })
    }

    /// Task owning a watched path, if any.
    pub fn task_for_file(&self, file_path: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let id = conn
                .query_row(
                    "SELECT task_id FROM file_watches WHERE file_path = ?1 ORDER BY created_at LIMIT 1",
                    params![file_path],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(id)
        })
    }
}
