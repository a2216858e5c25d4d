//! Tag resolution and task-tag assignment.

use super::{Database, new_id};
use crate::types::Tag;
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, ToSql, params};
use std::collections::HashMap;

/// Trim, drop empties and dedupe a list of tag names, keeping first-seen order.
pub fn normalize_tag_names(names: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    for name in names {
        let trimmed = name.trim();
        if trimmed.is_empty() || seen.iter().any(|s: &String| s == trimmed) {
            continue;
        }
        seen.push(trimmed.to_string());
    }
    seen
}

pub(crate) fn resolve_or_create_tags_internal(conn: &Connection, names: &[String]) -> Result<Vec<Tag>> {
    let mut tags = Vec::new();
    for name in normalize_tag_names(names) {
        let existing: Option<String> = conn
            .query_row("SELECT id FROM tags WHERE name = ?1", params![name], |row| row.get(0))
            .optional()?;
        let id = match existing {
            Some(id) => id,
            None => {
                let id = new_id();
                conn.execute(
                    "INSERT INTO tags (id, name) VALUES (?1, ?2)",
                    params![id, name],
                )?;
                id
            }
        };
        tags.push(Tag { id, name });
    }
    Ok(tags)
}

pub(crate) fn set_task_tags_internal(conn: &Connection, task_id: &str, tags: &[Tag]) -> Result<()> {
    conn.execute("DELETE FROM task_tags WHERE task_id = ?1", params![task_id])?;
    for tag in tags {
        conn.execute(
            "INSERT OR IGNORE INTO task_tags (task_id, tag_id) VALUES (?1, ?2)",
            params![task_id, tag.id],
        )?;
    }
    Ok(())
}

/// Tag names per task for the given ids, sorted by name.
pub(crate) fn tags_for_tasks_internal(
    conn: &Connection,
    task_ids: &[String],
) -> Result<HashMap<String, Vec<String>>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    if task_ids.is_empty() {
        return Ok(map);
    }
    let sql = format!(
        "SELECT tt.task_id, g.name FROM task_tags tt
         JOIN tags g ON g.id = tt.tag_id
         WHERE tt.task_id IN ({})
         ORDER BY g.name",
        super::placeholders(task_ids.len(), 1)
    );
    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn ToSql> = task_ids.iter().map(|id| id as &dyn ToSql).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (task_id, name) = row?;
        map.entry(task_id).or_default().push(name);
    }
    Ok(map)
}

impl Database {
    /// Resolve tag names to tags, creating the missing ones.
    ///
    /// Names are trimmed; empty and duplicate names are dropped. Calling this
    /// twice with the same names returns the same tags.
    pub fn resolve_or_create_tags(&self, names: &[String]) -> Result<Vec<Tag>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let tags = resolve_or_create_tags_internal(&tx, names)?;
            tx.commit()?;
            Ok(tags)
        })
    }

    /// Replace a task's whole tag set in one transaction.
    pub fn set_task_tags(&self, task_id: &str, names: &[String]) -> Result<Vec<Tag>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let tags = resolve_or_create_tags_internal(&tx, names)?;
            set_task_tags_internal(&tx, task_id, &tags)?;
            tx.execute(
                "UPDATE tasks SET updated_at = ?1 WHERE id = ?2",
                params![super::now_ms(), task_id],
            )?;
            tx.commit()?;
            Ok(tags)
        })
    }

    /// Tags attached to a task.
    pub fn tags_for_task(&self, task_id: &str) -> Result<Vec<Tag>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT g.id, g.name FROM task_tags tt
                 JOIN tags g ON g.id = tt.tag_id
                 WHERE tt.task_id = ?1 ORDER BY g.name",
            )?;
            let tags = stmt
                .query_map(params![task_id], |row| {
                    Ok(Tag {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tags)
        })
    }

    /// Tag names for many tasks at once.
    pub fn tags_for_tasks(&self, task_ids: &[String]) -> Result<HashMap<String, Vec<String>>> {
        self.with_conn(|conn| tags_for_tasks_internal(conn, task_ids))
    }

    /// All tags, by name.
    pub fn list_tags(&self) -> Result<Vec<Tag>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name FROM tags ORDER BY name")?;
            let tags = stmt
                .query_map([], |row| {
                    Ok(Tag {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(tags)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_drops_empty_and_duplicates() {
        let names = vec![
            " bug ".to_string(),
            "".to_string(),
            "   ".to_string(),
            "bug".to_string(),
            "Bug".to_string(),
        ];
        assert_eq!(normalize_tag_names(&names), vec!["bug", "Bug"]);
    }
}
