//! AI interaction log and the single-row session context.

use super::{Database, new_id, now_ms};
use crate::types::{AiContext, AiInteraction};
use anyhow::Result;
use rusqlite::types::Type;
use rusqlite::{Connection, Row, ToSql, params};
use serde_json::Value;

fn json_error(idx: usize, err: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_interaction_row(row: &Row) -> rusqlite::Result<AiInteraction> {
    let context: String = row.get(3)?;
    Ok(AiInteraction {
        id: row.get(0)?,
        task_id: row.get(1)?,
        action: row.get(2)?,
        context: serde_json::from_str(&context).map_err(|e| json_error(3, e))?,
        timestamp: row.get(4)?,
    })
}

pub(crate) fn insert_interaction_internal(conn: &Connection, interaction: &AiInteraction) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO ai_interactions (id, task_id, action, context, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            interaction.id,
            interaction.task_id,
            interaction.action,
            serde_json::to_string(&interaction.context)?,
            interaction.timestamp
        ],
    )?;
    Ok(())
}

fn query_interactions(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<AiInteraction>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, parse_interaction_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

const INTERACTION_SELECT: &str = "SELECT id, task_id, action, context, timestamp FROM ai_interactions";

impl Database {
    /// Load the session context, or the empty default if none was saved.
    pub fn load_ai_context(&self) -> Result<AiContext> {
        self.with_conn(|conn| {
            let row = conn.query_row(
                "SELECT active_task_id, recent_tasks, session_data, last_updated
                 FROM ai_context WHERE id = 1",
                [],
                |row| {
                    let recent: String = row.get(1)?;
                    let session: String = row.get(2)?;
                    Ok(AiContext {
                        active_task_id: row.get(0)?,
                        recent_tasks: serde_json::from_str(&recent).map_err(|e| json_error(1, e))?,
                        session_data: serde_json::from_str(&session).map_err(|e| json_error(2, e))?,
                        last_updated: row.get(3)?,
                    })
                },
            );
            match row {
                Ok(ctx) => Ok(ctx),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(AiContext::default()),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Persist the session context, stamping `last_updated`.
    pub fn save_ai_context(&self, ctx: &AiContext) -> Result<AiContext> {
        let now = now_ms();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO ai_context (id, active_task_id, recent_tasks, session_data, last_updated)
                 VALUES (1, ?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    active_task_id = excluded.active_task_id,
                    recent_tasks = excluded.recent_tasks,
                    session_data = excluded.session_data,
                    last_updated = excluded.last_updated",
                params![
                    ctx.active_task_id,
                    serde_json::to_string(&ctx.recent_tasks)?,
                    serde_json::to_string(&ctx.session_data)?,
                    now
                ],
            )?;
            let mut saved = ctx.clone();
            saved.last_updated = now;
            Ok(saved)
        })
    }

    /// Append an interaction to the log.
    pub fn record_interaction(&self, task_id: &str, action: &str, context: Value) -> Result<AiInteraction> {
        let interaction = AiInteraction {
            id: new_id(),
            task_id: task_id.to_string(),
            action: action.to_string(),
            context,
            timestamp: now_ms(),
        };
        self.with_conn(|conn| insert_interaction_internal(conn, &interaction))?;
        Ok(interaction)
    }

    /// The newest `limit` interactions, newest first.
    pub fn last_interactions(&self, limit: usize) -> Result<Vec<AiInteraction>> {
        self.with_conn(|conn| {
            query_interactions(
                conn,
                &format!("{} ORDER BY timestamp DESC, rowid DESC LIMIT ?1", INTERACTION_SELECT),
                &[&(limit as i64)],
            )
        })
    }

    /// Interactions at or after `since_ms`, oldest first.
    pub fn interactions_since(&self, since_ms: i64) -> Result<Vec<AiInteraction>> {
        self.with_conn(|conn| {
            query_interactions(
                conn,
                &format!("{} WHERE timestamp >= ?1 ORDER BY timestamp, rowid", INTERACTION_SELECT),
                &[&since_ms],
            )
        })
    }

    /// Interactions recorded since local midnight.
    pub fn todays_interactions(&self) -> Result<Vec<AiInteraction>> {
        let midnight = chrono::Local::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .and_then(|dt| dt.and_local_timezone(chrono::Local).earliest())
            .map(|dt| dt.timestamp_millis())
            .unwrap_or(0);
        self.interactions_since(midnight)
    }

    /// Interactions of the given tasks, oldest first.
    pub fn interactions_for_tasks(&self, task_ids: &[String]) -> Result<Vec<AiInteraction>> {
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE task_id IN ({}) ORDER BY timestamp, rowid",
                INTERACTION_SELECT,
                super::placeholders(task_ids.len(), 1)
            );
            let params_refs: Vec<&dyn ToSql> = task_ids.iter().map(|id| id as &dyn ToSql).collect();
            query_interactions(conn, &sql, &params_refs)
        })
    }

    /// Every interaction, oldest first.
    pub fn all_interactions(&self) -> Result<Vec<AiInteraction>> {
        self.with_conn(|conn| {
            query_interactions(conn, &format!("{} ORDER BY timestamp, rowid", INTERACTION_SELECT), &[])
        })
    }

    /// Stamp the last user interaction time on the context row.
    pub fn touch_last_interaction(&self) -> Result<i64> {
        let now = now_ms();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO ai_context (id, last_updated, last_interaction) VALUES (1, ?1, ?1)
                 ON CONFLICT(id) DO UPDATE SET last_interaction = excluded.last_interaction",
                params![now],
            )?;
            Ok(now)
        })
    }

    /// Last interaction stamp, if any.
    pub fn last_interaction_at(&self) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let stamp = conn.query_row(
                "SELECT last_interaction FROM ai_context WHERE id = 1",
                [],
                |row| row.get::<_, Option<i64>>(0),
            );
            match stamp {
                Ok(stamp) => Ok(stamp),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }
}
