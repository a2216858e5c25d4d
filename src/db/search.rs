//! Search history and saved filter profiles.

use super::{Database, new_id, now_ms};
use crate::error::ToolError;
use crate::types::{FilterProfile, SearchFilters, SearchHistoryEntry};
use anyhow::Result;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

const PROFILE_COLUMNS: &str = "id, name, description, filters, search_query, is_default, use_count, \
     last_used_at, created_at, updated_at";

fn parse_filters(row: &Row, idx: usize) -> rusqlite::Result<SearchFilters> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_profile_row(row: &Row) -> rusqlite::Result<FilterProfile> {
    Ok(FilterProfile {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        filters: parse_filters(row, 3)?,
        search_query: row.get(4)?,
        is_default: row.get::<_, i64>(5)? != 0,
        use_count: row.get(6)?,
        last_used_at: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn get_profile_internal(conn: &Connection, id_or_name: &str) -> Result<Option<FilterProfile>> {
    let profile = conn
        .query_row(
            &format!(
                "SELECT {} FROM filter_profiles WHERE id = ?1 OR name = ?1 ORDER BY id = ?1 DESC LIMIT 1",
                PROFILE_COLUMNS
            ),
            params![id_or_name],
            parse_profile_row,
        )
        .optional()?;
    Ok(profile)
}

impl Database {
    /// Append a search to the history and return its row id.
    pub fn record_search(
        &self,
        query: &str,
        filters: &SearchFilters,
        result_count: usize,
        execution_time_ms: i64,
    ) -> Result<i64> {
        let filters = serde_json::to_string(filters)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO search_history (query, filters, result_count, execution_time_ms, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![query, filters, result_count as i64, execution_time_ms, now_ms()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Most recent searches first.
    pub fn search_history(&self, limit: usize) -> Result<Vec<SearchHistoryEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, query, filters, result_count, execution_time_ms, created_at
                 FROM search_history ORDER BY created_at DESC, id DESC LIMIT ?1",
            )?;
            let entries = stmt
                .query_map(params![limit as i64], |row| {
                    Ok(SearchHistoryEntry {
                        id: row.get(0)?,
                        query: row.get(1)?,
                        filters: parse_filters(row, 2)?,
                        result_count: row.get(3)?,
                        execution_time_ms: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
    }

    /// Drop history entries recorded before `before_ms`. Returns how many
    /// were removed.
    pub fn clean_search_history(&self, before_ms: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM search_history WHERE created_at < ?1", params![before_ms])?;
            Ok(removed)
        })
    }

    /// Save a new profile. Names are unique; making a profile the default
    /// clears the flag on every other one.
    pub fn create_filter_profile(
        &self,
        name: &str,
        description: &str,
        filters: &SearchFilters,
        search_query: &str,
        is_default: bool,
    ) -> Result<FilterProfile> {
        let now = now_ms();
        let profile = FilterProfile {
            id: new_id(),
            name: name.trim().to_string(),
            description: description.to_string(),
            filters: filters.clone(),
            search_query: search_query.to_string(),
            is_default,
            use_count: 0,
            last_used_at: None,
            created_at: now,
            updated_at: now,
        };
        let filters_json = serde_json::to_string(&profile.filters)?;
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM filter_profiles WHERE name = ?1)",
                params![profile.name],
                |row| row.get(0),
            )?;
            if taken {
                return Err(ToolError::invalid_value("name", &format!("profile '{}' already exists", profile.name)).into());
            }
            if profile.is_default {
                tx.execute("UPDATE filter_profiles SET is_default = 0 WHERE is_default = 1", [])?;
            }
            tx.execute(
                &format!(
                    "INSERT INTO filter_profiles ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    PROFILE_COLUMNS
                ),
                params![
                    profile.id,
                    profile.name,
                    profile.description,
                    filters_json,
                    profile.search_query,
                    profile.is_default as i64,
                    profile.use_count,
                    profile.last_used_at,
                    profile.created_at,
                    profile.updated_at,
                ],
            )?;
            tx.commit()?;
            Ok(())
        })?;
        Ok(profile)
    }

    /// Look a profile up by id, then by name.
    pub fn get_filter_profile(&self, id_or_name: &str) -> Result<Option<FilterProfile>> {
        self.with_conn(|conn| get_profile_internal(conn, id_or_name))
    }

    /// Default profile first, then the most used.
    pub fn list_filter_profiles(&self, defaults_only: bool) -> Result<Vec<FilterProfile>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM filter_profiles WHERE ?1 = 0 OR is_default = 1
                 ORDER BY is_default DESC, use_count DESC, name",
                PROFILE_COLUMNS
            ))?;
            let profiles = stmt
                .query_map(params![defaults_only as i64], parse_profile_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(profiles)
        })
    }

    pub fn delete_filter_profile(&self, id_or_name: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM filter_profiles WHERE id = ?1 OR name = ?1",
                params![id_or_name],
            )?;
            Ok(removed > 0)
        })
    }

    /// Bump the use counter and last-used time.
    pub fn mark_filter_profile_used(&self, profile_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE filter_profiles SET use_count = use_count + 1, last_used_at = ?2 WHERE id = ?1",
                params![profile_id, now_ms()],
            )?;
            Ok(())
        })
    }
}
