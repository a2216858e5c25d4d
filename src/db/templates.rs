//! Template storage.

use super::Database;
use crate::types::{Template, TemplateField};
use anyhow::Result;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

const TEMPLATE_COLUMNS: &str = "id, name, alias, category, description, title_pattern, body_pattern, \
     fields, active, language_code, base_template_id, created_at";

fn parse_template_row(row: &Row) -> rusqlite::Result<Template> {
    let fields_json: String = row.get(7)?;
    let fields: Vec<TemplateField> = serde_json::from_str(&fields_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;
    Ok(Template {
        id: row.get(0)?,
        name: row.get(1)?,
        alias: row.get(2)?,
        category: row.get(3)?,
        description: row.get(4)?,
        title_pattern: row.get(5)?,
        body_pattern: row.get(6)?,
        fields,
        active: row.get::<_, i64>(8)? != 0,
        language_code: row.get(9)?,
        base_template_id: row.get(10)?,
        created_at: row.get(11)?,
    })
}

pub(crate) fn save_template_internal(conn: &Connection, template: &Template) -> Result<()> {
    let fields = serde_json::to_string(&template.fields)?;
    conn.execute(
        &format!(
            "INSERT INTO templates ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                alias = excluded.alias,
                category = excluded.category,
                description = excluded.description,
                title_pattern = excluded.title_pattern,
                body_pattern = excluded.body_pattern,
                fields = excluded.fields,
                active = excluded.active,
                language_code = excluded.language_code,
                base_template_id = excluded.base_template_id",
            TEMPLATE_COLUMNS
        ),
        params![
            template.id,
            template.name,
            template.alias,
            template.category,
            template.description,
            template.title_pattern,
            template.body_pattern,
            fields,
            template.active as i64,
            template.language_code,
            template.base_template_id,
            template.created_at,
        ],
    )?;
    Ok(())
}

fn get_template_internal(conn: &Connection, template_id: &str) -> Result<Option<Template>> {
    let template = conn
        .query_row(
            &format!("SELECT {} FROM templates WHERE id = ?1", TEMPLATE_COLUMNS),
            params![template_id],
            parse_template_row,
        )
        .optional()?;
    Ok(template)
}

impl Database {
    /// Insert or update a template by id.
    pub fn save_template(&self, template: &Template) -> Result<()> {
        self.with_conn(|conn| save_template_internal(conn, template))
    }

    /// Templates, optionally restricted to one category. Inactive ones are
    /// included only when `include_inactive` is set.
    pub fn list_templates(&self, category: Option<&str>, include_inactive: bool) -> Result<Vec<Template>> {
        self.with_conn(|conn| {
            let mut sql = format!("SELECT {} FROM templates WHERE 1 = 1", TEMPLATE_COLUMNS);
            if !include_inactive {
                sql.push_str(" AND active = 1");
            }
            if category.is_some() {
                sql.push_str(" AND category = ?1");
            }
            sql.push_str(" ORDER BY category, name, language_code");

            let mut stmt = conn.prepare(&sql)?;
            let templates = match category {
                Some(category) => stmt
                    .query_map(params![category], parse_template_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?,
                None => stmt
                    .query_map([], parse_template_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?,
            };
            Ok(templates)
        })
    }

    pub fn get_template(&self, template_id: &str) -> Result<Option<Template>> {
        self.with_conn(|conn| get_template_internal(conn, template_id))
    }

    /// Template by alias in a given language.
    pub fn get_template_by_alias(&self, alias: &str, language: &str) -> Result<Option<Template>> {
        self.with_conn(|conn| {
            let template = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM templates WHERE alias = ?1 AND language_code = ?2",
                        TEMPLATE_COLUMNS
                    ),
                    params![alias, language],
                    parse_template_row,
                )
                .optional()?;
            Ok(template)
        })
    }

    /// Resolve an id or alias: id first, then alias in `language`, then the
    /// alias in any language (English preferred).
    pub fn find_template(&self, id_or_alias: &str, language: &str) -> Result<Option<Template>> {
        if let Some(template) = self.get_template(id_or_alias)? {
            return Ok(Some(template));
        }
        if let Some(template) = self.get_template_by_alias(id_or_alias, language)? {
            return Ok(Some(template));
        }
        self.with_conn(|conn| {
            let template = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM templates WHERE alias = ?1
                         ORDER BY language_code != 'en', language_code LIMIT 1",
                        TEMPLATE_COLUMNS
                    ),
                    params![id_or_alias],
                    parse_template_row,
                )
                .optional()?;
            Ok(template)
        })
    }

    /// Toggle a template's active flag. Returns false if it does not exist.
    pub fn set_template_active(&self, template_id: &str, active: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE templates SET active = ?1 WHERE id = ?2",
                params![active as i64, template_id],
            )?;
            Ok(changed > 0)
        })
    }
}
