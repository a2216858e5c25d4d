//! Advanced search: substring matching over titles, descriptions, tags and
//! project names, topped up with Levenshtein fuzzy matches when the exact
//! pass finds too little. Every search is recorded in the history, and a
//! saved filter profile can supply the query and filters.

use super::tasks::TaskEngine;
use crate::error::ToolError;
use crate::types::{FilterProfile, Priority, SearchFilters, Task, TaskFilter, TaskStatus};
use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};

pub const DEFAULT_LIMIT: usize = 50;
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.6;

const TITLE_SCORE: f64 = 1.0;
const FIELD_SCORE: f64 = 0.8;
const HIGH_PRIORITY_BOOST: f64 = 1.2;
const IN_PROGRESS_BOOST: f64 = 1.3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSort {
    #[default]
    Relevance,
    Created,
    Updated,
    DueDate,
    Priority,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub filters: SearchFilters,
    /// Saved profile (id or name) whose query and filters apply first.
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default = "default_true")]
    pub use_fuzzy: bool,
    #[serde(default)]
    pub fuzzy_threshold: Option<f64>,
    #[serde(default)]
    pub include_completed: bool,
    #[serde(default)]
    pub sort_by: SearchSort,
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(default)]
    pub limit: Option<usize>,
}

fn default_true() -> bool {
    true
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            filters: SearchFilters::default(),
            profile: None,
            use_fuzzy: true,
            fuzzy_threshold: None,
            include_completed: false,
            sort_by: SearchSort::default(),
            sort_order: SortOrder::default(),
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Fuzzy,
    Filter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub task: Task,
    pub relevance: f64,
    pub match_type: MatchType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub total: usize,
    pub results: Vec<SearchHit>,
    pub used_fuzzy: bool,
    pub query_time_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

/// Edit distance between two strings, counted in chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// `1 - distance / longer length`, case-insensitive. Two empty strings are
/// identical.
pub fn fuzzy_similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / longest as f64
}

/// Best similarity of `query` against the whole field or any run of
/// words in it as long as the query.
fn field_similarity(query: &str, field: &str) -> f64 {
    let words: Vec<&str> = field.split_whitespace().collect();
    let width = query.split_whitespace().count().max(1);
    let mut best = fuzzy_similarity(query, field);
    if words.len() > width {
        for window in words.windows(width) {
            best = best.max(fuzzy_similarity(query, &window.join(" ")));
        }
    } else {
        for word in &words {
            best = best.max(fuzzy_similarity(query, word));
        }
    }
    best
}

fn boost(task: &Task, score: f64) -> f64 {
    let mut score = score;
    if task.priority == Priority::High {
        score *= HIGH_PRIORITY_BOOST;
    }
    if task.status == TaskStatus::InProgress {
        score *= IN_PROGRESS_BOOST;
    }
    score
}

fn created_date(ms: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.with_timezone(&Local).date_naive())
}

fn matches_filters(task: &Task, filters: &SearchFilters) -> bool {
    if !filters.status.is_empty() && !filters.status.contains(&task.status) {
        return false;
    }
    if !filters.priority.is_empty() && !filters.priority.contains(&task.priority) {
        return false;
    }
    if !filters.project_ids.is_empty()
        && !task.project_id.as_ref().is_some_and(|p| filters.project_ids.contains(p))
    {
        return false;
    }
    let has_tag = |wanted: &String| task.tags.iter().any(|t| t.eq_ignore_ascii_case(wanted.trim()));
    if !filters.tags.iter().all(has_tag) {
        return false;
    }
    if filters.due_after.is_some() || filters.due_before.is_some() {
        let Some(due) = task.due_date else {
            return false;
        };
        if filters.due_after.is_some_and(|d| due < d) || filters.due_before.is_some_and(|d| due > d) {
            return false;
        }
    }
    if filters.created_after.is_some() || filters.created_before.is_some() {
        let Some(created) = created_date(task.created_at) else {
            return false;
        };
        if filters.created_after.is_some_and(|d| created < d)
            || filters.created_before.is_some_and(|d| created > d)
        {
            return false;
        }
    }
    true
}

fn compare(a: &SearchHit, b: &SearchHit, sort: SearchSort) -> Ordering {
    match sort {
        SearchSort::Relevance => a.relevance.partial_cmp(&b.relevance).unwrap_or(Ordering::Equal),
        SearchSort::Created => a.task.created_at.cmp(&b.task.created_at),
        SearchSort::Updated => a.task.updated_at.cmp(&b.task.updated_at),
        SearchSort::DueDate => match (a.task.due_date, b.task.due_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        SearchSort::Priority => a.task.priority.rank().cmp(&b.task.priority.rank()),
    }
}

#[derive(Clone)]
pub struct SearchEngine {
    tasks: TaskEngine,
}

impl SearchEngine {
    pub fn new(tasks: TaskEngine) -> Self {
        Self { tasks }
    }

    pub fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let started = Instant::now();
        let db = self.tasks.db();

        let mut query = request.query.trim().to_string();
        let mut filters = SearchFilters::default();
        let mut profile_name = None;
        if let Some(reference) = request.profile.as_deref().filter(|p| !p.trim().is_empty()) {
            let profile = self.profile(reference)?;
            if query.is_empty() {
                query = profile.search_query.trim().to_string();
            }
            filters = profile.filters;
            db.mark_filter_profile_used(&profile.id)?;
            profile_name = Some(profile.name);
        }
        filters.merge(request.filters);

        let candidates: Vec<Task> = db
            .list_tasks(&TaskFilter {
                exclude_completed: !request.include_completed && !filters.status.contains(&TaskStatus::Completed),
                ..Default::default()
            })?
            .into_iter()
            .filter(|t| matches_filters(t, &filters))
            .collect();
        let limit = request.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIMIT);

        let mut used_fuzzy = false;
        let mut hits: Vec<SearchHit> = if query.is_empty() {
            candidates
                .into_iter()
                .map(|task| SearchHit {
                    task,
                    relevance: 1.0,
                    match_type: MatchType::Filter,
                    matched_fields: Vec::new(),
                })
                .collect()
        } else {
            let projects: HashMap<String, String> =
                db.list_projects()?.into_iter().map(|p| (p.id, p.name)).collect();
            let mut hits = Vec::new();
            let mut misses = Vec::new();
            for task in candidates {
                match exact_match(&task, &query, &projects) {
                    Some((score, fields)) => hits.push(SearchHit {
                        relevance: boost(&task, score),
                        task,
                        match_type: MatchType::Exact,
                        matched_fields: fields,
                    }),
                    None => misses.push(task),
                }
            }
            if request.use_fuzzy && hits.len() < limit.div_ceil(2) {
                let threshold = request.fuzzy_threshold.unwrap_or(DEFAULT_FUZZY_THRESHOLD);
                for task in misses {
                    if let Some((score, fields)) = fuzzy_match(&task, &query, &projects, threshold) {
                        used_fuzzy = true;
                        hits.push(SearchHit {
                            relevance: boost(&task, score),
                            task,
                            match_type: MatchType::Fuzzy,
                            matched_fields: fields,
                        });
                    }
                }
            }
            hits
        };

        hits.sort_by(|a, b| {
            let ord = compare(a, b, request.sort_by);
            match request.sort_order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
        let total = hits.len();
        hits.truncate(limit);

        let query_time_ms = started.elapsed().as_millis() as i64;
        if let Err(e) = db.record_search(&query, &filters, total, query_time_ms) {
            warn!(error = %e, "search history not recorded");
        }
        debug!(query = %query, total, used_fuzzy, "search finished");

        Ok(SearchResponse {
            query,
            total,
            results: hits,
            used_fuzzy,
            query_time_ms,
            profile: profile_name,
        })
    }

    /// A saved profile by id or name.
    pub fn profile(&self, id_or_name: &str) -> Result<FilterProfile> {
        self.tasks
            .db()
            .get_filter_profile(id_or_name.trim())?
            .ok_or_else(|| ToolError::profile_not_found(id_or_name).into())
    }

    pub fn save_profile(
        &self,
        name: &str,
        description: &str,
        filters: &SearchFilters,
        search_query: &str,
        is_default: bool,
    ) -> Result<FilterProfile> {
        if name.trim().is_empty() {
            return Err(ToolError::missing_field("name").into());
        }
        self.tasks
            .db()
            .create_filter_profile(name, description, filters, search_query, is_default)
    }
}

fn searchable_fields<'a>(task: &'a Task, projects: &'a HashMap<String, String>) -> Vec<(&'static str, &'a str)> {
    let mut fields = vec![("title", task.title.as_str()), ("description", task.description.as_str())];
    fields.extend(task.tags.iter().map(|t| ("tags", t.as_str())));
    if let Some(name) = task.project_id.as_ref().and_then(|p| projects.get(p)) {
        fields.push(("project", name.as_str()));
    }
    fields
}

fn push_field(fields: &mut Vec<String>, name: &str) {
    if !fields.iter().any(|f| f == name) {
        fields.push(name.to_string());
    }
}

fn exact_match(task: &Task, query: &str, projects: &HashMap<String, String>) -> Option<(f64, Vec<String>)> {
    let needle = query.to_lowercase();
    let mut best: Option<f64> = None;
    let mut fields = Vec::new();
    for (name, value) in searchable_fields(task, projects) {
        if value.to_lowercase().contains(&needle) {
            let score = if name == "title" { TITLE_SCORE } else { FIELD_SCORE };
            best = Some(best.map_or(score, |b: f64| b.max(score)));
            push_field(&mut fields, name);
        }
    }
    best.map(|score| (score, fields))
}

fn fuzzy_match(
    task: &Task,
    query: &str,
    projects: &HashMap<String, String>,
    threshold: f64,
) -> Option<(f64, Vec<String>)> {
    let mut best = 0.0_f64;
    let mut fields = Vec::new();
    for (name, value) in searchable_fields(task, projects) {
        let score = field_similarity(query, value);
        if score >= threshold {
            push_field(&mut fields, name);
        }
        best = best.max(score);
    }
    (best >= threshold).then_some((best, fields))
}
