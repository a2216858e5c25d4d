//! Pattern-based intent parsing for short Turkish or English task commands.
//!
//! Nothing here is probabilistic: each matched pattern class adds a fixed
//! amount to the confidence score, which is capped at 1.0.

use crate::error::ToolError;
use chrono::{DateTime, Datelike, Days, Local, NaiveDate, TimeZone};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Intents scoring below this are rejected.
pub const MIN_CONFIDENCE: f64 = 0.3;

const ACTION_WEIGHT: f64 = 0.4;
const TIME_WEIGHT: f64 = 0.3;
const FILTER_WEIGHT: f64 = 0.3;
const REFERENCE_WEIGHT: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NlpAction {
    List,
    Create,
    Update,
    Complete,
    Delete,
    Search,
    Status,
}

impl NlpAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            NlpAction::List => "list",
            NlpAction::Create => "create",
            NlpAction::Update => "update",
            NlpAction::Complete => "complete",
            NlpAction::Delete => "delete",
            NlpAction::Search => "search",
            NlpAction::Status => "status",
        }
    }

    pub fn needs_reference(&self) -> bool {
        matches!(self, NlpAction::Update | NlpAction::Complete | NlpAction::Delete)
    }
}

// Checked in order. Explicit list phrases come before the verbs so that
// "list tasks" is not read as anything else; the bare nouns come last.
const ACTION_TABLE: &[(NlpAction, &[&str])] = &[
    (
        NlpAction::List,
        &["görevleri göster", "listele", "neler var", "ne var", "show tasks", "list tasks", "what tasks"],
    ),
    (
        NlpAction::Create,
        &[
            "görev oluştur", "yeni görev", "ekle", "oluştur", "yap",
            "create task", "new task", "add task", "make task", "create",
        ],
    ),
    (
        NlpAction::Update,
        &["güncelle", "değiştir", "düzenle", "revize et", "update", "modify", "edit", "change"],
    ),
    (
        NlpAction::Complete,
        &["tamamla", "bitir", "kapat", "hallettim", "bitti", "complete", "finish", "close", "done"],
    ),
    (
        NlpAction::Delete,
        &["sil", "kaldır", "iptal et", "delete", "remove", "cancel"],
    ),
    (
        NlpAction::Search,
        &["araştır", "ara", "bul", "search", "find", "look for"],
    ),
    (
        NlpAction::Status,
        &["ne durumda", "durumu", "durum", "nasıl", "status", "state", "how is"],
    ),
    (NlpAction::List, &["görevler", "tasks"]),
];

const RECENT_PHRASES: &[&str] = &[
    "son oluşturduğum", "son eklediğim", "son görev", "en son",
    "last task", "latest task", "recent task",
];

const PRIORITY_PHRASES: &[(&str, &str)] = &[
    ("yüksek öncelik", "high"),
    ("high priority", "high"),
    ("acil", "urgent"),
    ("urgent", "urgent"),
    ("düşük öncelik", "low"),
    ("low priority", "low"),
];

const STATUS_PHRASES: &[(&str, &str)] = &[
    ("açık", "open"),
    ("open", "open"),
    ("tamamlanan", "completed"),
    ("completed", "completed"),
    ("devam eden", "in_progress"),
    ("in progress", "in_progress"),
    ("bekleyen", "pending"),
    ("pending", "pending"),
];

const CATEGORY_PHRASES: &[(&str, &str)] = &[
    ("frontend", "frontend"),
    ("ön yüz", "frontend"),
    ("backend", "backend"),
    ("arka plan", "backend"),
    ("bug", "bug"),
    ("hata", "bug"),
    ("feature", "feature"),
    ("özellik", "feature"),
];

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:etiket|tag):([^\s,]+)").expect("valid tag regex"));
static ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:#|\b(?:task|görev)\s+#?)(\d+)\b").expect("valid id regex")
});
static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)""#).expect("valid quote regex"));
static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("valid date regex"));

/// Byte offsets of every occurrence of `phrase` that stands as whole words:
/// no letter or digit directly before or after it. "ekle" does not match
/// "eklediğim" and "create" does not match "created".
fn phrase_positions<'a>(text: &'a str, phrase: &'a str) -> impl Iterator<Item = usize> + 'a {
    let boundary = |c: Option<char>| c.is_none_or(|c| !c.is_alphanumeric());
    text.match_indices(phrase)
        .map(|(i, _)| i)
        .filter(move |&i| boundary(text[..i].chars().next_back()) && boundary(text[i + phrase.len()..].chars().next()))
}

fn contains_phrase(text: &str, phrase: &str) -> bool {
    phrase_positions(text, phrase).next().is_some()
}

/// A half-open `[start, end)` interval in local time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
    pub relative: String,
}

impl TimeRange {
    fn days(start: NaiveDate, days: u64, relative: &str) -> Option<Self> {
        let end = start.checked_add_days(Days::new(days))?;
        Some(Self {
            start: local_midnight(start)?,
            end: local_midnight(end)?,
            relative: relative.to_string(),
        })
    }

    pub fn start_ms(&self) -> i64 {
        self.start.timestamp_millis()
    }

    pub fn end_ms(&self) -> i64 {
        self.end.timestamp_millis()
    }
}

fn local_midnight(date: NaiveDate) -> Option<DateTime<Local>> {
    Local.from_local_datetime(&date.and_hms_opt(0, 0, 0)?).earliest()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentFilters {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl IntentFilters {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.priority.is_none() && self.status.is_none() && self.category.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentParameters {
    #[serde(default)]
    pub task_references: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIntent {
    pub action: NlpAction,
    pub filters: IntentFilters,
    pub parameters: IntentParameters,
    pub time_range: Option<TimeRange>,
    pub confidence: f64,
    pub raw: String,
}

/// Title, description and due date pulled out of a free-text command.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskContent {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NlpProcessor;

impl NlpProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, text: &str) -> QueryIntent {
        self.parse_at(text, Local::now())
    }

    /// Parse relative to `now`.
    pub fn parse_at(&self, text: &str, now: DateTime<Local>) -> QueryIntent {
        let normalized = text.trim().to_lowercase();
        let mut confidence = 0.0;

        let time_range = parse_time_range(&normalized, now.date_naive());
        if time_range.is_some() {
            confidence += TIME_WEIGHT;
        }

        let action = match parse_action(&normalized) {
            Some(action) => {
                confidence += ACTION_WEIGHT;
                action
            }
            None => NlpAction::List,
        };

        let filters = parse_filters(&normalized);
        if !filters.is_empty() {
            confidence += FILTER_WEIGHT;
        }

        let task_references = parse_references(&normalized);
        if !task_references.is_empty() {
            confidence += REFERENCE_WEIGHT;
        }

        QueryIntent {
            action,
            filters,
            parameters: IntentParameters { task_references },
            time_range,
            confidence: ((confidence * 100.0_f64).round() / 100.0).min(1.0),
            raw: text.to_string(),
        }
    }

    /// Reject intents that are too vague to act on.
    pub fn validate(&self, intent: &QueryIntent) -> Result<(), ToolError> {
        if intent.confidence < MIN_CONFIDENCE {
            return Err(ToolError::low_confidence(intent.confidence, &intent.raw));
        }
        match intent.action {
            NlpAction::Create => {
                let lower = intent.raw.to_lowercase();
                if !lower.contains("görev") && !lower.contains("task") {
                    return Err(ToolError::invalid_value(
                        "query",
                        "create needs the word 'task' or 'görev' with the task content",
                    ));
                }
            }
            action if action.needs_reference() => {
                if intent.parameters.task_references.is_empty() {
                    return Err(ToolError::invalid_value(
                        "query",
                        &format!("{} needs a task reference (#id, \"title\" or latest)", action.as_str()),
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Pull title, description and due date out of a command, dropping the
    /// phrase that triggered `action`.
    pub fn extract_task_content(&self, text: &str, action: NlpAction) -> TaskContent {
        self.extract_task_content_at(text, action, Local::now().date_naive())
    }

    pub fn extract_task_content_at(&self, text: &str, action: NlpAction, today: NaiveDate) -> TaskContent {
        let normalized = text.to_lowercase();
        // Case folding can change byte lengths outside ASCII.
        let source = if normalized.len() == text.len() { text } else { normalized.as_str() };

        let cut = ACTION_TABLE
            .iter()
            .filter(|(a, _)| *a == action)
            .flat_map(|(_, phrases)| phrases.iter())
            .filter_map(|phrase| phrase_positions(&normalized, phrase).next().map(|i| i + phrase.len()))
            .max()
            .unwrap_or(0);

        let rest = source[cut..]
            .trim()
            .trim_start_matches([':', '-'])
            .trim()
            .trim_matches(|c| c == '"' || c == '\'');

        let mut content = TaskContent {
            due_date: parse_time_range(&normalized, today).map(|r| r.start.date_naive()),
            ..Default::default()
        };

        let split = rest
            .split_once(':')
            .or_else(|| rest.split_once(" - "));
        match split {
            Some((title, description)) => {
                content.title = Some(title.trim().to_string()).filter(|t| !t.is_empty());
                content.description = Some(description.trim().to_string()).filter(|d| !d.is_empty());
            }
            None => content.title = Some(rest.to_string()).filter(|t| !t.is_empty()),
        }
        content
    }
}

fn parse_action(text: &str) -> Option<NlpAction> {
    ACTION_TABLE
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|p| contains_phrase(text, p)))
        .map(|(action, _)| *action)
}

fn parse_time_range(text: &str, today: NaiveDate) -> Option<TimeRange> {
    let monday = today.checked_sub_days(Days::new(today.weekday().num_days_from_monday() as u64))?;

    let said = |phrases: [&str; 2]| phrases.iter().any(|p| contains_phrase(text, p));

    if said(["bugün", "today"]) {
        return TimeRange::days(today, 1, "today");
    }
    if said(["yarın", "tomorrow"]) {
        return TimeRange::days(today.checked_add_days(Days::new(1))?, 1, "tomorrow");
    }
    if said(["dün", "yesterday"]) {
        return TimeRange::days(today.checked_sub_days(Days::new(1))?, 1, "yesterday");
    }
    if said(["bu hafta", "this week"]) {
        return TimeRange::days(monday, 7, "this_week");
    }
    if said(["gelecek hafta", "next week"]) {
        return TimeRange::days(monday.checked_add_days(Days::new(7))?, 7, "next_week");
    }

    let date = DATE_RE.captures(text)?.get(1)?.as_str();
    let date = NaiveDate::parse_from_str(date, crate::types::DATE_FORMAT).ok()?;
    TimeRange::days(date, 1, "specific_date")
}

fn first_match(text: &str, table: &[(&str, &str)]) -> Option<String> {
    table
        .iter()
        .find(|(phrase, _)| contains_phrase(text, phrase))
        .map(|(_, value)| value.to_string())
}

fn parse_filters(text: &str) -> IntentFilters {
    let mut tags: Vec<String> = Vec::new();
    for cap in TAG_RE.captures_iter(text) {
        if let Some(tag) = cap.get(1) {
            let tag = tag.as_str().to_string();
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }
    IntentFilters {
        tags,
        priority: first_match(text, PRIORITY_PHRASES),
        status: first_match(text, STATUS_PHRASES),
        category: first_match(text, CATEGORY_PHRASES),
    }
}

fn parse_references(text: &str) -> Vec<String> {
    let mut refs: Vec<String> = Vec::new();
    let mut push = |r: String| {
        if !refs.contains(&r) {
            refs.push(r);
        }
    };

    for cap in ID_RE.captures_iter(text) {
        if let Some(id) = cap.get(1) {
            push(format!("id:{}", id.as_str()));
        }
    }
    if RECENT_PHRASES.iter().any(|p| contains_phrase(text, p)) {
        push("recent:1".to_string());
    }
    for cap in QUOTED_RE.captures_iter(text) {
        if let Some(title) = cap.get(1) {
            push(format!("title:{}", title.as_str()));
        }
    }
    refs
}

/// What a dispatched command produced, for response rendering.
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    Tasks(usize),
    Title(&'a str),
    Failed(&'a str),
}

struct Messages {
    list_empty: &'static str,
    list_found: &'static str,
    create_success: &'static str,
    update_success: &'static str,
    complete_success: &'static str,
    delete_success: &'static str,
    error: &'static str,
}

const TR: Messages = Messages {
    list_empty: "Belirtilen kriterlere uygun görev bulunamadı.",
    list_found: "{} görev bulundu.",
    create_success: "Görev başarıyla oluşturuldu: {}",
    update_success: "Görev güncellendi: {}",
    complete_success: "Görev tamamlandı: {}",
    delete_success: "Görev silindi: {}",
    error: "İşlem sırasında hata oluştu: {}",
};

const EN: Messages = Messages {
    list_empty: "No tasks found matching the specified criteria.",
    list_found: "Found {} tasks.",
    create_success: "Task created successfully: {}",
    update_success: "Task updated: {}",
    complete_success: "Task completed: {}",
    delete_success: "Task deleted: {}",
    error: "Error occurred during operation: {}",
};

/// Render a short user-facing message. Turkish unless `lang` is `en`.
pub fn format_response(action: NlpAction, outcome: Outcome<'_>, lang: &str) -> String {
    let messages = if lang.eq_ignore_ascii_case("en") { &EN } else { &TR };
    let fill = |template: &str, value: &str| template.replacen("{}", value, 1);

    match outcome {
        Outcome::Failed(err) => fill(messages.error, err),
        Outcome::Tasks(0) => messages.list_empty.to_string(),
        Outcome::Tasks(n) => fill(messages.list_found, &n.to_string()),
        Outcome::Title(title) => {
            let template = match action {
                NlpAction::Create => messages.create_success,
                NlpAction::Update => messages.update_success,
                NlpAction::Complete => messages.complete_success,
                NlpAction::Delete => messages.delete_success,
                NlpAction::List | NlpAction::Search | NlpAction::Status => {
                    return fill(messages.list_found, "1");
                }
            };
            fill(template, title)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Local> {
        local_midnight(NaiveDate::from_ymd_opt(y, m, d).unwrap()).unwrap() + chrono::Duration::hours(10)
    }

    #[test]
    fn actions_in_both_languages() {
        let nlp = NlpProcessor::new();
        let cases = [
            ("görevleri göster", NlpAction::List),
            ("show tasks", NlpAction::List),
            ("yeni görev oluştur: Frontend API entegrasyonu", NlpAction::Create),
            ("create task: Update user authentication", NlpAction::Create),
            ("görev #123 tamamla", NlpAction::Complete),
            ("complete task #456", NlpAction::Complete),
            ("delete the latest task", NlpAction::Delete),
            ("find login", NlpAction::Search),
            ("what is the status of task 7", NlpAction::Status),
        ];
        for (query, expected) in cases {
            assert_eq!(nlp.parse(query).action, expected, "{}", query);
        }
    }

    #[test]
    fn phrases_match_whole_words_only() {
        assert_eq!(parse_action("undone things"), None);
        assert!(!contains_phrase("undone", "done"));
        assert!(contains_phrase("all done", "done"));
        assert!(contains_phrase("done.", "done"));
        assert!(!contains_phrase("son eklediğim", "ekle"));
        assert!(!contains_phrase("the created one", "create"));
        assert!(contains_phrase("görev oluştur: rapor", "görev oluştur"));
    }

    #[test]
    fn confidence_is_additive_and_capped() {
        let nlp = NlpProcessor::new();
        let intent = nlp.parse("complete task #42");
        assert_eq!(intent.parameters.task_references, vec!["id:42"]);
        assert!((intent.confidence - 0.6).abs() < 1e-9);

        let full = nlp.parse("complete task #42 today high priority");
        assert_eq!(full.confidence, 1.0);

        assert_eq!(nlp.parse("hmm").confidence, 0.0);
    }

    #[test]
    fn low_confidence_and_missing_reference_are_rejected() {
        let nlp = NlpProcessor::new();
        let err = nlp.validate(&nlp.parse("hmm")).unwrap_err();
        assert_eq!(err.code, ErrorCode::LowConfidence);

        let err = nlp.validate(&nlp.parse("complete it")).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFieldValue);

        assert!(nlp.validate(&nlp.parse("ekle something")).is_err());
        assert!(nlp.validate(&nlp.parse("add task: write docs")).is_ok());
    }

    #[test]
    fn references_and_filters() {
        let nlp = NlpProcessor::new();
        let intent = nlp.parse(r#"update "login page" tag:ui,backend high priority"#);
        assert_eq!(intent.parameters.task_references, vec!["title:login page"]);
        assert_eq!(intent.filters.tags, vec!["ui"]);
        assert_eq!(intent.filters.priority.as_deref(), Some("high"));
        assert_eq!(intent.filters.category.as_deref(), Some("backend"));

        let recent = nlp.parse("son görev tamamla");
        assert_eq!(recent.parameters.task_references, vec!["recent:1"]);

        // Dates are not task ids.
        let dated = nlp.parse("tasks due 2025-03-04");
        assert!(dated.parameters.task_references.is_empty());
    }

    #[test]
    fn time_ranges_are_half_open_local_days() {
        let nlp = NlpProcessor::new();
        // 2025-03-05 is a Wednesday.
        let now = at(2025, 3, 5);

        let today = nlp.parse_at("tasks today", now).time_range.unwrap();
        assert_eq!(today.start.date_naive(), NaiveDate::from_ymd_opt(2025, 3, 5).unwrap());
        assert_eq!(today.end.date_naive(), NaiveDate::from_ymd_opt(2025, 3, 6).unwrap());

        let week = nlp.parse_at("bu hafta", now).time_range.unwrap();
        assert_eq!(week.start.date_naive(), NaiveDate::from_ymd_opt(2025, 3, 3).unwrap());
        assert_eq!(week.end.date_naive(), NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());

        let next = nlp.parse_at("next week", now).time_range.unwrap();
        assert_eq!(next.start.date_naive(), NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());

        let day = nlp.parse_at("tasks on 2025-12-24", now).time_range.unwrap();
        assert_eq!(day.relative, "specific_date");
        assert_eq!(day.start.date_naive(), NaiveDate::from_ymd_opt(2025, 12, 24).unwrap());
    }

    #[test]
    fn extracts_title_description_and_due_date() {
        let nlp = NlpProcessor::new();
        let today = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();

        let content = nlp.extract_task_content_at(
            "create task: Update user authentication - move to tokens",
            NlpAction::Create,
            today,
        );
        assert_eq!(content.title.as_deref(), Some("Update user authentication"));
        assert_eq!(content.description.as_deref(), Some("move to tokens"));

        let content = nlp.extract_task_content_at("yeni görev oluştur: Rapor yaz yarın", NlpAction::Create, today);
        assert_eq!(content.title.as_deref(), Some("Rapor yaz yarın"));
        assert_eq!(content.due_date, NaiveDate::from_ymd_opt(2025, 3, 6));
    }

    #[test]
    fn responses_in_both_languages() {
        assert_eq!(
            format_response(NlpAction::Complete, Outcome::Title("Ship"), "en"),
            "Task completed: Ship"
        );
        assert_eq!(format_response(NlpAction::List, Outcome::Tasks(3), "en"), "Found 3 tasks.");
        assert_eq!(format_response(NlpAction::List, Outcome::Tasks(3), ""), "3 görev bulundu.");
        assert_eq!(
            format_response(NlpAction::Search, Outcome::Tasks(0), "tr"),
            "Belirtilen kriterlere uygun görev bulunamadı."
        );
        assert!(format_response(NlpAction::Delete, Outcome::Failed("boom"), "en").contains("boom"));
    }
}
