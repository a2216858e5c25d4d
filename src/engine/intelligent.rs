//! Keyword heuristics for task creation: priority guess, effort estimate,
//! template recommendation, similar-task lookup and automatic subtask
//! splitting.

use super::tasks::TaskEngine;
use crate::types::{NewTask, Priority, Task, TaskFilter, TaskStatus};
use anyhow::Result;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Jaccard score a task must exceed to count as similar.
pub const SIMILARITY_THRESHOLD: f64 = 0.2;

const MAX_SUBTASKS: usize = 5;
const MIN_SPLIT_DESCRIPTION: usize = 50;
const MIN_SUBTASK_TITLE: usize = 5;
const SIMILAR_SHOWN: usize = 5;
const SIMILAR_SAMPLED: usize = 10;
const WORDS_PER_HOUR: f64 = 20.0;
const MIN_HOURS: f64 = 0.5;
const MAX_HOURS: f64 = 40.0;
const HOURS_PER_DAY: f64 = 8.0;

const STOP_WORDS: &[&str] = &[
    "ve", "ile", "için", "bir", "bu", "şu", "the", "and", "or", "but", "in", "on", "at",
];

const HIGH_PRIORITY_WORDS: &[&str] = &[
    "acil", "urgent", "kritik", "critical", "hemen", "immediately", "asap",
    "bug", "hata", "error", "çöktü", "crash", "down", "broken",
    "security", "güvenlik", "vulnerability", "zafiyet",
    "deadline", "son tarih", "due", "release",
];

const MEDIUM_PRIORITY_WORDS: &[&str] = &[
    "important", "önemli", "should", "need", "gerek", "lazım",
    "improvement", "iyileştirme", "enhance", "optimize",
    "feature", "özellik", "functionality", "fonksiyon",
];

const LOW_PRIORITY_WORDS: &[&str] = &[
    "nice to have", "optional", "opsiyonel", "when time permits",
    "documentation", "dokuman", "cleanup", "temizlik",
    "refactor", "refaktör", "research", "araştırma",
];

/// Template alias to the words that suggest it.
const TEMPLATE_WORDS: &[(&str, &[&str])] = &[
    (
        "bug_report",
        &[
            "bug", "hata", "error", "exception", "crash", "çöktü", "broken",
            "not working", "çalışmıyor", "issue", "problem",
        ],
    ),
    (
        "feature_request",
        &[
            "feature", "özellik", "functionality", "fonksiyon", "add", "ekle",
            "implement", "uygula", "new", "yeni", "enhancement",
        ],
    ),
    (
        "research",
        &[
            "research", "araştırma", "investigate", "incele", "analyze", "analiz",
            "study", "çalışma", "explore", "keşfet", "evaluate",
        ],
    ),
    (
        "performance",
        &[
            "performance", "performans", "slow", "yavaş", "optimization", "optimizasyon",
            "speed", "hız", "memory", "bellek", "cpu", "latency",
        ],
    ),
    (
        "security_fix",
        &[
            "security", "güvenlik", "vulnerability", "zafiyet", "auth", "authentication",
            "authorization", "yetki", "encryption", "şifreleme",
        ],
    ),
];

static COMPLEXITY_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("multiple_steps", r"\d+\.\s+|\n[-*]\s+"),
        ("technical_terms", r"api|database|algorithm|integration|deployment"),
        ("time_mentions", r"\d+\s*(hour|day|week|month)s?"),
        ("dependencies", r"depend|require|need|after|before"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).expect("valid complexity regex")))
    .collect()
});

static SUBTASK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?m)^\s*\d+[.)]\s+(.+)$",
        r"(?m)^\s*[-*]\s+(.+)$",
        r"(?i)step\s+\d+:\s*(.+)",
        r"(?i)task\s+\d+:\s*(.+)",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("valid subtask regex"))
    .collect()
});

/// Lowercased words longer than two characters, minus stop words.
pub fn extract_keywords(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| c.is_whitespace() || ",.;:!?".contains(c))
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
        .map(String::from)
        .collect()
}

/// Jaccard similarity of two keyword lists.
pub fn similarity(a: &[String], b: &[String]) -> f64 {
    let a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let b: HashSet<&str> = b.iter().map(String::as_str).collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(&b).count();
    let union = a.len() + b.len() - shared;
    shared as f64 / union as f64
}

fn count_keywords(content: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|k| content.contains(*k)).count()
}

/// Suggested priority and the confidence behind it.
pub fn determine_priority(title: &str, description: &str) -> (Priority, f64) {
    let content = format!("{} {}", title, description).to_lowercase();
    let high = count_keywords(&content, HIGH_PRIORITY_WORDS);
    let medium = count_keywords(&content, MEDIUM_PRIORITY_WORDS);
    let low = count_keywords(&content, LOW_PRIORITY_WORDS);

    let total = high + medium + low;
    if total == 0 {
        return (Priority::Medium, 0.3);
    }
    let base = (total as f64 / 10.0).min(0.9);

    let (priority, weight) = if high > 0 && high >= medium && high >= low {
        (Priority::High, 0.3)
    } else if low > 0 && low > high && low >= medium {
        (Priority::Low, 0.2)
    } else {
        (Priority::Medium, 0.1)
    };
    (priority, (base + weight).min(1.0))
}

/// Names of the complexity indicators present in `content`.
pub fn complexity_indicators(content: &str) -> Vec<&'static str> {
    let content = content.to_lowercase();
    COMPLEXITY_PATTERNS
        .iter()
        .filter(|(_, re)| re.is_match(&content))
        .map(|(name, _)| *name)
        .collect()
}

fn complexity_multiplier(content: &str) -> f64 {
    let indicators = complexity_indicators(content).len();
    let words = content.split_whitespace().count();
    if indicators >= 3 || words > 100 {
        2.0
    } else if indicators >= 1 || words > 30 {
        1.0
    } else {
        0.5
    }
}

/// Word-count estimate used when no similar task carries a duration.
pub fn estimate_from_content(title: &str, description: &str) -> f64 {
    let content = format!("{} {}", title, description);
    let words = content.split_whitespace().count() as f64;
    (words / WORDS_PER_HOUR * complexity_multiplier(&content)).clamp(MIN_HOURS, MAX_HOURS)
}

/// Duration in working days mentioned in a description, if any.
pub fn duration_days(description: &str) -> Option<u32> {
    let desc = description.to_lowercase();
    let said = |phrases: &[&str]| phrases.iter().any(|p| desc.contains(p));
    if said(&["1 gün", "1 day"]) {
        Some(1)
    } else if said(&["2 gün", "2 day"]) {
        Some(2)
    } else if said(&["3 gün", "3 day"]) {
        Some(3)
    } else if said(&["1 hafta", "1 week"]) {
        Some(5)
    } else if said(&["hızlı", "quick", "basit"]) {
        Some(1)
    } else {
        None
    }
}

/// Best-matching template alias by keyword hits, with confidence.
pub fn suggest_template(title: &str, description: &str) -> Option<(&'static str, f64)> {
    let content = format!("{} {}", title, description).to_lowercase();
    let mut best: Option<(&'static str, usize)> = None;
    for (alias, words) in TEMPLATE_WORDS {
        let score = count_keywords(&content, words);
        if score > 0 && best.is_none_or(|(_, s)| score > s) {
            best = Some((alias, score));
        }
    }
    best.map(|(alias, score)| (alias, (score as f64 / 10.0).min(1.0)))
}

/// Candidate subtask titles found in a structured description.
pub fn split_subtasks(description: &str) -> Vec<String> {
    if description.chars().count() <= MIN_SPLIT_DESCRIPTION {
        return Vec::new();
    }
    let mut found: Vec<String> = Vec::new();
    for re in SUBTASK_PATTERNS.iter() {
        for cap in re.captures_iter(description) {
            let Some(item) = cap.get(1) else { continue };
            let item = item.as_str().trim();
            if item.chars().count() > MIN_SUBTASK_TITLE && !found.iter().any(|f| f == item) {
                found.push(item.to_string());
            }
        }
        if found.len() >= MAX_SUBTASKS {
            break;
        }
    }
    found.truncate(MAX_SUBTASKS);
    found
}

fn similarity_reason(a: &[String], b: &[String]) -> String {
    let a: BTreeSet<&str> = a.iter().map(String::as_str).collect();
    let common: Vec<&str> = b
        .iter()
        .map(String::as_str)
        .filter(|w| w.chars().count() > 3 && a.contains(w))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    match common.len() {
        0 => "General similarity".to_string(),
        1..=3 => format!("Common words: {}", common.join(", ")),
        n => format!("Common words: {} and {} more", common[..3].join(", "), n - 3),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmartTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub auto_split: bool,
    #[serde(default)]
    pub estimate_time: bool,
    #[serde(default)]
    pub smart_priority: bool,
    #[serde(default)]
    pub suggest_template: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarTask {
    pub task: Task,
    pub similarity_score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisConfidence {
    pub priority: f64,
    pub time: f64,
    pub template: f64,
    pub subtasks: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartTaskResponse {
    pub main_task: Task,
    pub subtasks: Vec<Task>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_template: Option<String>,
    pub similar_tasks: Vec<SimilarTask>,
    pub insights: Vec<String>,
    pub confidence: AnalysisConfidence,
    /// Milliseconds.
    pub execution_time: u64,
}

#[derive(Clone)]
pub struct IntelligentCreator {
    tasks: TaskEngine,
}

impl IntelligentCreator {
    pub fn new(tasks: TaskEngine) -> Self {
        Self { tasks }
    }

    /// Tasks above `threshold` similarity, most similar first.
    pub fn similar_tasks(&self, text: &str, threshold: f64, limit: usize) -> Result<Vec<SimilarTask>> {
        let target = extract_keywords(text);
        let mut similar: Vec<SimilarTask> = self
            .tasks
            .db()
            .list_tasks(&TaskFilter::default())?
            .into_iter()
            .filter_map(|task| {
                let words = extract_keywords(&format!("{} {}", task.title, task.description));
                let score = similarity(&target, &words);
                (score > threshold).then(|| SimilarTask {
                    reason: similarity_reason(&target, &words),
                    similarity_score: score,
                    task,
                })
            })
            .collect();
        similar.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
        similar.truncate(limit);
        Ok(similar)
    }

    /// Hours and confidence, from similar completed tasks when they mention
    /// a duration, else from the word count.
    pub fn estimate_hours(&self, title: &str, description: &str) -> Result<(f64, f64)> {
        let text = format!("{} {}", title, description);
        let similar: Vec<SimilarTask> = self
            .similar_tasks(&text, SIMILARITY_THRESHOLD, SIMILAR_SAMPLED)?
            .into_iter()
            .filter(|s| s.task.status == TaskStatus::Completed)
            .collect();
        if similar.is_empty() {
            return Ok((estimate_from_content(title, description), 0.3));
        }

        let samples: Vec<f64> = similar
            .iter()
            .filter_map(|s| {
                duration_days(&s.task.description)
                    .map(|days| days as f64 * HOURS_PER_DAY * s.similarity_score)
            })
            .collect();
        if samples.is_empty() {
            return Ok((estimate_from_content(title, description), 0.2));
        }
        let hours = samples.iter().sum::<f64>() / samples.len() as f64;
        Ok((hours, (samples.len() as f64 / 10.0).min(0.9)))
    }

    /// Create the main task plus any analysis that was asked for. Subtask
    /// failures are logged and skipped.
    pub fn create(&self, request: SmartTaskRequest) -> Result<SmartTaskResponse> {
        let started = Instant::now();
        let mut insights = Vec::new();
        let mut confidence = AnalysisConfidence {
            priority: 0.5,
            ..Default::default()
        };

        let mut priority = Priority::Medium;
        let mut suggested_priority = None;
        if request.smart_priority {
            let (p, c) = determine_priority(&request.title, &request.description);
            priority = p;
            suggested_priority = Some(p);
            confidence.priority = c;
            insights.push(format!("Priority analysis: {} (confidence {:.0}%)", p, c * 100.0));
        }

        let mut estimated_hours = None;
        if request.estimate_time {
            let (hours, c) = self.estimate_hours(&request.title, &request.description)?;
            estimated_hours = Some(hours);
            confidence.time = c;
            insights.push(format!("Estimated effort: {:.1} hours (confidence {:.0}%)", hours, c * 100.0));
        }

        let similar_tasks = self.similar_tasks(
            &format!("{} {}", request.title, request.description),
            SIMILARITY_THRESHOLD,
            SIMILAR_SHOWN,
        )?;
        if !similar_tasks.is_empty() {
            insights.push(format!("{} similar tasks found", similar_tasks.len()));
        }

        let mut recommended_template = None;
        if request.suggest_template {
            if let Some((alias, c)) = suggest_template(&request.title, &request.description) {
                recommended_template = Some(alias.to_string());
                confidence.template = c;
                insights.push(format!("Recommended template: {} (confidence {:.0}%)", alias, c * 100.0));
            }
        }

        let project_id = match request.project_id.filter(|p| !p.trim().is_empty()) {
            Some(p) => Some(p),
            None => self.tasks.db().active_project()?.map(|p| p.id),
        };
        let main_task = self.tasks.create(NewTask {
            title: request.title,
            description: request.description.clone(),
            priority,
            project_id,
            parent_id: None,
            due_date: request.due_date,
            tags: request.tags,
        })?;

        let mut subtasks = Vec::new();
        if request.auto_split {
            let items = split_subtasks(&request.description);
            for item in &items {
                let input = NewTask {
                    title: item.clone(),
                    ..Default::default()
                };
                match self.tasks.create_subtask(&main_task.id, input) {
                    Ok(task) => subtasks.push(task),
                    Err(e) => warn!(parent = %main_task.id, title = %item, error = %e, "subtask creation failed"),
                }
            }
            if !items.is_empty() {
                confidence.subtasks = subtasks.len() as f64 / items.len() as f64;
                insights.push(format!("{} subtasks created automatically", subtasks.len()));
            }
        }

        debug!(task_id = %main_task.id, insights = insights.len(), "smart task analysed");
        info!(task_id = %main_task.id, subtasks = subtasks.len(), "smart task created");

        Ok(SmartTaskResponse {
            main_task,
            subtasks,
            estimated_hours,
            suggested_priority,
            recommended_template,
            similar_tasks,
            insights,
            confidence,
            execution_time: started.elapsed().as_millis() as u64,
        })
    }
}
