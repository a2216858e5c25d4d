//! Ranked suggestions: what to do next, related finished work, templates
//! that fit the workload and approaching deadlines.

use super::intelligent::{SIMILARITY_THRESHOLD, extract_keywords, similarity};
use super::tasks::TaskEngine;
use crate::db::now_ms;
use crate::types::{Priority, Task, TaskFilter, TaskStatus};
use anyhow::Result;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;

pub const DEFAULT_LIMIT: usize = 10;

const NEXT_ACTION_HIGH: usize = 3;
const NEXT_ACTION_IN_PROGRESS: usize = 2;
const SIMILAR_SHOWN: usize = 3;
const TEMPLATE_MIN_SCORE: usize = 2;
const DEADLINE_WINDOW_DAYS: i64 = 3;
const DEADLINE_SHOWN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    NextAction,
    SimilarTask,
    Template,
    DeadlineRisk,
}

impl SuggestionKind {
    pub const ALL: [SuggestionKind; 4] = [
        SuggestionKind::NextAction,
        SuggestionKind::SimilarTask,
        SuggestionKind::Template,
        SuggestionKind::DeadlineRisk,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "next_action" => Some(SuggestionKind::NextAction),
            "similar_task" => Some(SuggestionKind::SimilarTask),
            "template" => Some(SuggestionKind::Template),
            "deadline_risk" => Some(SuggestionKind::DeadlineRisk),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuggestionRequest {
    #[serde(default)]
    pub active_task_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    /// Empty means every kind.
    #[serde(default)]
    pub types: Vec<SuggestionKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub action: String,
    pub context: Value,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionResponse {
    pub suggestions: Vec<Suggestion>,
    pub total_count: usize,
    pub generated_at: i64,
    /// Milliseconds.
    pub execution_time: u64,
}

#[derive(Clone)]
pub struct SuggestionEngine {
    tasks: TaskEngine,
}

impl SuggestionEngine {
    pub fn new(tasks: TaskEngine) -> Self {
        Self { tasks }
    }

    pub fn suggest(&self, request: &SuggestionRequest) -> Result<SuggestionResponse> {
        self.suggest_on(request, Local::now().date_naive())
    }

    /// Suggestions relative to `today`, highest priority and confidence first.
    pub fn suggest_on(&self, request: &SuggestionRequest, today: NaiveDate) -> Result<SuggestionResponse> {
        let started = Instant::now();
        let kinds: &[SuggestionKind] = if request.types.is_empty() {
            &SuggestionKind::ALL
        } else {
            &request.types
        };

        let mut suggestions = Vec::new();
        for kind in kinds {
            match kind {
                SuggestionKind::NextAction => suggestions.extend(self.next_actions()?),
                SuggestionKind::SimilarTask => suggestions.extend(self.similar(request.active_task_id.as_deref())?),
                SuggestionKind::Template => suggestions.extend(self.templates()?),
                SuggestionKind::DeadlineRisk => suggestions.extend(self.deadline_risks(today)?),
            }
        }

        suggestions.sort_by(|a, b| {
            b.priority
                .rank()
                .cmp(&a.priority.rank())
                .then(b.confidence.total_cmp(&a.confidence))
        });
        suggestions.truncate(request.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIMIT));

        debug!(count = suggestions.len(), "suggestions generated");
        Ok(SuggestionResponse {
            total_count: suggestions.len(),
            suggestions,
            generated_at: now_ms(),
            execution_time: started.elapsed().as_millis() as u64,
        })
    }

    fn tasks_with(&self, status: TaskStatus, priority: Option<Priority>) -> Result<Vec<Task>> {
        self.tasks.db().list_tasks(&TaskFilter {
            status: Some(status),
            priority,
            ..Default::default()
        })
    }

    fn next_actions(&self) -> Result<Vec<Suggestion>> {
        let mut out = Vec::new();

        for task in self.tasks_with(TaskStatus::Pending, Some(Priority::High))? {
            if out.len() == NEXT_ACTION_HIGH {
                break;
            }
            if !self.tasks.blocking_titles(&task.id)?.is_empty() {
                continue;
            }
            out.push(Suggestion {
                kind: SuggestionKind::NextAction,
                priority: Priority::High,
                title: format!("Start high-priority task: {}", task.title),
                description: "This task is high priority and ready to start".to_string(),
                action: format!("set_active {}", task.id),
                context: json!({ "task_priority": task.priority, "can_start": true }),
                confidence: 0.9,
                task_id: Some(task.id),
            });
        }

        for task in self
            .tasks_with(TaskStatus::InProgress, None)?
            .into_iter()
            .take(NEXT_ACTION_IN_PROGRESS)
        {
            out.push(Suggestion {
                kind: SuggestionKind::NextAction,
                priority: Priority::Medium,
                title: format!("Continue: {}", task.title),
                description: "This task is already in progress".to_string(),
                action: format!("set_active {}", task.id),
                context: json!({ "status": task.status }),
                confidence: 0.7,
                task_id: Some(task.id),
            });
        }

        Ok(out)
    }

    fn similar(&self, active_task_id: Option<&str>) -> Result<Vec<Suggestion>> {
        let active_id = match active_task_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => Some(id.to_string()),
            None => self.tasks.db().load_ai_context()?.active_task_id,
        };
        let Some(active) = (match active_id {
            Some(id) => self.tasks.db().get_task(&id)?,
            None => None,
        }) else {
            return Ok(Vec::new());
        };

        let target = extract_keywords(&format!("{} {}", active.title, active.description));
        let out = self
            .tasks_with(TaskStatus::Completed, None)?
            .into_iter()
            .filter(|task| task.id != active.id)
            .filter_map(|task| {
                let words = extract_keywords(&format!("{} {}", task.title, task.description));
                let score = similarity(&target, &words);
                (score > SIMILARITY_THRESHOLD).then_some((task, score))
            })
            .take(SIMILAR_SHOWN)
            .map(|(task, score)| Suggestion {
                kind: SuggestionKind::SimilarTask,
                priority: Priority::Medium,
                title: format!("Similar completed task: {}", task.title),
                description: "A finished task covers similar ground and may help".to_string(),
                action: format!("get_task {}", task.id),
                context: json!({ "similarity": score, "active_task_id": active.id }),
                confidence: 0.6,
                task_id: Some(task.id),
            })
            .collect();
        Ok(out)
    }

    fn templates(&self) -> Result<Vec<Suggestion>> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for task in self.tasks.db().list_tasks(&TaskFilter::default())? {
            for word in extract_keywords(&format!("{} {}", task.title, task.description)) {
                *counts.entry(word).or_default() += 1;
            }
        }

        let mut out = Vec::new();
        for template in self.tasks.db().list_templates(None, false)? {
            let score: usize = extract_keywords(&format!("{} {}", template.name, template.description))
                .iter()
                .filter_map(|w| counts.get(w))
                .sum();
            if score < TEMPLATE_MIN_SCORE {
                continue;
            }
            out.push(Suggestion {
                kind: SuggestionKind::Template,
                priority: Priority::Low,
                title: format!("Use template: {}", template.name),
                description: "This template matches the kind of tasks you create".to_string(),
                action: format!("create_from_template {}", template.id),
                context: json!({ "template_id": template.id, "score": score }),
                confidence: (score as f64 / 10.0).min(1.0),
                task_id: None,
            });
        }
        Ok(out)
    }

    fn deadline_risks(&self, today: NaiveDate) -> Result<Vec<Suggestion>> {
        let mut dated: Vec<(Task, NaiveDate)> = self
            .tasks
            .db()
            .list_tasks(&TaskFilter {
                exclude_completed: true,
                ..Default::default()
            })?
            .into_iter()
            .filter(|t| t.status != TaskStatus::Cancelled)
            .filter_map(|t| t.due_date.map(|d| (t, d)))
            .collect();
        dated.sort_by_key(|(_, due)| *due);

        let mut out = Vec::new();
        let mut warnings = 0;
        for (task, due) in dated {
            let days = (due - today).num_days();
            if days < 0 {
                out.push(Suggestion {
                    kind: SuggestionKind::DeadlineRisk,
                    priority: Priority::High,
                    title: format!("Overdue: {}", task.title),
                    description: format!("This task is {} days overdue", -days),
                    action: format!("set_active {}", task.id),
                    context: json!({ "severity": "critical", "due_date": due, "days_overdue": -days }),
                    confidence: 0.9,
                    task_id: Some(task.id),
                });
            } else if days <= DEADLINE_WINDOW_DAYS && warnings < DEADLINE_SHOWN {
                warnings += 1;
                out.push(Suggestion {
                    kind: SuggestionKind::DeadlineRisk,
                    priority: Priority::High,
                    title: format!("Due soon: {}", task.title),
                    description: format!("Due in {} days", days),
                    action: format!("set_active {}", task.id),
                    context: json!({ "severity": "warning", "due_date": due, "days_left": days }),
                    confidence: 0.8,
                    task_id: Some(task.id),
                });
            }
        }
        Ok(out)
    }
}
