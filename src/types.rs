//! Core types for the taskflow MCP server.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Dependency kind that gates `pending -> in_progress`.
pub const DEP_PRECEDES: &str = "precedes";

/// Maximum length of the MRU recent-task list.
pub const MAX_RECENT_TASKS: usize = 10;

/// Date format used for due dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Parse a status string. Accepts a few common aliases.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" | "in-progress" | "inprogress" => Some(TaskStatus::InProgress),
            "completed" | "done" => Some(TaskStatus::Completed),
            "cancelled" | "canceled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether the batch transition matrix allows moving from `self` to `to`.
    pub fn can_transition_to(&self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, to),
            (Pending, InProgress)
                | (Pending, Cancelled)
                | (InProgress, Pending)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
                | (Completed, InProgress)
                | (Cancelled, Pending)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }

    /// Numeric rank used for ordering (higher = more important).
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,

    // Populated on read; never persisted from this struct.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub dependency_count: i64,
    #[serde(default)]
    pub uncompleted_dependency_count: i64,
    #[serde(default)]
    pub dependent_count: i64,
}

impl Task {
    /// A task is blocked when it is pending and has unfinished predecessors.
    pub fn is_blocked(&self) -> bool {
        self.status == TaskStatus::Pending && self.uncompleted_dependency_count > 0
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status != TaskStatus::Completed && self.due_date.is_some_and(|d| d < today)
    }
}

/// Input for creating a task through the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Field edits. `Some` marks a field as present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub project_id: Option<String>,
    /// Empty string clears the due date.
    pub due_date: Option<String>,
}

impl TaskEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.project_id.is_none()
            && self.due_date.is_none()
    }
}

/// Sort keys for task listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    DueAsc,
    DueDesc,
    CreatedDesc,
}

impl SortKey {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "due_asc" | "son_tarih_asc" => Some(SortKey::DueAsc),
            "due_desc" | "son_tarih_desc" => Some(SortKey::DueDesc),
            "created_desc" | "" => Some(SortKey::CreatedDesc),
            _ => None,
        }
    }
}

/// Preset listing filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListPreset {
    /// Due within the next 7 days.
    Urgent,
    /// Due before today.
    Overdue,
}

impl ListPreset {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "urgent" | "acil" => Some(ListPreset::Urgent),
            "overdue" | "gecmis" | "gecmis_tarih" => Some(ListPreset::Overdue),
            _ => None,
        }
    }
}

/// Filter passed to the storage layer when listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub project_id: Option<String>,
    pub parent_id: Option<String>,
    pub tag: Option<String>,
    pub due_from: Option<NaiveDate>,
    pub due_before: Option<NaiveDate>,
    pub created_from: Option<i64>,
    pub created_before: Option<i64>,
    pub exclude_completed: bool,
    pub sort: Option<SortKey>,
    pub limit: Option<usize>,
}

/// A project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub task_count: i64,
}

/// A tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
}

/// A typed link between two tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    /// Link kind; only `precedes` participates in gating.
    pub kind: String,
    #[serde(default)]
    pub created_at: i64,
}

/// Bulk dependency counters keyed by task id.
#[derive(Debug, Clone, Default)]
pub struct DependencyCounts {
    /// Links where the task is the target (things it depends on).
    pub dependencies: std::collections::HashMap<String, i64>,
    /// `precedes` predecessors that are not completed.
    pub uncompleted: std::collections::HashMap<String, i64>,
    /// Links where the task is the source (things depending on it).
    pub dependents: std::collections::HashMap<String, i64>,
}

impl DependencyCounts {
    /// Copy counters onto a task.
    pub fn apply(&self, task: &mut Task) {
        task.dependency_count = self.dependencies.get(&task.id).copied().unwrap_or(0);
        task.uncompleted_dependency_count = self.uncompleted.get(&task.id).copied().unwrap_or(0);
        task.dependent_count = self.dependents.get(&task.id).copied().unwrap_or(0);
    }
}

/// Readiness of a task with respect to its `precedes` predecessors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyReadiness {
    pub ready: bool,
    pub blocking: Vec<String>,
}

/// Descendant counts and progress for a task subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHierarchy {
    pub task: Task,
    /// Direct parent first, root last.
    pub ancestors: Vec<Task>,
    pub direct_children: usize,
    pub total_descendants: usize,
    pub completed_descendants: usize,
    pub in_progress_descendants: usize,
    pub pending_descendants: usize,
    pub cancelled_descendants: usize,
    /// Percentage in `[0, 100]`.
    pub progress: f64,
}

/// Template field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Select,
    Date,
    Number,
}

/// A single typed field in a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl TemplateField {
    pub fn text(name: &str, required: bool) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::Text,
            required,
            default: None,
            options: Vec::new(),
        }
    }

    pub fn select(name: &str, required: bool, options: &[&str], default: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::Select,
            required,
            default: default.map(String::from),
            options: options.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn date(name: &str, required: bool) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::Date,
            required,
            default: None,
            options: Vec::new(),
        }
    }

    pub fn number(name: &str, required: bool) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::Number,
            required,
            default: None,
            options: Vec::new(),
        }
    }

    pub fn with_default(mut self, default: &str) -> Self {
        self.default = Some(default.to_string());
        self
    }
}

/// A task template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub title_pattern: String,
    #[serde(default)]
    pub body_pattern: String,
    #[serde(default)]
    pub fields: Vec<TemplateField>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_language")]
    pub language_code: String,
    #[serde(default)]
    pub base_template_id: Option<String>,
    #[serde(default)]
    pub created_at: i64,
}

fn default_true() -> bool {
    true
}

fn default_language() -> String {
    "en".to_string()
}

/// A recorded AI interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiInteraction {
    pub id: String,
    pub task_id: String,
    pub action: String,
    #[serde(default)]
    pub context: Value,
    pub timestamp: i64,
}

/// Process-wide AI session state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiContext {
    pub active_task_id: Option<String>,
    /// Newest first, distinct, at most `MAX_RECENT_TASKS`.
    pub recent_tasks: Vec<String>,
    pub session_data: BTreeMap<String, Value>,
    pub last_updated: i64,
}

impl AiContext {
    /// Move `task_id` to the head of the MRU list.
    pub fn push_recent(&mut self, task_id: &str) {
        self.recent_tasks.retain(|id| id != task_id);
        self.recent_tasks.insert(0, task_id.to_string());
        self.recent_tasks.truncate(MAX_RECENT_TASKS);
    }
}

/// Aggregated AI session view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSummary {
    pub active_task: Option<Task>,
    pub recent_tasks: Vec<Task>,
    pub working_project: Option<Project>,
    pub session: SessionSummary,
    pub next_priorities: Vec<Task>,
    pub blockers: Vec<Task>,
}

/// Interaction counts over the recent window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSummary {
    pub total_interactions: usize,
    pub by_action: BTreeMap<String, usize>,
}

/// Totals across the whole store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Summary {
    pub total_tasks: usize,
    pub total_projects: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<String, usize>,
    pub overdue: usize,
    pub active_project: Option<String>,
}

/// A file associated with a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileWatch {
    pub id: String,
    pub task_id: String,
    pub file_path: String,
    pub created_at: i64,
}

/// Filters for the advanced search. Empty lists match everything; the
/// bounds are inclusive dates (`YYYY-MM-DD`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status: Vec<TaskStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub priority: Vec<Priority>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub project_ids: Vec<String>,
    /// A task must carry every listed tag.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_after: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_before: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_after: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_before: Option<NaiveDate>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fields set in `other` replace ours.
    pub fn merge(&mut self, other: SearchFilters) {
        if !other.status.is_empty() {
            self.status = other.status;
        }
        if !other.priority.is_empty() {
            self.priority = other.priority;
        }
        if !other.project_ids.is_empty() {
            self.project_ids = other.project_ids;
        }
        if !other.tags.is_empty() {
            self.tags = other.tags;
        }
        self.due_after = other.due_after.or(self.due_after);
        self.due_before = other.due_before.or(self.due_before);
        self.created_after = other.created_after.or(self.created_after);
        self.created_before = other.created_before.or(self.created_before);
    }
}

/// A saved search: filters plus an optional query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default)]
    pub search_query: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub use_count: i64,
    #[serde(default)]
    pub last_used_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One executed search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHistoryEntry {
    pub id: i64,
    pub query: String,
    pub filters: SearchFilters,
    pub result_count: i64,
    pub execution_time_ms: i64,
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parse_accepts_aliases() {
        assert_eq!(TaskStatus::parse("in-progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse("Completed"), Some(TaskStatus::Completed));
        assert_eq!(TaskStatus::parse("canceled"), Some(TaskStatus::Cancelled));
        assert_eq!(TaskStatus::parse("blocked"), None);
    }

    #[test]
    fn transition_matrix() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::InProgress));
        assert!(TaskStatus::Cancelled.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn push_recent_keeps_mru_invariant() {
        let mut ctx = AiContext::default();
        for i in 0..15 {
            ctx.push_recent(&format!("t{}", i));
        }
        ctx.push_recent("t10");

        assert_eq!(ctx.recent_tasks.len(), MAX_RECENT_TASKS);
        assert_eq!(ctx.recent_tasks[0], "t10");
        assert_eq!(ctx.recent_tasks.iter().filter(|id| *id == "t10").count(), 1);
        assert_eq!(ctx.recent_tasks[1], "t14");
    }

    #[test]
    fn template_field_serializes_type_key() {
        let field = TemplateField::select("severity", true, &["low", "high"], None);
        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(json["type"], "select");
        assert_eq!(json["options"][1], "high");
    }
}
