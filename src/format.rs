//! Output formatting utilities for markdown and JSON.

use crate::types::{Priority, Project, Summary, Task, TaskHierarchy, TaskStatus, Template};
use serde_json::Value;

/// Output format for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Markdown,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "markdown" | "md" => Some(OutputFormat::Markdown),
            _ => None,
        }
    }
}

/// Format a single task as markdown.
pub fn format_task_markdown(task: &Task) -> String {
    let mut md = String::new();

    md.push_str(&format!("## Task: {}\n", task.title));
    md.push_str(&format!("- **id**: `{}`\n", task.id));
    md.push_str(&format!("- **status**: {}\n", task.status));
    md.push_str(&format!("- **priority**: {}\n", task.priority));

    if let Some(ref project_id) = task.project_id {
        md.push_str(&format!("- **project_id**: `{}`\n", project_id));
    }
    if let Some(ref parent_id) = task.parent_id {
        md.push_str(&format!("- **parent_id**: `{}`\n", parent_id));
    }
    if let Some(due) = task.due_date {
        md.push_str(&format!("- **due**: {}\n", due));
    }
    if !task.tags.is_empty() {
        md.push_str(&format!("- **tags**: {}\n", task.tags.join(", ")));
    }
    if task.dependency_count > 0 {
        md.push_str(&format!(
            "- **dependencies**: {} ({} open)\n",
            task.dependency_count, task.uncompleted_dependency_count
        ));
    }

    if !task.description.is_empty() {
        md.push_str("\n### Description\n");
        md.push_str(&task.description);
        md.push('\n');
    }

    md
}

/// Format a list of tasks as markdown, grouped by status.
pub fn format_tasks_markdown(tasks: &[Task]) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Tasks ({})\n\n", tasks.len()));

    // In-progress work first, then the backlog, then closed tasks.
    for status in [
        TaskStatus::InProgress,
        TaskStatus::Pending,
        TaskStatus::Completed,
        TaskStatus::Cancelled,
    ] {
        let group: Vec<&Task> = tasks.iter().filter(|t| t.status == status).collect();
        if group.is_empty() {
            continue;
        }
        md.push_str(&format!("## {}\n\n", format_state_name(status.as_str())));
        for task in group {
            md.push_str(&format_task_short(task));
        }
        md.push('\n');
    }

    md
}

/// Format a state name for display (capitalize, replace underscores with spaces).
fn format_state_name(state: &str) -> String {
    state
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => first.to_uppercase().chain(chars).collect(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format a task in short form for lists.
fn format_task_short(task: &Task) -> String {
    let priority_marker = match task.priority {
        Priority::High => "!!! ",
        Priority::Medium | Priority::Low => "",
    };

    let blocked = if task.is_blocked() {
        format!(" [blocked by {}]", task.uncompleted_dependency_count)
    } else {
        String::new()
    };

    let due = task.due_date.map(|d| format!(" (due {})", d)).unwrap_or_default();

    let tags = if task.tags.is_empty() {
        String::new()
    } else {
        format!(" #{}", task.tags.join(" #"))
    };

    format!(
        "- {}{} `{}`{}{}{}\n",
        priority_marker,
        task.title,
        &task.id[..8.min(task.id.len())],
        due,
        blocked,
        tags,
    )
}

/// Format a hierarchy view as markdown.
pub fn format_hierarchy_markdown(hierarchy: &TaskHierarchy) -> String {
    let mut md = format_task_markdown(&hierarchy.task);

    if !hierarchy.ancestors.is_empty() {
        let path: Vec<&str> = hierarchy.ancestors.iter().rev().map(|t| t.title.as_str()).collect();
        md.push_str(&format!("\n**Path**: {}\n", path.join(" > ")));
    }

    md.push_str(&format!(
        "\n**Subtasks**: {} direct, {} total ({} completed, {} in progress, {} pending)\n",
        hierarchy.direct_children,
        hierarchy.total_descendants,
        hierarchy.completed_descendants,
        hierarchy.in_progress_descendants,
        hierarchy.pending_descendants,
    ));
    md.push_str(&format!("**Progress**: {:.0}%\n", hierarchy.progress));
    md
}

/// Format projects as markdown.
pub fn format_projects_markdown(projects: &[Project], active: Option<&str>) -> String {
    let mut md = format!("# Projects ({})\n\n", projects.len());
    for project in projects {
        let marker = if active == Some(project.id.as_str()) { " (active)" } else { "" };
        md.push_str(&format!("- **{}**{} `{}`\n", project.name, marker, project.id));
        if !project.description.is_empty() {
            md.push_str(&format!("  {}\n", project.description));
        }
    }
    md
}

/// Format templates as markdown.
pub fn format_templates_markdown(templates: &[Template]) -> String {
    let mut md = format!("# Templates ({})\n\n", templates.len());
    for template in templates {
        let alias = template
            .alias
            .as_deref()
            .map(|a| format!(" [{}]", a))
            .unwrap_or_default();
        md.push_str(&format!(
            "## {}{}\n- **id**: `{}`\n- **category**: {}\n- **language**: {}\n",
            template.name, alias, template.id, template.category, template.language_code
        ));
        if !template.description.is_empty() {
            md.push_str(&format!("- {}\n", template.description));
        }
        for field in &template.fields {
            let required = if field.required { " (required)" } else { "" };
            md.push_str(&format!("  - `{}`: {:?}{}\n", field.name, field.field_type, required));
        }
        md.push('\n');
    }
    md
}

/// Format store totals as markdown.
pub fn format_summary_markdown(summary: &Summary) -> String {
    let mut md = String::from("# Summary\n\n");
    md.push_str(&format!("- **tasks**: {}\n", summary.total_tasks));
    md.push_str(&format!("- **projects**: {}\n", summary.total_projects));
    md.push_str(&format!("- **overdue**: {}\n", summary.overdue));
    for (status, count) in &summary.by_status {
        md.push_str(&format!("- {}: {}\n", format_state_name(status), count));
    }
    md
}

/// Convert markdown to JSON value for uniform response handling.
pub fn markdown_to_json(md: String) -> Value {
    serde_json::json!({
        "format": "markdown",
        "content": md
    })
}
