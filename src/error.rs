//! Structured error types for tool responses.

use serde::Serialize;
use std::fmt;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    MissingRequiredField,
    InvalidFieldValue,
    InvalidDateFormat,
    RequiredFieldMissing,
    EmptyTitle,
    InvalidStatus,
    InvalidPriority,

    // Not found errors
    TaskNotFound,
    ProjectNotFound,
    TemplateNotFound,
    FileNotFound,
    ProfileNotFound,

    // Invariant violations
    DependencyBlocked,
    SubtasksIncomplete,
    CycleDetected,
    SubtasksPresent,
    NoActiveProject,

    // Conflicts and gates
    ImportConflict,
    ConfirmationRequired,
    LowConfidence,
    UnsupportedSchemaVersion,
    UnsupportedFormat,

    // Internal errors
    DatabaseError,
    InternalError,
    UnknownTool,
}

/// Taxonomy class of an error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    InvariantViolation,
    Conflict,
    UnsupportedSchemaVersion,
    UnsupportedFormat,
    StorageError,
    ConfirmationRequired,
    LowConfidence,
    Internal,
}

impl ErrorCode {
    pub fn kind(&self) -> ErrorKind {
        use ErrorCode::*;
        match self {
            MissingRequiredField | InvalidFieldValue | InvalidDateFormat
            | RequiredFieldMissing | EmptyTitle | InvalidStatus | InvalidPriority => {
                ErrorKind::InvalidInput
            }
            TaskNotFound | ProjectNotFound | TemplateNotFound | FileNotFound | ProfileNotFound => {
                ErrorKind::NotFound
            }
            DependencyBlocked | SubtasksIncomplete | CycleDetected | SubtasksPresent
            | NoActiveProject => ErrorKind::InvariantViolation,
            ImportConflict => ErrorKind::Conflict,
            ConfirmationRequired => ErrorKind::ConfirmationRequired,
            LowConfidence => ErrorKind::LowConfidence,
            UnsupportedSchemaVersion => ErrorKind::UnsupportedSchemaVersion,
            UnsupportedFormat => ErrorKind::UnsupportedFormat,
            DatabaseError => ErrorKind::StorageError,
            InternalError | UnknownTool => ErrorKind::Internal,
        }
    }
}

/// Structured error for tool responses.
#[derive(Debug, Serialize)]
pub struct ToolError {
    pub code: ErrorCode,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ToolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            kind: code.kind(),
            message: message.into(),
            field: None,
            details: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("{} is required", field),
        )
        .with_field(field)
    }

    pub fn invalid_value(field: &str, reason: &str) -> Self {
        Self::new(ErrorCode::InvalidFieldValue, reason).with_field(field)
    }

    pub fn invalid_date(value: &str) -> Self {
        Self::new(
            ErrorCode::InvalidDateFormat,
            format!("Invalid date '{}', expected YYYY-MM-DD", value),
        )
        .with_field("due_date")
    }

    pub fn empty_title() -> Self {
        Self::new(ErrorCode::EmptyTitle, "Title cannot be empty").with_field("title")
    }

    pub fn invalid_status(value: &str) -> Self {
        Self::new(
            ErrorCode::InvalidStatus,
            format!(
                "Invalid status '{}', expected one of: pending, in_progress, completed, cancelled",
                value
            ),
        )
        .with_field("status")
    }

    pub fn invalid_priority(value: &str) -> Self {
        Self::new(
            ErrorCode::InvalidPriority,
            format!("Invalid priority '{}', expected one of: low, medium, high", value),
        )
        .with_field("priority")
    }

    pub fn required_template_field(name: &str) -> Self {
        Self::new(
            ErrorCode::RequiredFieldMissing,
            format!("Required template field missing: {}", name),
        )
        .with_field(name)
    }

    pub fn task_not_found(task_id: &str) -> Self {
        Self::new(
            ErrorCode::TaskNotFound,
            format!("Task not found: {}", task_id),
        )
    }

    pub fn project_not_found(project_id: &str) -> Self {
        Self::new(
            ErrorCode::ProjectNotFound,
            format!("Project not found: {}", project_id),
        )
    }

    pub fn template_not_found(template: &str) -> Self {
        Self::new(
            ErrorCode::TemplateNotFound,
            format!("Template not found: {}", template),
        )
    }

    pub fn profile_not_found(profile: &str) -> Self {
        Self::new(
            ErrorCode::ProfileNotFound,
            format!("Filter profile not found: {}", profile),
        )
    }

    pub fn deps_not_satisfied(blockers: &[String]) -> Self {
        Self::new(
            ErrorCode::DependencyBlocked,
            format!("Task blocked by: {}", blockers.join(", ")),
        )
        .with_details(blockers.join("\n"))
    }

    pub fn subtasks_incomplete(count: usize) -> Self {
        Self::new(
            ErrorCode::SubtasksIncomplete,
            format!("Task has {} subtask(s) that are not completed", count),
        )
    }

    pub fn subtasks_present(count: usize) -> Self {
        Self::new(
            ErrorCode::SubtasksPresent,
            format!("Task has {} subtask(s); delete them first or cascade", count),
        )
    }

    pub fn cycle(task_id: &str, other: &str) -> Self {
        Self::new(
            ErrorCode::CycleDetected,
            format!("Linking {} to {} would create a cycle", task_id, other),
        )
    }

    pub fn no_active_project() -> Self {
        Self::new(
            ErrorCode::NoActiveProject,
            "No project_id given and no active project is set",
        )
        .with_field("project_id")
    }

    pub fn confirmation_required(expected: &str) -> Self {
        Self::new(
            ErrorCode::ConfirmationRequired,
            format!("Confirmation required: pass confirmation=\"{}\" or force=true", expected),
        )
        .with_field("confirmation")
    }

    pub fn low_confidence(confidence: f64, raw: &str) -> Self {
        Self::new(
            ErrorCode::LowConfidence,
            format!("Query confidence too low ({:.2}): {}", confidence, raw),
        )
    }

    pub fn unsupported_schema(found: &str, supported: &str) -> Self {
        Self::new(
            ErrorCode::UnsupportedSchemaVersion,
            format!(
                "Archive version {} is newer than supported version {}",
                found, supported
            ),
        )
    }

    pub fn unsupported_format(format: &str) -> Self {
        Self::new(
            ErrorCode::UnsupportedFormat,
            format!("Unsupported format: {} (expected json or csv)", format),
        )
        .with_field("format")
    }

    pub fn database(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::DatabaseError, err.to_string())
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InternalError, err.to_string())
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(ErrorCode::UnknownTool, format!("Unknown tool: {}", name))
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ToolError {}

// Allow using ? with anyhow errors by converting them
impl From<anyhow::Error> for ToolError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ToolError>() {
            Ok(tool_err) => tool_err,
            Err(err) => {
                if err.downcast_ref::<rusqlite::Error>().is_some() {
                    ToolError::database(err)
                } else {
                    ToolError::internal(err)
                }
            }
        }
    }
}

/// Extract the error code from an anyhow error, if it carries a `ToolError`.
pub fn error_code(err: &anyhow::Error) -> Option<ErrorCode> {
    err.downcast_ref::<ToolError>().map(|e| e.code)
}

/// Result type for tool operations.
pub type ToolResult<T> = std::result::Result<T, ToolError>;
