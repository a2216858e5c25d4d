//! Export archive format.
//!
//! An archive is a single JSON document carrying projects, tasks, tags,
//! task-tag links, templates, dependency links and (optionally) AI
//! interactions. Archives may be written gzip-compressed; readers detect
//! compression from the magic bytes. A flat CSV rendering of the task list
//! is also provided.

use crate::error::ToolError;
use crate::types::{AiInteraction, Dependency, Project, Tag, Task, Template};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use thiserror::Error;

/// Archive format version written by this build.
pub const ARCHIVE_VERSION: &str = "1.0";

/// Highest archive major version this build can read.
pub const SUPPORTED_MAJOR: u32 = 1;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Errors raised while reading or writing archive files.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to access archive file: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("archive has no version")]
    MissingVersion,
    #[error("archive version '{0}' is not a valid version string")]
    BadVersion(String),
    #[error("archive version {found} is newer than supported version {supported}")]
    NewerVersion { found: String, supported: String },
}

impl From<ArchiveError> for ToolError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::NewerVersion { found, supported } => {
                ToolError::unsupported_schema(&found, &supported)
            }
            ArchiveError::MissingVersion | ArchiveError::BadVersion(_) => {
                ToolError::invalid_value("version", &err.to_string())
            }
            ArchiveError::Io(ref io) if io.kind() == std::io::ErrorKind::NotFound => {
                ToolError::new(crate::error::ErrorCode::FileNotFound, err.to_string())
            }
            other => ToolError::invalid_value("file_path", &other.to_string()),
        }
    }
}

/// Output format for exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Result<Self, ToolError> {
        match s.trim().to_lowercase().as_str() {
            "json" | "" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(ToolError::unsupported_format(other)),
        }
    }
}

/// Descriptive header of an archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    /// RFC3339 export timestamp.
    pub export_date: String,
    pub engine_version: String,
    pub database_version: String,
    pub total_tasks: usize,
    pub total_projects: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Task to tag association.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskTagLink {
    pub task_id: String,
    pub tag_id: String,
}

/// A complete export archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Archive {
    #[serde(default)]
    pub version: String,
    pub metadata: ArchiveMetadata,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub task_tags: Vec<TaskTagLink>,
    #[serde(default)]
    pub templates: Vec<Template>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ai_context: Vec<AiInteraction>,
}

impl Archive {
    /// Empty archive stamped with the current time and versions.
    pub fn new(exported_by: Option<String>, description: Option<String>) -> Self {
        Self {
            version: ARCHIVE_VERSION.to_string(),
            metadata: ArchiveMetadata {
                export_date: Utc::now().to_rfc3339(),
                engine_version: format!("taskflow-mcp v{}", env!("CARGO_PKG_VERSION")),
                database_version: crate::db::DATABASE_VERSION.to_string(),
                total_tasks: 0,
                total_projects: 0,
                exported_by,
                description,
            },
            projects: Vec::new(),
            tasks: Vec::new(),
            tags: Vec::new(),
            task_tags: Vec::new(),
            templates: Vec::new(),
            dependencies: Vec::new(),
            ai_context: Vec::new(),
        }
    }

    /// Check that the archive carries a version this build can read.
    pub fn check_version(&self) -> Result<(), ArchiveError> {
        let version = self.version.trim();
        if version.is_empty() {
            return Err(ArchiveError::MissingVersion);
        }
        let major: u32 = version
            .split('.')
            .next()
            .and_then(|m| m.parse().ok())
            .ok_or_else(|| ArchiveError::BadVersion(version.to_string()))?;
        if major > SUPPORTED_MAJOR {
            return Err(ArchiveError::NewerVersion {
                found: version.to_string(),
                supported: ARCHIVE_VERSION.to_string(),
            });
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, ArchiveError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load an archive from a file, plain JSON or gzip.
    pub fn from_file(path: &Path) -> Result<Self, ArchiveError> {
        let mut bytes = Vec::new();
        BufReader::new(std::fs::File::open(path)?).read_to_end(&mut bytes)?;

        if bytes.starts_with(&GZIP_MAGIC) {
            let decoder = flate2::read::GzDecoder::new(bytes.as_slice());
            Ok(serde_json::from_reader(decoder)?)
        } else {
            Ok(serde_json::from_slice(&bytes)?)
        }
    }

    pub fn to_json(&self, pretty: bool) -> Result<String, ArchiveError> {
        if pretty {
            Ok(serde_json::to_string_pretty(self)?)
        } else {
            Ok(serde_json::to_string(self)?)
        }
    }
}

/// Render an archive in the requested format.
pub fn render(archive: &Archive, format: ExportFormat, pretty: bool) -> Result<String, ArchiveError> {
    match format {
        ExportFormat::Json => archive.to_json(pretty),
        ExportFormat::Csv => Ok(to_csv(archive)),
    }
}

/// Write rendered output to a file, gzip-compressing when asked.
pub fn write_file(path: &Path, content: &str, gzip: bool) -> Result<(), ArchiveError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = std::fs::File::create(path)?;
    if gzip {
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        encoder.write_all(content.as_bytes())?;
        encoder.finish()?;
    } else {
        let mut file = file;
        file.write_all(content.as_bytes())?;
    }
    Ok(())
}

/// Whether a path should be written gzip-compressed.
pub fn wants_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// Quote a CSV value when it contains a comma, quote or newline.
pub fn escape_csv(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn rfc3339(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

pub const CSV_HEADER: &str = "ID,Title,Description,Status,Priority,Project,Created,Updated,Tags";

/// One row per task. Tag names are pipe-joined into a single cell.
pub fn to_csv(archive: &Archive) -> String {
    let project_names: HashMap<&str, &str> = archive
        .projects
        .iter()
        .map(|p| (p.id.as_str(), p.name.as_str()))
        .collect();
    let tag_names: HashMap<&str, &str> = archive
        .tags
        .iter()
        .map(|t| (t.id.as_str(), t.name.as_str()))
        .collect();
    let mut tags_by_task: HashMap<&str, Vec<&str>> = HashMap::new();
    for link in &archive.task_tags {
        if let Some(name) = tag_names.get(link.tag_id.as_str()) {
            tags_by_task.entry(link.task_id.as_str()).or_default().push(name);
        }
    }

    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for task in &archive.tasks {
        let project = task
            .project_id
            .as_deref()
            .and_then(|id| project_names.get(id).copied())
            .unwrap_or("");
        let mut tags = tags_by_task.get(task.id.as_str()).cloned().unwrap_or_default();
        tags.sort_unstable();

        let cells = [
            escape_csv(&task.id),
            escape_csv(&task.title),
            escape_csv(&task.description),
            task.status.as_str().to_string(),
            task.priority.as_str().to_string(),
            escape_csv(project),
            rfc3339(task.created_at),
            rfc3339(task.updated_at),
            escape_csv(&tags.join("|")),
        ];
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}
