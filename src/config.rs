//! Configuration loading.

use crate::format::OutputFormat;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const ENV_DB_PATH: &str = "TASKFLOW_DB_PATH";
pub const ENV_INACTIVITY_TIMEOUT: &str = "TASKFLOW_INACTIVITY_TIMEOUT";
pub const ENV_LANG: &str = "TASKFLOW_LANG";

const LOCAL_CONFIG: &str = ".taskflow/config.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auto_state: AutoStateConfig,

    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub templates: TemplatesConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub watcher: WatcherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// `json` or `markdown`, used when a tool call names no format.
    #[serde(default = "default_format")]
    pub default_format: String,

    /// Response language for natural-language commands (`tr` or `en`).
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            default_format: default_format(),
            language: default_language(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".taskflow/taskflow.db")
}

fn default_format() -> String {
    "json".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoStateConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_secs: u64,
}

impl Default for AutoStateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            inactivity_timeout_secs: default_inactivity_timeout(),
        }
    }
}

impl AutoStateConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs.max(1))
    }
}

fn default_true() -> bool {
    true
}

fn default_inactivity_timeout() -> u64 {
    1800 // 30 minutes
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Default count for recent-interaction listings.
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,

    /// Interactions the context summary aggregates.
    #[serde(default = "default_summary_window")]
    pub summary_interaction_window: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            recent_limit: default_recent_limit(),
            summary_interaction_window: default_summary_window(),
        }
    }
}

fn default_recent_limit() -> usize {
    10
}

fn default_summary_window() -> usize {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    #[serde(default = "default_true")]
    pub seed_defaults: bool,

    /// Preferred language when an alias exists in several languages.
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            seed_defaults: true,
            language: default_language(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_true")]
    pub pretty: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { pretty: true }
    }
}

/// File activity tracking for watched task files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Quiet period that coalesces rapid changes to one event.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Start a pending task when one of its files changes.
    #[serde(default = "default_true")]
    pub auto_update_status: bool,

    /// Extensions (without the dot) that count as activity. Empty accepts every file.
    #[serde(default = "default_watched_extensions")]
    pub extensions: Vec<String>,

    /// Path components to skip: exact names or `*suffix` patterns.
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    /// Base for relative watch paths. The working directory when unset.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce_ms(),
            auto_update_status: true,
            extensions: default_watched_extensions(),
            ignore_patterns: default_ignore_patterns(),
            root: None,
        }
    }
}

impl WatcherConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.max(10))
    }
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_watched_extensions() -> Vec<String> {
    [
        "rs", "go", "js", "ts", "py", "java", "cpp", "c", "h", "md", "txt", "json", "yaml", "yml", "toml",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_ignore_patterns() -> Vec<String> {
    [
        "node_modules", ".git", ".vscode", "vendor", "build", "dist", "target", "*.tmp", "*.log", "*.swp",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Load from `explicit` if given, else the first config found in the
    /// working directory or the user config directory, else defaults.
    /// Environment overrides are applied last.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => Self::discover().unwrap_or_default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn discover() -> Option<Self> {
        let mut candidates = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("taskflow").join("config.yaml"));
        }
        candidates.into_iter().find_map(|path| {
            let config = Self::load(&path).ok()?;
            debug!(path = %path.display(), "config loaded");
            Some(config)
        })
    }

    /// Apply `TASKFLOW_*` overrides read through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(db_path) = var(ENV_DB_PATH).filter(|v| !v.trim().is_empty()) {
            self.server.db_path = PathBuf::from(db_path);
        }

        if let Some(timeout) = var(ENV_INACTIVITY_TIMEOUT) {
            if let Ok(secs) = timeout.trim().parse() {
                self.auto_state.inactivity_timeout_secs = secs;
            }
        }

        if let Some(lang) = var(ENV_LANG).filter(|v| !v.trim().is_empty()) {
            self.server.language = lang.trim().to_lowercase();
        }
    }

    pub fn output_format(&self) -> OutputFormat {
        OutputFormat::parse(&self.server.default_format).unwrap_or(OutputFormat::Json)
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.server.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}
