//! IDE extension preferences stored as JSON next to the user's data.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const FILE_NAME: &str = "ide-config.json";
const EXTENSION_ID: &str = "taskflow.taskflow-vscode";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeConfig {
    #[serde(default)]
    pub auto_install: bool,
    #[serde(default)]
    pub auto_update: bool,
    /// Seconds between update checks.
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    #[serde(default = "default_supported_ides")]
    pub supported_ides: Vec<String>,
    #[serde(default = "default_extension_id")]
    pub extension_id: String,
    #[serde(default)]
    pub disable_prompts: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_check: Option<DateTime<Utc>>,
}

impl Default for IdeConfig {
    fn default() -> Self {
        Self {
            auto_install: false,
            auto_update: false,
            check_interval: default_check_interval(),
            supported_ides: default_supported_ides(),
            extension_id: default_extension_id(),
            disable_prompts: false,
            last_update_check: None,
        }
    }
}

fn default_check_interval() -> u64 {
    86_400 // one day
}

fn default_supported_ides() -> Vec<String> {
    ["vscode", "cursor", "windsurf"].map(String::from).to_vec()
}

fn default_extension_id() -> String {
    EXTENSION_ID.to_string()
}

/// `<home>/.taskflow/ide-config.json`
pub fn default_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(home.join(".taskflow").join(FILE_NAME))
}

/// Preferences bound to the file they persist to.
pub struct IdeConfigStore {
    path: PathBuf,
    config: IdeConfig,
}

impl IdeConfigStore {
    /// Open the store at `path`, writing defaults if the file is missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?
        } else {
            info!(path = %path.display(), "creating default IDE config");
            let config = IdeConfig::default();
            write(&path, &config)?;
            config
        };
        Ok(Self { path, config })
    }

    pub fn open_default() -> Result<Self> {
        Self::open(default_path()?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &IdeConfig {
        &self.config
    }

    pub fn set_auto_install(&mut self, enabled: bool) -> Result<()> {
        self.update(|c| c.auto_install = enabled)
    }

    pub fn set_auto_update(&mut self, enabled: bool) -> Result<()> {
        self.update(|c| c.auto_update = enabled)
    }

    pub fn set_disable_prompts(&mut self, disabled: bool) -> Result<()> {
        self.update(|c| c.disable_prompts = disabled)
    }

    pub fn mark_update_checked(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.update(|c| c.last_update_check = Some(at))
    }

    /// Whether `check_interval` has elapsed since the last check.
    pub fn update_due(&self, now: DateTime<Utc>) -> bool {
        match self.config.last_update_check {
            Some(last) => (now - last).num_seconds() >= self.config.check_interval as i64,
            None => true,
        }
    }

    fn update(&mut self, change: impl FnOnce(&mut IdeConfig)) -> Result<()> {
        change(&mut self.config);
        write(&self.path, &self.config)?;
        debug!(path = %self.path.display(), "IDE config saved");
        Ok(())
    }
}

fn write(path: &Path, config: &IdeConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(FILE_NAME);

        let store = IdeConfigStore::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.config(), &IdeConfig::default());
        assert_eq!(store.config().supported_ides, vec!["vscode", "cursor", "windsurf"]);
    }

    #[test]
    fn setters_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FILE_NAME);

        let mut store = IdeConfigStore::open(&path).unwrap();
        store.set_auto_install(true).unwrap();
        store.set_auto_update(true).unwrap();

        let reopened = IdeConfigStore::open(&path).unwrap();
        assert!(reopened.config().auto_install);
        assert!(reopened.config().auto_update);
        assert_eq!(reopened.config().check_interval, 86_400);
    }

    #[test]
    fn update_check_interval() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = IdeConfigStore::open(dir.path().join(FILE_NAME)).unwrap();
        let now = Utc::now();
        assert!(store.update_due(now));

        store.mark_update_checked(now).unwrap();
        assert!(!store.update_due(now + Duration::hours(1)));
        assert!(store.update_due(now + Duration::days(2)));
    }
}
