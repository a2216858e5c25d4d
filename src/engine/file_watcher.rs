//! File activity tracking.
//!
//! Directories holding watched files are registered with a debounced
//! filesystem watcher. A change to a watched path, or to anything below a
//! watched directory, is logged on every owning task and counts as an
//! access: pending tasks start and running tasks get their inactivity timer
//! reset.

use super::ai_context::AiContextTracker;
use super::auto_state::AutoStateManager;
use super::tasks::TaskEngine;
use crate::config::WatcherConfig;
use crate::types::{FileWatch, Task};
use anyhow::{Result, anyhow};
use notify::RecursiveMode;
use notify_debouncer_mini::{DebouncedEvent, DebouncedEventKind, Debouncer, new_debouncer};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

type NotifyResult = std::result::Result<Vec<DebouncedEvent>, notify::Error>;

struct Running {
    debouncer: Debouncer<notify::RecommendedWatcher>,
    dirs: HashSet<PathBuf>,
}

fn pattern_matches(pattern: &str, name: &str) -> bool {
    match pattern.strip_prefix('*') {
        Some(suffix) => name.ends_with(suffix),
        None => name == pattern,
    }
}

/// Whether a changed path is noise: a filtered extension or an ignored
/// path component.
pub fn is_ignored(config: &WatcherConfig, path: &Path) -> bool {
    if !config.extensions.is_empty() {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let wanted = config
            .extensions
            .iter()
            .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(ext));
        if !wanted {
            return true;
        }
    }
    path.components()
        .filter_map(|c| c.as_os_str().to_str())
        .any(|part| config.ignore_patterns.iter().any(|p| pattern_matches(p, part)))
}

#[derive(Clone)]
pub struct FileWatcher {
    tasks: TaskEngine,
    tracker: AiContextTracker,
    auto_state: AutoStateManager,
    config: Arc<WatcherConfig>,
    root: PathBuf,
    running: Arc<Mutex<Option<Running>>>,
}

impl FileWatcher {
    pub fn new(
        tasks: TaskEngine,
        tracker: AiContextTracker,
        auto_state: AutoStateManager,
        config: WatcherConfig,
    ) -> Self {
        let root = config
            .root
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            tasks,
            tracker,
            auto_state,
            config: Arc::new(config),
            root,
            running: Arc::new(Mutex::new(None)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Running>>> {
        self.running.lock().map_err(|_| anyhow!("file watcher mutex poisoned"))
    }

    /// Absolute form of a stored watch path.
    pub fn resolve(&self, file_path: &str) -> PathBuf {
        let path = Path::new(file_path.trim());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().is_ok_and(|running| running.is_some())
    }

    /// Directories currently registered with the OS watcher.
    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        let Ok(running) = self.lock() else {
            return Vec::new();
        };
        let mut dirs: Vec<PathBuf> = running
            .as_ref()
            .map(|r| r.dirs.iter().cloned().collect())
            .unwrap_or_default();
        dirs.sort();
        dirs
    }

    /// Start watching every stored path. Needs a tokio runtime; a disabled
    /// watcher does nothing.
    pub fn start(&self) -> Result<()> {
        if !self.config.enabled {
            info!("file watcher disabled");
            return Ok(());
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| anyhow!("file watcher needs an async runtime"))?;

        let (notify_tx, notify_rx) = mpsc::channel::<NotifyResult>();
        let debouncer = new_debouncer(self.config.debounce(), notify_tx)?;
        *self.lock()? = Some(Running {
            debouncer,
            dirs: HashSet::new(),
        });

        let watcher = self.clone();
        runtime.spawn_blocking(move || watcher.process_events(notify_rx));
        self.sync()?;
        info!(root = %self.root.display(), dirs = self.watched_dirs().len(), "file watcher started");
        Ok(())
    }

    /// Stop watching. Dropping the debouncer closes the event channel, which
    /// ends the processing loop.
    pub fn stop(&self) {
        match self.lock() {
            Ok(mut running) => {
                if running.take().is_some() {
                    debug!("file watcher stopped");
                }
            }
            Err(e) => warn!(error = %e, "file watcher not stopped"),
        }
    }

    /// Directory to register for each stored watch, and whether it is
    /// watched recursively. Paths that do not exist yet are skipped.
    fn wanted_dirs(&self, watches: &[FileWatch]) -> BTreeMap<PathBuf, RecursiveMode> {
        let mut wanted = BTreeMap::new();
        for watch in watches {
            let path = self.resolve(&watch.file_path);
            if path.is_dir() {
                wanted.insert(path, RecursiveMode::Recursive);
            } else if let Some(parent) = path.parent().filter(|p| p.is_dir()) {
                wanted
                    .entry(parent.to_path_buf())
                    .or_insert(RecursiveMode::NonRecursive);
            } else {
                debug!(path = %path.display(), "watched path missing, not registered");
            }
        }
        wanted
    }

    /// Bring the OS watcher in line with the stored watches.
    pub fn sync(&self) -> Result<()> {
        let watches = self.tasks.db().list_file_watches(None)?;
        let wanted = self.wanted_dirs(&watches);

        let mut guard = self.lock()?;
        let Some(running) = guard.as_mut() else {
            return Ok(());
        };

        let stale: Vec<PathBuf> = running
            .dirs
            .iter()
            .filter(|dir| !wanted.contains_key(*dir))
            .cloned()
            .collect();
        for dir in stale {
            if let Err(e) = running.debouncer.watcher().unwatch(&dir) {
                debug!(dir = %dir.display(), error = %e, "unwatch failed");
            }
            running.dirs.remove(&dir);
        }

        for (dir, mode) in wanted {
            if running.dirs.contains(&dir) {
                continue;
            }
            match running.debouncer.watcher().watch(&dir, mode) {
                Ok(()) => {
                    debug!(dir = %dir.display(), "watching directory");
                    running.dirs.insert(dir);
                }
                Err(e) => warn!(dir = %dir.display(), error = %e, "cannot watch directory"),
            }
        }
        Ok(())
    }

    fn process_events(&self, rx: mpsc::Receiver<NotifyResult>) {
        loop {
            match rx.recv() {
                Ok(Ok(events)) => {
                    let mut seen: HashSet<PathBuf> = HashSet::new();
                    for event in events {
                        if !matches!(event.kind, DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous) {
                            continue;
                        }
                        if seen.insert(event.path.clone()) {
                            if let Err(e) = self.on_file_change(&event.path) {
                                warn!(path = %event.path.display(), error = %e, "file change not applied");
                            }
                        }
                    }
                }
                Ok(Err(e)) => error!("File watcher error: {}", e),
                Err(_) => {
                    info!("file watcher channel closed, stopping");
                    return;
                }
            }
        }
    }

    /// Apply a change to `path` to every task watching it or a directory
    /// above it. Returns the touched tasks as they are afterwards.
    pub fn on_file_change(&self, path: &Path) -> Result<Vec<Task>> {
        if is_ignored(&self.config, path) {
            return Ok(Vec::new());
        }

        let mut owners: Vec<String> = Vec::new();
        for watch in self.tasks.db().list_file_watches(None)? {
            if path.starts_with(self.resolve(&watch.file_path)) && !owners.contains(&watch.task_id) {
                owners.push(watch.task_id);
            }
        }

        let mut touched = Vec::new();
        for task_id in owners {
            match self.touch(&task_id, path) {
                Ok(task) => touched.push(task),
                Err(e) => warn!(task_id = %task_id, error = %e, "file change not applied to task"),
            }
        }
        if !touched.is_empty() {
            info!(path = %path.display(), tasks = touched.len(), "file change applied");
        }
        Ok(touched)
    }

    fn touch(&self, task_id: &str, path: &Path) -> Result<Task> {
        self.tracker.record_interaction(
            task_id,
            "file_change",
            json!({ "path": path.display().to_string(), "auto_generated": true }),
        )?;
        if self.config.auto_update_status {
            self.auto_state.on_access(task_id)
        } else {
            self.tasks.get(task_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_and_component_filters() {
        let config = WatcherConfig::default();
        assert!(!is_ignored(&config, Path::new("/w/src/lib.rs")));
        assert!(is_ignored(&config, Path::new("/w/src/image.png")));
        assert!(is_ignored(&config, Path::new("/w/node_modules/pkg/index.js")));
        assert!(is_ignored(&config, Path::new("/w/target/debug/build.rs")));
        assert!(is_ignored(&config, Path::new("/w/notes.md.swp")));

        let everything = WatcherConfig {
            extensions: Vec::new(),
            ignore_patterns: Vec::new(),
            ..Default::default()
        };
        assert!(!is_ignored(&everything, Path::new("/w/Makefile")));
    }

    #[test]
    fn star_patterns_match_suffixes() {
        assert!(pattern_matches("*.log", "server.log"));
        assert!(!pattern_matches("*.log", "logbook"));
        assert!(pattern_matches(".git", ".git"));
        assert!(!pattern_matches(".git", ".github"));
    }
}
