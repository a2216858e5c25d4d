//! Import subcommand.
//!
//! Loads an archive (plain or gzip JSON) back into the store.

use crate::db::Database;
use crate::db::import::{ConflictPolicy, ImportMode, ImportOptions, ImportResult};
use crate::export::Archive;
use anyhow::{Result, anyhow};
use clap::Args;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

/// Arguments for the import subcommand
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Path to the export file to import
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Report conflicts without modifying the database
    #[arg(long)]
    pub dry_run: bool,

    /// Clear existing tasks, projects, tags and AI history first
    #[arg(long)]
    pub replace: bool,

    /// Conflict policy: skip, overwrite or prompt
    #[arg(long, default_value = "skip")]
    pub conflict: String,

    /// Assign fresh ids instead of keeping the archive's
    #[arg(long)]
    pub remap_ids: bool,

    /// Map an incoming project onto an existing one (OLD=NEW, repeatable)
    #[arg(long = "project-map", value_name = "OLD=NEW")]
    pub project_map: Vec<String>,
}

impl ImportArgs {
    pub fn options(&self) -> Result<ImportOptions> {
        Ok(ImportOptions {
            mode: if self.replace { ImportMode::Replace } else { ImportMode::Merge },
            conflict: ConflictPolicy::parse(&self.conflict)?,
            preserve_ids: !self.remap_ids,
            dry_run: self.dry_run,
            project_mapping: parse_project_map(&self.project_map)?,
        })
    }
}

fn parse_project_map(entries: &[String]) -> Result<HashMap<String, String>> {
    entries
        .iter()
        .map(|entry| {
            let (old, new) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("invalid --project-map '{}', expected OLD=NEW", entry))?;
            let (old, new) = (old.trim(), new.trim());
            if old.is_empty() || new.is_empty() {
                return Err(anyhow!("invalid --project-map '{}', expected OLD=NEW", entry));
            }
            Ok((old.to_string(), new.to_string()))
        })
        .collect()
}

pub fn run(db: &Database, args: &ImportArgs) -> Result<ImportResult> {
    let options = args.options()?;
    let archive = Archive::from_file(&args.file)?;
    info!(file = %args.file.display(), tasks = archive.tasks.len(), "importing archive");
    let result = db.import_archive(&archive, &options)?;

    let verb = if result.dry_run { "Would import" } else { "Imported" };
    eprintln!(
        "{} {} projects, {} tasks, {} tags, {} dependencies ({} conflicts, {} errors)",
        verb,
        result.imported_projects,
        result.imported_tasks,
        result.imported_tags,
        result.imported_dependencies,
        result.conflicts.len(),
        result.errors.len()
    );
    for error in &result.errors {
        eprintln!("error: {}", error);
    }
    for warning in &result.warnings {
        eprintln!("warning: {}", warning);
    }
    Ok(result)
}
