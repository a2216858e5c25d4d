//! Export subcommand.
//!
//! Writes the store as a versioned JSON archive (or a CSV task list) to a
//! file or stdout.

use crate::db::Database;
use crate::db::export::ExportOptions;
use crate::export::{self, ExportFormat};
use anyhow::Result;
use clap::Args;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

/// Arguments for the export subcommand
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output file path (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format: json or csv
    #[arg(long, default_value = "json")]
    pub format: String,

    /// Force gzip compression (auto-detected from .gz extension otherwise)
    #[arg(long)]
    pub gzip: bool,

    /// Only export these projects (repeatable)
    #[arg(long = "project", value_name = "ID")]
    pub projects: Vec<String>,

    /// Leave completed tasks out
    #[arg(long)]
    pub exclude_completed: bool,

    /// Leave dependency links out
    #[arg(long)]
    pub no_dependencies: bool,

    /// Include templates
    #[arg(long)]
    pub templates: bool,

    /// Include the AI interaction log
    #[arg(long)]
    pub ai_context: bool,

    /// Free-form description stored in the archive metadata
    #[arg(long)]
    pub description: Option<String>,
}

impl ExportArgs {
    pub fn options(&self) -> ExportOptions {
        ExportOptions {
            project_ids: self.projects.clone(),
            include_completed: !self.exclude_completed,
            include_dependencies: !self.no_dependencies,
            include_templates: self.templates,
            include_ai_context: self.ai_context,
            exported_by: Some("cli".to_string()),
            description: self.description.clone(),
            ..Default::default()
        }
    }

    /// Determine if output should be compressed based on args and filename
    pub fn should_compress(&self) -> bool {
        self.gzip || self.output.as_deref().is_some_and(export::wants_gzip)
    }
}

pub fn run(db: &Database, args: &ExportArgs, pretty: bool) -> Result<()> {
    let format = ExportFormat::parse(&args.format)?;
    let outcome = db.export_archive(&args.options())?;
    for warning in &outcome.warnings {
        eprintln!("warning: {}", warning);
    }
    let content = export::render(&outcome.archive, format, pretty)?;

    match args.output {
        Some(ref path) => {
            let gzip = args.should_compress();
            export::write_file(path, &content, gzip)?;
            info!(path = %path.display(), gzip, tasks = outcome.archive.metadata.total_tasks, "export written");
            eprintln!(
                "Exported {} tasks and {} projects to {}",
                outcome.archive.metadata.total_tasks,
                outcome.archive.metadata.total_projects,
                path.display()
            );
        }
        None => {
            if args.gzip {
                anyhow::bail!("--gzip needs --output");
            }
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(content.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ExportArgs {
        ExportArgs {
            output: None,
            format: "json".into(),
            gzip: false,
            projects: Vec::new(),
            exclude_completed: false,
            no_dependencies: false,
            templates: false,
            ai_context: false,
            description: None,
        }
    }

    #[test]
    fn compression_follows_flag_or_extension() {
        assert!(!args().should_compress());

        let mut by_flag = args();
        by_flag.gzip = true;
        assert!(by_flag.should_compress());

        let mut by_ext = args();
        by_ext.output = Some(PathBuf::from("backup.json.gz"));
        assert!(by_ext.should_compress());
    }

    #[test]
    fn flags_map_to_options() {
        let mut a = args();
        a.exclude_completed = true;
        a.no_dependencies = true;
        a.projects = vec!["p1".into()];
        let options = a.options();
        assert!(!options.include_completed);
        assert!(!options.include_dependencies);
        assert_eq!(options.project_ids, vec!["p1"]);
    }

    #[test]
    fn writes_gzip_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let mut a = args();
        a.output = Some(dir.path().join("out.json.gz"));
        run(&db, &a, true).unwrap();

        let archive = crate::export::Archive::from_file(&dir.path().join("out.json.gz")).unwrap();
        assert_eq!(archive.version, crate::export::ARCHIVE_VERSION);
    }
}
