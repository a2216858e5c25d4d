//! CLI command definitions for taskflow-mcp
//!
//! The main entry point is the `Cli` struct; without a subcommand the MCP
//! server runs on stdio.

pub mod export;
pub mod import;

use crate::config::Config;
use crate::db::Database;
use crate::engine::templates::TemplateEngine;
use crate::engine::tasks::TaskEngine;
use crate::ide_config::IdeConfigStore;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use export::ExportArgs;
use import::ImportArgs;
use std::path::PathBuf;

/// Taskflow MCP server and CLI tools
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to database file (overrides config and environment)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the MCP server (default if no subcommand given)
    Serve,

    /// Export tasks, projects and links to an archive
    Export(ExportArgs),

    /// Import an archive
    Import(ImportArgs),

    /// List the available templates
    Templates,

    /// Show or change IDE extension preferences
    IdeConfig(IdeConfigArgs),
}

#[derive(Args, Debug)]
pub struct IdeConfigArgs {
    /// Print the current preferences
    #[arg(long)]
    pub show: bool,

    #[arg(long, value_name = "BOOL")]
    pub auto_install: Option<bool>,

    #[arg(long, value_name = "BOOL")]
    pub auto_update: Option<bool>,

    /// Preferences file (default: ~/.taskflow/ide-config.json)
    #[arg(long, value_name = "FILE")]
    pub path: Option<PathBuf>,
}

impl Cli {
    /// Load the configuration with environment and `--database` overrides applied.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_or_default(self.config.as_deref())?;
        if let Some(ref db_path) = self.database {
            config.server.db_path = PathBuf::from(db_path);
        }
        Ok(config)
    }
}

/// Print the templates for the configured language, seeding defaults first.
pub fn run_templates(db: Database, config: &Config) -> Result<()> {
    let templates = TemplateEngine::new(TaskEngine::new(db), config.templates.language.clone());
    templates.seed_defaults()?;
    let list = templates.list(None, false)?;
    if list.is_empty() {
        println!("No templates.");
    }
    for template in list {
        let required: Vec<&str> = template
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();
        println!(
            "{:<20} {:<12} {}{}",
            template.alias.as_deref().unwrap_or(&template.id),
            template.category,
            template.name,
            if required.is_empty() {
                String::new()
            } else {
                format!(" (requires: {})", required.join(", "))
            }
        );
    }
    Ok(())
}

pub fn run_ide_config(args: &IdeConfigArgs) -> Result<()> {
    let mut store = match args.path {
        Some(ref path) => IdeConfigStore::open(path)?,
        None => IdeConfigStore::open_default()?,
    };
    if let Some(enabled) = args.auto_install {
        store.set_auto_install(enabled)?;
    }
    if let Some(enabled) = args.auto_update {
        store.set_auto_update(enabled)?;
    }
    let changed = args.auto_install.is_some() || args.auto_update.is_some();
    if args.show || !changed {
        println!("{}", serde_json::to_string_pretty(store.config())?);
    } else {
        eprintln!("Saved {}", store.path().display());
    }
    Ok(())
}
