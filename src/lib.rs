//! Taskflow MCP Server Library
//!
//! This module exports the core components for testing and integration.

pub mod cli;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod export;
pub mod format;
pub mod ide_config;
pub mod logging;
pub mod tools;
pub mod types;
