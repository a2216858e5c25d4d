//! Logging that reaches both the local tracing subscriber and the MCP client.
//!
//! The client picks its minimum level with `logging/setLevel`; the level is
//! kept in an atomic so every clone of the [`Logger`] sees the change.

use crate::error::ToolError;
use rmcp::{
    RoleServer,
    model::{LoggingLevel, LoggingMessageNotificationParam},
    service::Peer,
};
use serde_json::{Value, json};
use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};
use tracing::Level;

/// Minimum level for client notifications, ordered Debug (0) to Emergency (7).
pub struct LogLevelFilter(AtomicU8);

impl LogLevelFilter {
    pub fn new(level: LoggingLevel) -> Self {
        Self(AtomicU8::new(level_rank(level)))
    }

    pub fn get(&self) -> LoggingLevel {
        LEVELS[self.0.load(Ordering::Relaxed).min(7) as usize]
    }

    pub fn set(&self, level: LoggingLevel) {
        self.0.store(level_rank(level), Ordering::Relaxed);
    }

    pub fn should_log(&self, level: LoggingLevel) -> bool {
        level_rank(level) >= self.0.load(Ordering::Relaxed)
    }
}

impl Default for LogLevelFilter {
    fn default() -> Self {
        Self::new(LoggingLevel::Info)
    }
}

const LEVELS: [LoggingLevel; 8] = [
    LoggingLevel::Debug,
    LoggingLevel::Info,
    LoggingLevel::Notice,
    LoggingLevel::Warning,
    LoggingLevel::Error,
    LoggingLevel::Critical,
    LoggingLevel::Alert,
    LoggingLevel::Emergency,
];

fn level_rank(level: LoggingLevel) -> u8 {
    LEVELS.iter().position(|l| *l == level).unwrap_or(0) as u8
}

/// Map an MCP level onto the tracing levels.
pub fn logging_level_to_tracing(level: LoggingLevel) -> Level {
    match level {
        LoggingLevel::Debug => Level::DEBUG,
        LoggingLevel::Info | LoggingLevel::Notice => Level::INFO,
        LoggingLevel::Warning => Level::WARN,
        LoggingLevel::Error | LoggingLevel::Critical | LoggingLevel::Alert | LoggingLevel::Emergency => {
            Level::ERROR
        }
    }
}

/// Logger that writes to tracing and, once a client is attached, sends the
/// same message as a `notifications/message`.
#[derive(Clone)]
pub struct Logger {
    peer: Option<Peer<RoleServer>>,
    level_filter: Arc<LogLevelFilter>,
    name: String,
}

impl Logger {
    pub fn new(level_filter: Arc<LogLevelFilter>) -> Self {
        Self {
            peer: None,
            level_filter,
            name: "taskflow".to_string(),
        }
    }

    pub fn with_peer(mut self, peer: Peer<RoleServer>) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn log(&self, level: LoggingLevel, message: &str, data: Option<Value>) {
        let name = self.name.as_str();
        match logging_level_to_tracing(level) {
            Level::ERROR => tracing::error!(logger = name, "{}", message),
            Level::WARN => tracing::warn!(logger = name, "{}", message),
            Level::INFO => tracing::info!(logger = name, "{}", message),
            _ => tracing::debug!(logger = name, "{}", message),
        }

        if !self.level_filter.should_log(level) {
            return;
        }
        let Some(ref peer) = self.peer else {
            return;
        };
        // Notifications need a runtime; outside one they are dropped.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let param = LoggingMessageNotificationParam {
            level,
            logger: Some(self.name.clone()),
            data: data.unwrap_or_else(|| json!({ "message": message })),
        };
        let peer = peer.clone();
        runtime.spawn(async move {
            let _ = peer.notify_logging_message(param).await;
        });
    }

    /// Report a failed tool call with its structured error.
    pub fn tool_failure(&self, tool: &str, err: &ToolError) {
        self.log(
            LoggingLevel::Warning,
            &format!("{} failed: {}", tool, err.message),
            Some(json!({ "tool": tool, "error": err })),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_threshold() {
        let filter = LogLevelFilter::new(LoggingLevel::Warning);
        assert!(!filter.should_log(LoggingLevel::Info));
        assert!(filter.should_log(LoggingLevel::Warning));
        assert!(filter.should_log(LoggingLevel::Emergency));

        filter.set(LoggingLevel::Debug);
        assert!(filter.should_log(LoggingLevel::Debug));
        assert_eq!(filter.get(), LoggingLevel::Debug);
    }

    #[test]
    fn every_level_roundtrips() {
        for level in LEVELS {
            assert_eq!(LogLevelFilter::new(level).get(), level);
        }
    }

    #[test]
    fn tracing_mapping() {
        assert_eq!(logging_level_to_tracing(LoggingLevel::Notice), Level::INFO);
        assert_eq!(logging_level_to_tracing(LoggingLevel::Alert), Level::ERROR);
    }

    #[test]
    fn logging_without_peer_is_silent() {
        let logger = Logger::new(Arc::new(LogLevelFilter::default())).with_name("test");
        logger.tool_failure("get_task", &ToolError::task_not_found("x"));
        logger.log(LoggingLevel::Info, "still fine", None);
    }
}
