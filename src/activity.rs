//! Activity log: the timestamped lines a display surface shows.
//!
//! The core never keeps lines itself. It reports through a [`Reporter`],
//! which writes one `tracing` event and hands one [`LogLine`] to whatever
//! [`ActivityLog`] the entry point injected. Retention is the sink's business.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    /// Unrecoverable for the supervisor; rendered with a distinct tag.
    Fatal,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
        };
        f.write_str(tag)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub component: &'static str,
    pub text: String,
}

impl LogLine {
    pub fn new(level: LogLevel, component: &'static str, text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            component,
            text: text.into(),
        }
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - [{}] {}: {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.level,
            self.component,
            self.text
        )
    }
}

/// Receives every line the core reports, in emission order.
pub trait ActivityLog: Send + Sync {
    fn emit(&self, line: LogLine);
}

/// Unbounded in-memory sink; cloning shares the same buffer.
#[derive(Clone, Default)]
pub struct LogBuffer {
    lines: Arc<Mutex<Vec<LogLine>>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<LogLine> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Return the lines whose text contains `needle`.
    pub fn matching(&self, needle: &str) -> Vec<LogLine> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|line| line.text.contains(needle))
            .cloned()
            .collect()
    }

    pub fn count_level(&self, level: LogLevel) -> usize {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|line| line.level == level)
            .count()
    }
}

impl ActivityLog for LogBuffer {
    fn emit(&self, line: LogLine) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
    }
}

/// Structured logging handle for one component.
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn ActivityLog>,
    component: &'static str,
}

impl Reporter {
    pub fn new(sink: Arc<dyn ActivityLog>, component: &'static str) -> Self {
        Self { sink, component }
    }

    /// Create a reporter with the same sink and a different component tag.
    pub fn scoped(&self, component: &'static str) -> Self {
        Self {
            sink: self.sink.clone(),
            component,
        }
    }

    pub fn info(&self, text: impl Into<String>) {
        let text = text.into();
        info!(component = self.component, "{}", text);
        self.sink.emit(LogLine::new(LogLevel::Info, self.component, text));
    }

    pub fn warn(&self, text: impl Into<String>) {
        let text = text.into();
        warn!(component = self.component, "{}", text);
        self.sink.emit(LogLine::new(LogLevel::Warn, self.component, text));
    }

    pub fn error(&self, text: impl Into<String>) {
        let text = text.into();
        error!(component = self.component, "{}", text);
        self.sink.emit(LogLine::new(LogLevel::Error, self.component, text));
    }

    pub fn fatal(&self, text: impl Into<String>) {
        let text = text.into();
        error!(component = self.component, fatal = true, "{}", text);
        self.sink.emit(LogLine::new(LogLevel::Fatal, self.component, text));
    }
}
