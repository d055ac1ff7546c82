//! # Logging
//!
//! Structured logging for the message-exchange core.
//!
//! ## Philosophy
//!
//! Logging is explicit and structured, not text-based or printf-style.
//! Components receive a [`Logger`] handle at construction; there is no
//! global logger and no ambient sink. Tests assert on entries collected
//! by a [`MemoryLogSink`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational messages
    Info,
    /// Warnings
    Warn,
    /// Errors
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// A structured log entry
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Log level
    pub level: LogLevel,
    /// Component that produced the entry
    pub component: String,
    /// Log message
    pub message: String,
    /// Structured fields
    pub fields: Vec<(String, String)>,
}

impl LogEntry {
    /// Creates a new log entry
    pub fn new(level: LogLevel, component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            component: component.into(),
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Adds a field to the log entry
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// Looks up a field value by key
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Destination for log entries
pub trait LogSink {
    fn log(&self, entry: LogEntry);
}

/// Sink that discards everything
///
/// The default for components that were not handed an explicit logger.
#[derive(Debug, Default)]
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn log(&self, _entry: LogEntry) {}
}

/// Sink that collects entries in memory for inspection
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    entries: RefCell<Vec<LogEntry>>,
}

impl MemoryLogSink {
    /// Creates an empty memory sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all collected entries
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.borrow().clone()
    }

    /// Returns the number of entries at or above a level
    pub fn count_at_least(&self, level: LogLevel) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|e| e.level >= level)
            .count()
    }

    /// Removes and returns all collected entries
    pub fn drain(&self) -> Vec<LogEntry> {
        std::mem::take(&mut *self.entries.borrow_mut())
    }
}

impl LogSink for MemoryLogSink {
    fn log(&self, entry: LogEntry) {
        self.entries.borrow_mut().push(entry);
    }
}

/// Cloneable handle that components log through
///
/// Carries a component name, a minimum level and a shared sink.
#[derive(Clone)]
pub struct Logger {
    component: String,
    min_level: LogLevel,
    sink: Rc<dyn LogSink>,
}

impl Logger {
    /// Creates a logger writing to the given sink
    pub fn new(component: impl Into<String>, sink: Rc<dyn LogSink>) -> Self {
        Self {
            component: component.into(),
            min_level: LogLevel::Debug,
            sink,
        }
    }

    /// Creates a logger that discards everything
    pub fn disabled() -> Self {
        Self::new("", Rc::new(NullLogSink))
    }

    /// Sets the minimum level this handle forwards
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Derives a handle for a sub-component sharing the same sink
    pub fn scoped(&self, component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            min_level: self.min_level,
            sink: Rc::clone(&self.sink),
        }
    }

    /// Logs a prepared entry, applying the level filter
    pub fn log(&self, entry: LogEntry) {
        if entry.level >= self.min_level {
            self.sink.log(entry);
        }
    }

    /// Builds an entry at the given level for this component
    pub fn entry(&self, level: LogLevel, message: impl Into<String>) -> LogEntry {
        LogEntry::new(level, self.component.clone(), message)
    }

    /// Logs a debug message
    pub fn debug(&self, message: impl Into<String>) {
        self.log(self.entry(LogLevel::Debug, message));
    }

    /// Logs an info message
    pub fn info(&self, message: impl Into<String>) {
        self.log(self.entry(LogLevel::Info, message));
    }

    /// Logs a warning
    pub fn warn(&self, message: impl Into<String>) {
        self.log(self.entry(LogLevel::Warn, message));
    }

    /// Logs an error
    pub fn error(&self, message: impl Into<String>) {
        self.log(self.entry(LogLevel::Error, message));
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("component", &self.component)
            .field("min_level", &self.min_level)
            .finish()
    }
}
