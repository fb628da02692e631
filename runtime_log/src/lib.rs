//! # Runtime Logger
//!
//! This crate captures structured log records emitted through the `log`
//! facade.
//!
//! ## Philosophy
//!
//! Logging is explicit and structured, not text-based or printf-style.
//! The runtime core only ever calls `log::debug!` and friends; whoever
//! starts the runtime decides where records go. [`MemoryLogger`] keeps
//! the most recent records in a bounded buffer so tests and diagnostics
//! can inspect them after the fact.

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Mutex;
use std::collections::VecDeque;

/// A structured log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Log level
    pub level: Level,
    /// Emitting component (module path unless overridden)
    pub target: String,
    /// Log message
    pub message: String,
    /// Structured fields
    pub fields: Vec<(String, String)>,
}

impl LogEntry {
    /// Creates a new log entry
    pub fn new(level: Level, target: &str, message: String) -> Self {
        Self {
            level,
            target: target.to_string(),
            message,
            fields: Vec::new(),
        }
    }

    /// Adds a field to the log entry
    pub fn with_field(mut self, key: &str, value: String) -> Self {
        self.fields.push((key.to_string(), value));
        self
    }

    /// Looks up a field by key
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn from_record(record: &Record<'_>) -> Self {
        let mut entry = Self::new(
            record.level(),
            record.target(),
            record.args().to_string(),
        );
        if let Some(module) = record.module_path() {
            entry = entry.with_field("module", module.to_string());
        }
        if let (Some(file), Some(line)) = (record.file(), record.line()) {
            entry = entry.with_field("location", format!("{}:{}", file, line));
        }
        entry
    }
}

/// Logger that keeps the most recent entries in memory
pub struct MemoryLogger {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    max_level: LevelFilter,
    echo: bool,
}

impl MemoryLogger {
    /// Creates a logger that retains up to `capacity` entries at `Debug` and above
    pub const fn new(capacity: usize) -> Self {
        Self::configured(capacity, LevelFilter::Debug, false)
    }

    /// Creates a logger with an explicit level filter and optional echo to stderr
    pub const fn configured(capacity: usize, max_level: LevelFilter, echo: bool) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity,
            max_level,
            echo,
        }
    }

    /// Returns a copy of the retained entries, oldest first
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Removes and returns every retained entry
    pub fn drain(&self) -> Vec<LogEntry> {
        self.entries.lock().drain(..).collect()
    }

    /// Returns true if any retained entry matches
    pub fn contains<F>(&self, predicate: F) -> bool
    where
        F: Fn(&LogEntry) -> bool,
    {
        self.entries.lock().iter().any(predicate)
    }

    /// Number of retained entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true when nothing is retained
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, entry: LogEntry) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }
}

impl Log for MemoryLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let entry = LogEntry::from_record(record);
        if self.echo {
            eprintln!("[{:<5}] {}: {}", entry.level, entry.target, entry.message);
        }
        self.push(entry);
    }

    fn flush(&self) {}
}

/// Installs `logger` as the process-wide `log` backend
pub fn install(logger: &'static MemoryLogger) -> Result<(), SetLoggerError> {
    log::set_logger(logger)?;
    log::set_max_level(logger.max_level);
    Ok(())
}
