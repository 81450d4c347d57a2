//! Purpose: Single-line progress reports for migration, clear, and scan operations.
//! Exports: `StatusLine`, `ReportSink`, `TracingSink`, `status_json`, label constants.
//! Role: Shared contract between the library operations and whoever displays progress.
//! Invariants: Text form is `<label> :: for <count> contacts took <elapsedMs> milliseconds`.
//! Invariants: JSON form is additive-only once published.
use std::fmt;

use serde_json::{Map, Value, json};
use tracing::info;

pub const FIRST_CONTACT: &str = "first contact";
pub const SOURCE_DONE: &str = "enumerated source";
pub const FIRST_STORED: &str = "first contact from store";
pub const SCAN_DONE: &str = "scanned store";
pub const FILL_DONE: &str = "filled store";
pub const CLEAR_DONE: &str = "cleared store";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub label: String,
    pub count: u64,
    pub elapsed_ms: u64,
}

impl StatusLine {
    pub fn new(label: impl Into<String>, count: u64, elapsed_ms: u64) -> Self {
        Self {
            label: label.into(),
            count,
            elapsed_ms,
        }
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} :: for {} contacts took {} milliseconds",
            self.label, self.count, self.elapsed_ms
        )
    }
}

pub fn status_json(line: &StatusLine) -> Value {
    let mut inner = Map::new();
    inner.insert("label".to_string(), json!(line.label));
    inner.insert("count".to_string(), json!(line.count));
    inner.insert("elapsed_ms".to_string(), json!(line.elapsed_ms));
    inner.insert("text".to_string(), json!(line.to_string()));

    let mut outer = Map::new();
    outer.insert("status".to_string(), Value::Object(inner));
    Value::Object(outer)
}

/// Receives status lines as operations progress.
pub trait ReportSink {
    fn report(&mut self, line: StatusLine);
}

impl<F> ReportSink for F
where
    F: FnMut(StatusLine),
{
    fn report(&mut self, line: StatusLine) {
        self(line)
    }
}

/// Forwards status lines to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn report(&mut self, line: StatusLine) {
        info!(
            label = %line.label,
            count = line.count,
            elapsed_ms = line.elapsed_ms,
            "{line}"
        );
    }
}

pub(crate) fn elapsed_ms(start: std::time::Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
