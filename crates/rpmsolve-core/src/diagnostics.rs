//! Diagnostic sinks.
//!
//! Resolution components never talk to a global logger; they receive an
//! `Arc<dyn DiagnosticSink>` and emit through it. Without one they stay
//! silent. [`LogSink`] forwards to the `log` facade so a binary can route
//! everything through its logger of choice.

use std::sync::{Arc, Mutex};

pub use log::Level;

pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, level: Level, target: &str, message: &str);
}

/// Shared handle passed into the state machine and the solver.
pub type Diagnostics = Arc<dyn DiagnosticSink>;

/// Forwards every record to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn emit(&self, level: Level, target: &str, message: &str) {
        log::log!(target: target, level, "{}", message);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn emit(&self, _level: Level, _target: &str, _message: &str) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub level: Level,
    pub target: String,
    pub message: String,
}

/// Keeps records in memory, mostly for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<Record>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<Record> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Whether any record at `level` contains `needle`.
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.records()
            .iter()
            .any(|r| r.level == level && r.message.contains(needle))
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&self, level: Level, target: &str, message: &str) {
        let record = Record {
            level,
            target: target.to_string(),
            message: message.to_string(),
        };
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}

/// Sink used until a caller passes one in.
pub(crate) fn null_sink() -> Diagnostics {
    Arc::new(NullSink)
}
