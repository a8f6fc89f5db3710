// gate-acceptor-runner/src/events.rs
// ============================================================================
// Module: Operational Event Logs
// Description: JSON-lines event logs for stderr, files, and tests.
// Purpose: Route runner events without a hard logging dependency.
// Dependencies: gate-acceptor-core, serde_json
// ============================================================================

//! ## Overview
//! Every log writes one JSON object per line and filters by a minimum
//! [`LogLevel`]. [`TeeEventLog`] fans one event out to several logs, which is
//! how a run mirrors its events to stderr and to `events.log` in the run
//! directory at once.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use gate_acceptor_core::EventLog;
use gate_acceptor_core::LogEvent;
use gate_acceptor_core::LogLevel;

// ============================================================================
// SECTION: Stderr
// ============================================================================

/// Event log that writes JSON lines to stderr.
#[derive(Debug, Clone, Copy)]
pub struct StderrEventLog {
    /// Minimum recorded level.
    min_level: LogLevel,
}

impl StderrEventLog {
    /// Creates a stderr log with the given minimum level.
    #[must_use]
    pub const fn new(min_level: LogLevel) -> Self {
        Self {
            min_level,
        }
    }
}

impl EventLog for StderrEventLog {
    fn record(&self, event: &LogEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }

    fn enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }
}

// ============================================================================
// SECTION: File
// ============================================================================

/// Event log that appends JSON lines to a file.
#[derive(Debug)]
pub struct FileEventLog {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
    /// Minimum recorded level.
    min_level: LogLevel,
}

impl FileEventLog {
    /// Opens the log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path, min_level: LogLevel) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
            min_level,
        })
    }
}

impl EventLog for FileEventLog {
    fn record(&self, event: &LogEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }

    fn enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }
}

// ============================================================================
// SECTION: Memory
// ============================================================================

/// Event log that keeps events in memory; records every level.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    /// Recorded events in arrival order.
    events: Mutex<Vec<LogEvent>>,
}

impl MemoryEventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every recorded event.
    #[must_use]
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Returns recorded events with the given identifier.
    #[must_use]
    pub fn events_named(&self, name: &str) -> Vec<LogEvent> {
        self.events().into_iter().filter(|event| event.event == name).collect()
    }
}

impl EventLog for MemoryEventLog {
    fn record(&self, event: &LogEvent) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event.clone());
    }

    fn enabled(&self, _level: LogLevel) -> bool {
        true
    }
}

// ============================================================================
// SECTION: Tee
// ============================================================================

/// Event log that forwards each event to every inner log that accepts it.
#[derive(Clone, Default)]
pub struct TeeEventLog {
    /// Inner logs.
    logs: Vec<Arc<dyn EventLog>>,
}

impl TeeEventLog {
    /// Creates a tee over the given logs.
    #[must_use]
    pub fn new(logs: Vec<Arc<dyn EventLog>>) -> Self {
        Self {
            logs,
        }
    }

    /// Adds another inner log.
    #[must_use]
    pub fn with(mut self, log: Arc<dyn EventLog>) -> Self {
        self.logs.push(log);
        self
    }
}

impl EventLog for TeeEventLog {
    fn record(&self, event: &LogEvent) {
        for log in &self.logs {
            if log.enabled(event.level) {
                log.record(event);
            }
        }
    }

    fn enabled(&self, level: LogLevel) -> bool {
        self.logs.iter().any(|log| log.enabled(level))
    }
}
