//! Diagnostic output for transformer failures.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Destination of `<name>: <message>` diagnostic lines.
pub trait DiagnosticSink: Send + Sync {
    /// Write one complete line (without trailing newline).
    fn write_line(&self, line: &str) -> io::Result<()>;
}

/// Writes diagnostic lines to standard error.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrSink;

impl DiagnosticSink for StderrSink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut stderr = io::stderr().lock();
        stderr.write_all(line.as_bytes())?;
        stderr.write_all(b"\n")
    }
}

/// Keeps diagnostic lines in memory. Useful for tests and embedding hosts
/// that forward diagnostics elsewhere.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the lines written so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }
}

impl DiagnosticSink for MemorySink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut lines = self
            .lines
            .lock()
            .map_err(|_| io::Error::other("diagnostic sink mutex poisoned"))?;
        lines.push(line.to_string());
        Ok(())
    }
}
