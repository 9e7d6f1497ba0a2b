use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::warn;

use crate::trace::trace::TraceEvent;

/// Append-only JSONL journal of protocol steps, shared by all page workers.
///
/// Journal failures are logged and swallowed; they never interrupt a capture.
pub struct TraceLogger {
    sink: Option<Mutex<File>>,
    written: AtomicUsize,
}

impl TraceLogger {
    pub fn new(path: &str) -> Self {
        let sink = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(Mutex::new(file)),
            Err(e) => {
                warn!(path, error = %e, "could not open trace file, journal disabled");
                None
            }
        };
        Self {
            sink,
            written: AtomicUsize::new(0),
        }
    }

    /// A logger that drops every event.
    pub fn disabled() -> Self {
        Self {
            sink: None,
            written: AtomicUsize::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Events appended since the logger was opened.
    pub fn events_written(&self) -> usize {
        self.written.load(Ordering::Relaxed)
    }

    pub fn log(&self, event: &TraceEvent) {
        let Some(sink) = &self.sink else { return };

        match Self::append(sink, event) {
            Ok(()) => {
                self.written.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => warn!(step = %event.step, error = %e, "failed to journal trace event"),
        }
    }

    fn append(sink: &Mutex<File>, event: &TraceEvent) -> io::Result<()> {
        let line = serde_json::to_string(event)?;
        let mut file = sink
            .lock()
            .map_err(|_| io::Error::other("trace journal lock poisoned"))?;
        writeln!(file, "{}", line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_appended_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.jsonl");
        let logger = TraceLogger::new(path.to_str().unwrap());

        logger.log(&TraceEvent::now("https://app.test/", "scan").with_outcome("ok"));
        logger.log(&TraceEvent::now("https://app.test/", "capture"));

        assert_eq!(logger.events_written(), 2);
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["step"], "scan");
    }

    #[test]
    fn disabled_logger_writes_nothing() {
        let logger = TraceLogger::disabled();
        logger.log(&TraceEvent::now("https://app.test/", "scan"));
        assert!(!logger.is_enabled());
        assert_eq!(logger.events_written(), 0);
    }
}
