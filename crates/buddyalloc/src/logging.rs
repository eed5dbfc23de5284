//! Logging collaborator interface.
//!
//! The arena never formats output destinations or persists messages itself;
//! it hands leveled messages to an injected [`Logger`].

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Message severity, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Severity {
    Trace,
    Debug,
    Information,
    Warning,
    Error,
    Critical,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Information => "INFORMATION",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write-only sink for leveled messages.
///
/// Implementations must not panic; a failing sink drops the message.
pub trait Logger: Send + Sync {
    /// Record one message.
    fn log(&self, severity: Severity, message: &str);

    /// Whether messages at `severity` would be recorded.
    ///
    /// The arena skips building expensive messages when this returns false.
    fn enabled(&self, severity: Severity) -> bool {
        let _ = severity;
        true
    }
}

/// A message captured by [`RecordingLogger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub severity: Severity,
    pub message: String,
}

/// Logger that keeps every message in memory.
#[derive(Debug)]
pub struct RecordingLogger {
    min_severity: Severity,
    records: Mutex<Vec<LogRecord>>,
}

impl RecordingLogger {
    /// Record everything, down to [`Severity::Trace`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_min_severity(Severity::Trace)
    }

    /// Record only messages at or above `min_severity`.
    #[must_use]
    pub fn with_min_severity(min_severity: Severity) -> Self {
        Self {
            min_severity,
            records: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of every recorded message.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    /// Messages recorded at exactly `severity`.
    #[must_use]
    pub fn messages_at(&self, severity: Severity) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .filter(|record| record.severity == severity)
            .map(|record| record.message.clone())
            .collect()
    }

    /// True if any message contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.records
            .lock()
            .iter()
            .any(|record| record.message.contains(needle))
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl Default for RecordingLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger for RecordingLogger {
    fn log(&self, severity: Severity, message: &str) {
        if self.enabled(severity) {
            self.records.lock().push(LogRecord {
                severity,
                message: message.to_string(),
            });
        }
    }

    fn enabled(&self, severity: Severity) -> bool {
        severity >= self.min_severity
    }
}

/// The arena's optional logger handle.
///
/// Every method is a no-op when no logger was injected.
#[derive(Clone, Default)]
pub(crate) struct LogSink {
    logger: Option<Arc<dyn Logger>>,
}

impl LogSink {
    pub(crate) fn new(logger: Option<Arc<dyn Logger>>) -> Self {
        Self { logger }
    }

    pub(crate) fn enabled(&self, severity: Severity) -> bool {
        self.logger
            .as_ref()
            .is_some_and(|logger| logger.enabled(severity))
    }

    pub(crate) fn emit(&self, severity: Severity, args: fmt::Arguments<'_>) {
        if let Some(logger) = &self.logger
            && logger.enabled(severity)
        {
            logger.log(severity, &args.to_string());
        }
    }

    pub(crate) fn trace(&self, args: fmt::Arguments<'_>) {
        self.emit(Severity::Trace, args);
    }

    pub(crate) fn debug(&self, args: fmt::Arguments<'_>) {
        self.emit(Severity::Debug, args);
    }

    pub(crate) fn information(&self, args: fmt::Arguments<'_>) {
        self.emit(Severity::Information, args);
    }

    pub(crate) fn error(&self, args: fmt::Arguments<'_>) {
        self.emit(Severity::Error, args);
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink")
            .field("attached", &self.logger.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severities_are_ordered() {
        assert!(Severity::Trace < Severity::Debug);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
        assert_eq!(Severity::Information.to_string(), "INFORMATION");
    }

    #[test]
    fn recording_logger_filters_by_min_severity() {
        let logger = RecordingLogger::with_min_severity(Severity::Information);
        logger.log(Severity::Debug, "hidden");
        logger.log(Severity::Error, "shown");
        assert_eq!(logger.records().len(), 1);
        assert_eq!(logger.messages_at(Severity::Error), vec!["shown".to_string()]);
        assert!(!logger.contains("hidden"));
        logger.clear();
        assert!(logger.records().is_empty());
    }

    #[test]
    fn sink_without_logger_is_silent() {
        let sink = LogSink::default();
        assert!(!sink.enabled(Severity::Critical));
        sink.error(format_args!("nobody hears this"));
    }

    #[test]
    fn sink_forwards_formatted_messages() {
        let logger = Arc::new(RecordingLogger::new());
        let sink = LogSink::new(Some(logger.clone()));
        sink.debug(format_args!("split {} -> {}", 64, 32));
        sink.trace(format_args!("dump"));
        assert_eq!(
            logger.records(),
            vec![
                LogRecord {
                    severity: Severity::Debug,
                    message: "split 64 -> 32".to_string(),
                },
                LogRecord {
                    severity: Severity::Trace,
                    message: "dump".to_string(),
                },
            ]
        );
    }
}
