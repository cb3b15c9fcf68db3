use crate::log::{log_level::LogLevel, log_sink::LogSink};
use std::{
    io::{self, Write},
    time::{SystemTime, UNIX_EPOCH},
};

/// Sink that writes every message at or above a threshold to stderr.
///
/// Timestamps are milliseconds since the Unix epoch. Write failures are
/// swallowed; the logger must never take the media path down with it.
#[derive(Debug, Clone)]
pub struct ConsoleLogSink {
    min_level: LogLevel,
}

impl ConsoleLogSink {
    #[must_use]
    pub fn new(min_level: LogLevel) -> Self {
        Self { min_level }
    }
}

impl Default for ConsoleLogSink {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

impl LogSink for ConsoleLogSink {
    fn log(&self, level: LogLevel, msg: &str, target: &'static str) {
        if level < self.min_level {
            return;
        }
        let ts_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let mut err = io::stderr().lock();
        let _ = writeln!(err, "[{level:?}] {ts_ms} {target} | {msg}");
    }
}
