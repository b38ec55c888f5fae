use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Severity of a pipeline record. Maps one to one onto `log::Level`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
}

impl LogRecord {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, message)
    }
}

/// Receives the records emitted by the router and the generator.
pub trait LogSink: Send + Sync {
    fn log(&self, record: LogRecord);
}

/// In-memory sink for assertions in tests.
#[derive(Default)]
pub struct VecLogSink {
    records: Mutex<Vec<LogRecord>>,
}

impl VecLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.records()
            .iter()
            .filter(|record| record.level == level)
            .count()
    }
}

impl LogSink for VecLogSink {
    fn log(&self, record: LogRecord) {
        if let Ok(mut guard) = self.records.lock() {
            guard.push(record);
        }
    }
}

/// Forwards records to the `log` facade under the `alexandrea` target.
#[derive(Clone, Copy, Default)]
pub struct LogFacadeSink;

impl LogFacadeSink {
    const TARGET: &'static str = "alexandrea";

    pub fn new() -> Self {
        Self
    }
}

impl LogSink for LogFacadeSink {
    fn log(&self, record: LogRecord) {
        log::log!(target: Self::TARGET, log::Level::from(record.level), "{}", record.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_sink_counts_by_level() {
        let sink = VecLogSink::new();
        sink.log(LogRecord::warn("first"));
        sink.log(LogRecord::new(LogLevel::Info, "second"));
        sink.log(LogRecord::warn("third"));

        assert_eq!(sink.count(LogLevel::Warn), 2);
        assert_eq!(sink.records().len(), 3);
        assert_eq!(sink.records()[1].message, "second");
    }

    #[test]
    fn levels_map_onto_the_log_facade() {
        assert_eq!(log::Level::from(LogLevel::Warn), log::Level::Warn);
        assert_eq!(serde_json::to_string(&LogLevel::Debug).unwrap(), "\"debug\"");
    }
}
