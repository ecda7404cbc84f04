use crate::log::{log_level::LogLevel, log_sink::LogSink};

/// A `LogSink` that discards every message. Handy default for tests.
pub struct NoopLogSink;

impl LogSink for NoopLogSink {
    fn log(&self, _level: LogLevel, _msg: &str, _target: &'static str) {}
}
