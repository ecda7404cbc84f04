use std::sync::mpsc::{SyncSender, TrySendError};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::log::{log_level::LogLevel, log_msg::LogMsg, log_sink::LogSink};

/// Cloneable, non-blocking front end of the background [`Logger`].
///
/// [`Logger`]: crate::log::logger::Logger
#[derive(Clone)]
pub struct LoggerHandle {
    pub(crate) tx: SyncSender<LogMsg>,
}

impl LoggerHandle {
    /// Enqueue a message without blocking; drops it when the queue is full.
    pub fn try_log<S: Into<String>>(
        &self,
        level: LogLevel,
        text: S,
        target: &'static str,
    ) -> Result<(), TrySendError<LogMsg>> {
        self.tx.try_send(LogMsg::new(level, text, target, now_ms()))
    }
}

impl LogSink for LoggerHandle {
    fn log(&self, level: LogLevel, msg: &str, target: &'static str) {
        // A full queue means we are logging faster than the writer drains;
        // dropping here keeps hot paths non-blocking.
        let _ = self.try_log(level, msg, target);
    }
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}
