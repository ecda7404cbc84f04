use crate::log::log_level::LogLevel;

/// Defines a destination (sink) for log messages.
///
/// This trait acts as an interface for concrete logging backends, such as
/// console output, file storage, or network services.
///
/// Implementations must be `Send` and `Sync` to ensure they can be safely
/// shared and accessed across multiple threads.
pub trait LogSink: Send + Sync {
    /// Records a log message.
    ///
    /// # Arguments
    ///
    /// * `level` - The severity level of the log message.
    /// * `msg` - The content of the log message.
    /// * `target` - The static source of the log (e.g., module path).
    fn log(&self, level: LogLevel, msg: &str, target: &'static str);
}
