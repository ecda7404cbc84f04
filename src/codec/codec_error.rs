use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    UnsupportedCodec(&'static str),
    BackendUnavailable(String),
    ConfigureFailed(String),
    BadState(&'static str),
    FlushFailed,
    InputQueueFull,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use CodecError::*;
        match self {
            UnsupportedCodec(name) => write!(f, "no decoder for codec {name}"),
            BackendUnavailable(e) => write!(f, "decoder backend unavailable: {e}"),
            ConfigureFailed(e) => write!(f, "decoder configure failed: {e}"),
            BadState(op) => write!(f, "operation {op} invalid in current state"),
            FlushFailed => write!(f, "decoder flush failed"),
            InputQueueFull => write!(f, "decoder input queue full"),
        }
    }
}
impl std::error::Error for CodecError {}
