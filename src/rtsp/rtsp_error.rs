use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtspParseError {
    /// Terminator or declared body not yet received; keep the bytes and
    /// retry once more data arrives.
    Incomplete,
    Invalid(String),
}

impl fmt::Display for RtspParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtspParseError::Incomplete => write!(f, "incomplete RTSP message"),
            RtspParseError::Invalid(why) => write!(f, "invalid RTSP message: {why}"),
        }
    }
}
impl std::error::Error for RtspParseError {}
