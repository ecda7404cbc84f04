use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtpError {
    TooShort,
    BadVersion(u8),
    CsrcCountMismatch { expected: usize, buf_left: usize },
    ExtensionTooShort,
    PaddingTooShort,
}

impl fmt::Display for RtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use RtpError::*;
        match self {
            TooShort => write!(f, "buffer too short"),
            BadVersion(v) => write!(f, "bad RTP version: {v}"),
            CsrcCountMismatch { expected, buf_left } => {
                write!(f, "csrc count {expected} exceeds remaining {buf_left} bytes")
            }
            ExtensionTooShort => write!(f, "header extension exceeds buffer"),
            PaddingTooShort => write!(f, "padding count exceeds payload"),
        }
    }
}
impl std::error::Error for RtpError {}
