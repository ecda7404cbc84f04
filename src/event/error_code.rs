use std::fmt;

/// Error kinds surfaced on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorCode {
    #[default]
    Ok,
    GeneralError,
    ConnectionFailure,
    InteractionFailure,
    ProtocolInteractionTimeout,
    NetworkError,
    IntakeTimeout,
    ProsumerCreate,
    ProsumerStart,
    ProsumerStop,
    ProsumerDestroy,
    DecodeFormat,
    InvalidSurfaceId,
    PlayStart,
    PlayStop,
    SessionStart,
}

impl ErrorCode {
    #[must_use]
    pub fn is_ok(self) -> bool {
        self == ErrorCode::Ok
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}
