pub mod message;
pub mod rtsp_error;
pub mod wfd;

pub use message::{RtspRequest, RtspResponse};
pub use rtsp_error::RtspParseError;

pub const RTSP_VERSION: &str = "RTSP/1.0";
pub const RTSP_STATUS_OK: u16 = 200;

pub const RTSP_METHOD_OPTIONS: &str = "OPTIONS";
pub const RTSP_METHOD_GET_PARAMETER: &str = "GET_PARAMETER";
pub const RTSP_METHOD_SET_PARAMETER: &str = "SET_PARAMETER";
pub const RTSP_METHOD_SETUP: &str = "SETUP";
pub const RTSP_METHOD_PLAY: &str = "PLAY";
pub const RTSP_METHOD_TEARDOWN: &str = "TEARDOWN";
/// Feature token every WFD peer must understand.
pub const RTSP_METHOD_WFD: &str = "org.wfa.wfd1.0";
