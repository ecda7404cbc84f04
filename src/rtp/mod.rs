pub mod rtp_error;
pub mod rtp_header;
pub mod rtp_packet;

pub use rtp_error::RtpError;
pub use rtp_header::RtpHeader;
pub use rtp_packet::RtpPacket;

/// Fixed RTP payload type for MPEG-2 transport stream (RFC 3551).
pub const RTP_PT_MP2T: u8 = 33;
pub const RTP_VERSION: u8 = 2;
