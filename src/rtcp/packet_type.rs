use super::{common_header::CommonHeader, rtcp::RtcpPacket, rtcp_error::RtcpError};

pub const PT_SR: u8 = 200;
pub const PT_RR: u8 = 201;
pub const PT_SDES: u8 = 202;
pub const PT_BYE: u8 = 203;
pub const PT_APP: u8 = 204;
pub const PT_RTPFB: u8 = 205;
pub const PT_PSFB: u8 = 206;
pub const PT_XR: u8 = 207;

/// Shared contract for every RTCP packet kind: append the wire form to a
/// buffer, or parse one payload following an already-decoded common header.
pub trait RtcpPacketType {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), RtcpError>;
    fn decode(hdr: &CommonHeader, payload: &[u8]) -> Result<RtcpPacket, RtcpError>;
}
