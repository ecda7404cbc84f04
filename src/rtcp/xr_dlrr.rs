use byteorder::{BigEndian, ByteOrder};

use crate::rtcp::{
    packet_type::{RtcpPacketType, PT_XR},
    rtcp::RtcpPacket,
    rtcp_error::RtcpError,
};

use super::common_header::{finish_packet, CommonHeader};

/// Extended-report block type for DLRR (RFC 3611 §4.5).
pub const XR_BLOCK_DLRR: u8 = 5;

/// One DLRR sub-block: when we last heard an RR from `ssrc` and how long ago.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DlrrItem {
    pub ssrc: u32,
    pub last_rr: u32,
    pub delay_last_rr: u32,
}

/// An XR packet carrying a single DLRR report block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XrDlrr {
    pub ssrc: u32,
    pub items: Vec<DlrrItem>,
}

impl RtcpPacketType for XrDlrr {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), RtcpError> {
        let start = out.len();
        let hdr = CommonHeader::new(0, PT_XR, false);
        hdr.encode_into(out);
        out.extend_from_slice(&self.ssrc.to_be_bytes());

        // DLRR block header: BT | reserved | block length in words.
        out.push(XR_BLOCK_DLRR);
        out.push(0);
        out.extend_from_slice(&((self.items.len() * 3) as u16).to_be_bytes());
        for item in &self.items {
            out.extend_from_slice(&item.ssrc.to_be_bytes());
            out.extend_from_slice(&item.last_rr.to_be_bytes());
            out.extend_from_slice(&item.delay_last_rr.to_be_bytes());
        }

        finish_packet(out, start);
        Ok(())
    }

    fn decode(_hdr: &CommonHeader, payload: &[u8]) -> Result<RtcpPacket, RtcpError> {
        if payload.len() < 8 {
            return Err(RtcpError::TooShort);
        }
        let ssrc = BigEndian::read_u32(&payload[0..4]);
        let block_type = payload[4];
        if block_type != XR_BLOCK_DLRR {
            return Err(RtcpError::Invalid);
        }
        let words = BigEndian::read_u16(&payload[6..8]) as usize;
        if words % 3 != 0 {
            return Err(RtcpError::LengthMismatch);
        }
        let count = words / 3;
        if payload.len() < 8 + count * 12 {
            return Err(RtcpError::Truncated);
        }

        let mut items = Vec::with_capacity(count);
        for i in 0..count {
            let at = 8 + i * 12;
            items.push(DlrrItem {
                ssrc: BigEndian::read_u32(&payload[at..at + 4]),
                last_rr: BigEndian::read_u32(&payload[at + 4..at + 8]),
                delay_last_rr: BigEndian::read_u32(&payload[at + 8..at + 12]),
            });
        }

        Ok(RtcpPacket::XrDlrr(XrDlrr { ssrc, items }))
    }
}
