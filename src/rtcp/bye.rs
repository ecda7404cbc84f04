use byteorder::{BigEndian, ByteOrder};

use crate::rtcp::{
    packet_type::{RtcpPacketType, PT_BYE},
    rtcp::RtcpPacket,
    rtcp_error::RtcpError,
};

use super::common_header::{finish_packet, CommonHeader};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bye {
    pub ssrcs: Vec<u32>,
    pub reason: Option<String>,
}

impl RtcpPacketType for Bye {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), RtcpError> {
        if self.ssrcs.len() > 31 {
            return Err(RtcpError::TooManyReportBlocks(self.ssrcs.len()));
        }
        let start = out.len();
        let hdr = CommonHeader::new(self.ssrcs.len() as u8, PT_BYE, false);
        hdr.encode_into(out);
        for ssrc in &self.ssrcs {
            out.extend_from_slice(&ssrc.to_be_bytes());
        }
        if let Some(reason) = &self.reason {
            let text = reason.as_bytes();
            let len = text.len().min(255);
            out.push(len as u8);
            out.extend_from_slice(&text[..len]);
        }

        finish_packet(out, start);
        Ok(())
    }

    fn decode(hdr: &CommonHeader, payload: &[u8]) -> Result<RtcpPacket, RtcpError> {
        let count = hdr.rc_or_fmt() as usize;
        if payload.len() < count * 4 {
            return Err(RtcpError::Truncated);
        }

        let mut ssrcs = Vec::with_capacity(count);
        for i in 0..count {
            ssrcs.push(BigEndian::read_u32(&payload[i * 4..i * 4 + 4]));
        }

        let mut idx = count * 4;
        let pad = hdr.padding_size(payload).min(payload.len());
        let end = payload.len() - pad;
        let reason = if idx < end {
            let len = payload[idx] as usize;
            idx += 1;
            let text = payload.get(idx..idx + len).ok_or(RtcpError::Truncated)?;
            Some(String::from_utf8_lossy(text).into_owned())
        } else {
            None
        };

        Ok(RtcpPacket::Bye(Bye { ssrcs, reason }))
    }
}

impl Bye {
    pub fn new(ssrcs: Vec<u32>, reason: Option<String>) -> Self {
        Self { ssrcs, reason }
    }
}
