use byteorder::{BigEndian, ByteOrder};

use crate::rtcp::{
    packet_type::{RtcpPacketType, PT_SDES},
    rtcp::RtcpPacket,
    rtcp_error::RtcpError,
};

use super::common_header::{finish_packet, CommonHeader};

pub const SDES_ITEM_END: u8 = 0;
pub const SDES_ITEM_CNAME: u8 = 1;

/// One SDES chunk: an SSRC with its CNAME item.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SdesChunk {
    pub ssrc: u32,
    pub cname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sdes {
    pub chunks: Vec<SdesChunk>,
}

impl RtcpPacketType for Sdes {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), RtcpError> {
        if self.chunks.len() > 31 {
            return Err(RtcpError::TooManyReportBlocks(self.chunks.len()));
        }
        let start = out.len();
        let hdr = CommonHeader::new(self.chunks.len() as u8, PT_SDES, false);
        hdr.encode_into(out);

        for chunk in &self.chunks {
            out.extend_from_slice(&chunk.ssrc.to_be_bytes());
            let text = chunk.cname.as_bytes();
            let len = text.len().min(255);
            out.push(SDES_ITEM_CNAME);
            out.push(len as u8);
            out.extend_from_slice(&text[..len]);
            out.push(SDES_ITEM_END);
            // Each chunk is itself 32-bit aligned.
            while (out.len() - start) % 4 != 0 {
                out.push(0);
            }
        }

        finish_packet(out, start);
        Ok(())
    }

    fn decode(hdr: &CommonHeader, payload: &[u8]) -> Result<RtcpPacket, RtcpError> {
        let count = hdr.rc_or_fmt() as usize;
        let mut chunks = Vec::with_capacity(count);
        let mut idx = 0usize;

        for _ in 0..count {
            if payload.len() < idx + 4 {
                return Err(RtcpError::Truncated);
            }
            let ssrc = BigEndian::read_u32(&payload[idx..idx + 4]);
            idx += 4;

            let mut cname = String::new();
            loop {
                let item = *payload.get(idx).ok_or(RtcpError::SdesItemTooShort)?;
                idx += 1;
                if item == SDES_ITEM_END {
                    break;
                }
                let len = *payload.get(idx).ok_or(RtcpError::SdesItemTooShort)? as usize;
                idx += 1;
                let text = payload
                    .get(idx..idx + len)
                    .ok_or(RtcpError::SdesItemTooShort)?;
                if item == SDES_ITEM_CNAME {
                    cname = String::from_utf8_lossy(text).into_owned();
                }
                idx += len;
            }
            // Skip alignment after the terminating zero.
            while idx % 4 != 0 {
                idx += 1;
            }
            chunks.push(SdesChunk { ssrc, cname });
        }

        Ok(RtcpPacket::Sdes(Sdes { chunks }))
    }
}

impl Sdes {
    pub fn cname(ssrc: u32, cname: impl Into<String>) -> Self {
        Self {
            chunks: vec![SdesChunk {
                ssrc,
                cname: cname.into(),
            }],
        }
    }
}
