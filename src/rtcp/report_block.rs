use byteorder::{BigEndian, ByteOrder};

use super::rtcp_error::RtcpError;

/// One 24-byte reception report block shared by SR and RR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportBlock {
    pub ssrc: u32,
    pub fraction_lost: u8,
    pub cumulative_lost: u32, // 24 bit on the wire
    pub highest_seq: u32,
    pub jitter: u32,
    pub last_sr: u32,
    pub delay_last_sr: u32,
}

impl ReportBlock {
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.ssrc.to_be_bytes());
        out.push(self.fraction_lost);
        let lost = self.cumulative_lost & 0x00FF_FFFF;
        out.push(((lost >> 16) & 0xFF) as u8);
        out.push(((lost >> 8) & 0xFF) as u8);
        out.push((lost & 0xFF) as u8);
        out.extend_from_slice(&self.highest_seq.to_be_bytes());
        out.extend_from_slice(&self.jitter.to_be_bytes());
        out.extend_from_slice(&self.last_sr.to_be_bytes());
        out.extend_from_slice(&self.delay_last_sr.to_be_bytes());
    }

    pub fn decode(buf: &[u8]) -> Result<(Self, usize), RtcpError> {
        if buf.len() < 24 {
            return Err(RtcpError::Truncated);
        }
        Ok((
            Self {
                ssrc: BigEndian::read_u32(&buf[0..4]),
                fraction_lost: buf[4],
                cumulative_lost: BigEndian::read_u24(&buf[5..8]),
                highest_seq: BigEndian::read_u32(&buf[8..12]),
                jitter: BigEndian::read_u32(&buf[12..16]),
                last_sr: BigEndian::read_u32(&buf[16..20]),
                delay_last_sr: BigEndian::read_u32(&buf[20..24]),
            },
            24,
        ))
    }
}
