use byteorder::{BigEndian, ByteOrder};

use crate::rtcp::{
    packet_type::{RtcpPacketType, PT_RR},
    rtcp::RtcpPacket,
    rtcp_error::RtcpError,
};

use super::{
    common_header::{finish_packet, CommonHeader},
    report_block::ReportBlock,
};

const MAX_RC: usize = 31;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReceiverReport {
    pub ssrc: u32,
    pub reports: Vec<ReportBlock>,
}

impl RtcpPacketType for ReceiverReport {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), RtcpError> {
        if self.reports.len() > MAX_RC {
            return Err(RtcpError::TooManyReportBlocks(self.reports.len()));
        }
        let start = out.len();
        let hdr = CommonHeader::new(self.reports.len() as u8, PT_RR, false);
        hdr.encode_into(out);
        out.extend_from_slice(&self.ssrc.to_be_bytes());
        for rb in &self.reports {
            rb.encode_into(out);
        }

        finish_packet(out, start);
        Ok(())
    }

    fn decode(hdr: &CommonHeader, payload: &[u8]) -> Result<RtcpPacket, RtcpError> {
        if payload.len() < 4 {
            return Err(RtcpError::TooShort);
        }
        let ssrc = BigEndian::read_u32(&payload[0..4]);
        let mut idx = 4;

        let rc = hdr.rc_or_fmt() as usize;
        let mut reports = Vec::with_capacity(rc);
        for _ in 0..rc {
            if payload.len() < idx + 24 {
                return Err(RtcpError::Truncated);
            }
            let (rb, used) = ReportBlock::decode(&payload[idx..])?;
            idx += used;
            reports.push(rb);
        }

        Ok(RtcpPacket::Rr(ReceiverReport { ssrc, reports }))
    }
}

impl ReceiverReport {
    pub fn new(ssrc: u32, reports: Vec<ReportBlock>) -> Self {
        Self { ssrc, reports }
    }
}
