use byteorder::{BigEndian, ByteOrder};

use crate::rtcp::{
    packet_type::{RtcpPacketType, PT_PSFB, PT_RTPFB},
    rtcp::RtcpPacket,
    rtcp_error::RtcpError,
};

use super::common_header::{finish_packet, CommonHeader};

/// Transport-layer (205) vs payload-specific (206) feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackKind {
    Transport,
    PayloadSpecific,
}

/// Generic NACK: transport feedback FMT 1.
pub const RTPFB_FMT_NACK: u8 = 1;
/// Picture loss indication: payload-specific feedback FMT 1.
pub const PSFB_FMT_PLI: u8 = 1;

/// RTCP feedback message (RFC 4585): common header FMT + sender/media SSRC
/// pair + feedback control information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub kind: FeedbackKind,
    pub fmt: u8,
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
    pub fci: Vec<u8>,
}

impl Feedback {
    pub fn pli(sender_ssrc: u32, media_ssrc: u32) -> Self {
        Self {
            kind: FeedbackKind::PayloadSpecific,
            fmt: PSFB_FMT_PLI,
            sender_ssrc,
            media_ssrc,
            fci: Vec::new(),
        }
    }

    pub fn nack(sender_ssrc: u32, media_ssrc: u32, pid: u16, blp: u16) -> Self {
        let mut fci = Vec::with_capacity(4);
        fci.extend_from_slice(&pid.to_be_bytes());
        fci.extend_from_slice(&blp.to_be_bytes());
        Self {
            kind: FeedbackKind::Transport,
            fmt: RTPFB_FMT_NACK,
            sender_ssrc,
            media_ssrc,
            fci,
        }
    }

    pub(crate) fn decode_kind(
        kind: FeedbackKind,
        hdr: &CommonHeader,
        payload: &[u8],
    ) -> Result<RtcpPacket, RtcpError> {
        if payload.len() < 8 {
            return Err(RtcpError::TooShort);
        }
        let pad = hdr.padding_size(payload).min(payload.len() - 8);
        Ok(RtcpPacket::Fb(Feedback {
            kind,
            fmt: hdr.rc_or_fmt(),
            sender_ssrc: BigEndian::read_u32(&payload[0..4]),
            media_ssrc: BigEndian::read_u32(&payload[4..8]),
            fci: payload[8..payload.len() - pad].to_vec(),
        }))
    }
}

impl RtcpPacketType for Feedback {
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), RtcpError> {
        let pt = match self.kind {
            FeedbackKind::Transport => PT_RTPFB,
            FeedbackKind::PayloadSpecific => PT_PSFB,
        };
        let start = out.len();
        let hdr = CommonHeader::new(self.fmt & 0x1F, pt, false);
        hdr.encode_into(out);
        out.extend_from_slice(&self.sender_ssrc.to_be_bytes());
        out.extend_from_slice(&self.media_ssrc.to_be_bytes());
        out.extend_from_slice(&self.fci);

        finish_packet(out, start);
        Ok(())
    }

    fn decode(hdr: &CommonHeader, payload: &[u8]) -> Result<RtcpPacket, RtcpError> {
        let kind = match hdr.pt {
            PT_RTPFB => FeedbackKind::Transport,
            PT_PSFB => FeedbackKind::PayloadSpecific,
            other => return Err(RtcpError::UnknownPacketType(other)),
        };
        Self::decode_kind(kind, hdr, payload)
    }
}
