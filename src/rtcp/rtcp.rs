use crate::rtcp::packet_type;

use super::{
    bye::Bye,
    common_header::CommonHeader,
    feedback::{Feedback, FeedbackKind},
    packet_type::RtcpPacketType,
    receiver_report::ReceiverReport,
    rtcp_error::RtcpError,
    sdes::Sdes,
    sender_report::SenderReport,
    xr_dlrr::XrDlrr,
};

/// The union of supported RTCP packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcpPacket {
    Sr(SenderReport),
    Rr(ReceiverReport),
    Sdes(Sdes),
    Bye(Bye),
    Fb(Feedback),
    XrDlrr(XrDlrr),
}

impl RtcpPacket {
    /// Decode a *compound* RTCP buffer into individual packets.
    pub fn decode_compound(buf: &[u8]) -> Result<Vec<RtcpPacket>, RtcpError> {
        let mut out = Vec::new();
        let mut idx = 0usize;
        while idx + 4 <= buf.len() {
            let (hdr, total) = CommonHeader::decode(&buf[idx..])?;
            let pkt_bytes = &buf[idx..idx + total];
            let payload = &pkt_bytes[4..];

            let pkt = match hdr.pt {
                packet_type::PT_SR => SenderReport::decode(&hdr, payload)?,
                packet_type::PT_RR => ReceiverReport::decode(&hdr, payload)?,
                packet_type::PT_SDES => Sdes::decode(&hdr, payload)?,
                packet_type::PT_BYE => Bye::decode(&hdr, payload)?,
                packet_type::PT_RTPFB => {
                    Feedback::decode_kind(FeedbackKind::Transport, &hdr, payload)?
                }
                packet_type::PT_PSFB => {
                    Feedback::decode_kind(FeedbackKind::PayloadSpecific, &hdr, payload)?
                }
                packet_type::PT_XR => XrDlrr::decode(&hdr, payload)?,
                other => return Err(RtcpError::UnknownPacketType(other)),
            };
            out.push(pkt);
            idx += total;
        }
        if idx != buf.len() {
            // trailing garbage / partial packet
            return Err(RtcpError::TooShort);
        }
        Ok(out)
    }

    /// Encode a compound RTCP packet (concatenation of packets).
    pub fn encode_compound(pkts: &[RtcpPacket]) -> Result<Vec<u8>, RtcpError> {
        let mut out = Vec::new();
        for pkt in pkts {
            pkt.encode_into(&mut out)?;
        }
        Ok(out)
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), RtcpError> {
        match self {
            RtcpPacket::Sr(sr) => sr.encode_into(out),
            RtcpPacket::Rr(rr) => rr.encode_into(out),
            RtcpPacket::Sdes(sdes) => sdes.encode_into(out),
            RtcpPacket::Bye(bye) => bye.encode_into(out),
            RtcpPacket::Fb(fb) => fb.encode_into(out),
            RtcpPacket::XrDlrr(xr) => xr.encode_into(out),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::rtcp::feedback::PSFB_FMT_PLI;
    use crate::rtcp::report_block::ReportBlock;
    use crate::rtcp::sender_info::SenderInfo;
    use crate::rtcp::xr_dlrr::DlrrItem;

    #[test]
    fn sender_report_roundtrip_preserves_clock() {
        let info = SenderInfo {
            rtp_ts: 90_000,
            packet_count: 42,
            octet_count: 4242,
            ..Default::default()
        }
        .with_unix_ms(1_690_000_111_222);
        let sr = SenderReport::new(0x1234_5678, info, vec![]);

        let wire = RtcpPacket::encode_compound(&[RtcpPacket::Sr(sr)]).expect("encode");
        let pkts = RtcpPacket::decode_compound(&wire).expect("decode");
        match &pkts[..] {
            [RtcpPacket::Sr(dec)] => {
                assert_eq!(dec.ssrc, 0x1234_5678);
                assert_eq!(dec.info.packet_count, 42);
                assert_eq!(dec.info.unix_ms(), 1_690_000_111_222);
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn receiver_report_with_blocks_roundtrips() {
        let rb = ReportBlock {
            ssrc: 9,
            fraction_lost: 3,
            cumulative_lost: 0x0001_0203,
            highest_seq: 70_000,
            jitter: 12,
            last_sr: 34,
            delay_last_sr: 56,
        };
        let rr = ReceiverReport::new(7, vec![rb, rb]);

        let wire = RtcpPacket::encode_compound(&[RtcpPacket::Rr(rr.clone())]).expect("encode");
        let pkts = RtcpPacket::decode_compound(&wire).expect("decode");
        assert_eq!(pkts, vec![RtcpPacket::Rr(rr)]);
    }

    #[test]
    fn sdes_and_bye_pad_to_alignment() {
        let sdes = Sdes::cname(0xAB, "sink");
        let bye = Bye::new(vec![0xAB], Some("teardown".into()));

        let wire =
            RtcpPacket::encode_compound(&[RtcpPacket::Sdes(sdes.clone()), RtcpPacket::Bye(bye.clone())])
                .expect("encode");
        assert_eq!(wire.len() % 4, 0);

        let pkts = RtcpPacket::decode_compound(&wire).expect("decode");
        assert_eq!(pkts, vec![RtcpPacket::Sdes(sdes), RtcpPacket::Bye(bye)]);
    }

    #[test]
    fn feedback_pli_and_nack_carry_fmt() {
        let pli = Feedback::pli(1, 2);
        let nack = Feedback::nack(1, 2, 100, 0b101);

        let wire = RtcpPacket::encode_compound(&[
            RtcpPacket::Fb(pli.clone()),
            RtcpPacket::Fb(nack.clone()),
        ])
        .expect("encode");
        let pkts = RtcpPacket::decode_compound(&wire).expect("decode");

        match &pkts[..] {
            [RtcpPacket::Fb(a), RtcpPacket::Fb(b)] => {
                assert_eq!(a.kind, FeedbackKind::PayloadSpecific);
                assert_eq!(a.fmt, PSFB_FMT_PLI);
                assert_eq!(b.kind, FeedbackKind::Transport);
                assert_eq!(b.fci, nack.fci);
            }
            other => panic!("unexpected decode: {other:?}"),
        }
        assert_eq!(pkts, vec![RtcpPacket::Fb(pli), RtcpPacket::Fb(nack)]);
    }

    #[test]
    fn xr_dlrr_roundtrips() {
        let xr = XrDlrr {
            ssrc: 0xC0FF_EE00,
            items: vec![DlrrItem {
                ssrc: 1,
                last_rr: 2,
                delay_last_rr: 3,
            }],
        };
        let wire = RtcpPacket::encode_compound(&[RtcpPacket::XrDlrr(xr.clone())]).expect("encode");
        let pkts = RtcpPacket::decode_compound(&wire).expect("decode");
        assert_eq!(pkts, vec![RtcpPacket::XrDlrr(xr)]);
    }

    #[test]
    fn trailing_partial_packet_is_rejected() {
        let sr = SenderReport::new(1, SenderInfo::default(), vec![]);
        let mut wire = RtcpPacket::encode_compound(&[RtcpPacket::Sr(sr)]).expect("encode");
        wire.extend_from_slice(&[0x80, 0xC8]); // half a header
        assert!(RtcpPacket::decode_compound(&wire).is_err());
    }

    #[test]
    fn unknown_packet_type_is_reported() {
        let mut wire = vec![0x80, 0xC4, 0x00, 0x01, 0, 0, 0, 0]; // PT 196
        wire[3] = 1;
        let err = RtcpPacket::decode_compound(&wire).unwrap_err();
        assert!(matches!(err, RtcpError::UnknownPacketType(196)));
    }
}
