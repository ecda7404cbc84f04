use byteorder::{BigEndian, ByteOrder};

use super::rtcp_error::RtcpError;

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
pub const NTP_UNIX_OFFSET: u32 = 0x83AA_7E80;

/// The 20-byte sender info block of an SR packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SenderInfo {
    pub ntp_msw: u32,
    pub ntp_lsw: u32,
    pub rtp_ts: u32,
    pub packet_count: u32,
    pub octet_count: u32,
}

impl SenderInfo {
    /// Build the NTP stamp from a Unix timestamp in milliseconds.
    #[must_use]
    pub fn with_unix_ms(mut self, unix_ms: u64) -> Self {
        let secs = unix_ms / 1000;
        let usec = (unix_ms % 1000) * 1000;
        self.ntp_msw = (secs as u32).wrapping_add(NTP_UNIX_OFFSET);
        self.ntp_lsw = ((usec << 32) / 1_000_000) as u32;
        self
    }

    /// Recover the Unix timestamp in milliseconds, 0 for pre-1970 stamps.
    #[must_use]
    pub fn unix_ms(&self) -> u64 {
        if self.ntp_msw < NTP_UNIX_OFFSET {
            return 0;
        }
        let secs = u64::from(self.ntp_msw - NTP_UNIX_OFFSET);
        let usec = (u64::from(self.ntp_lsw) * 1_000_000 + (1u64 << 31)) >> 32;
        secs * 1000 + usec / 1000
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.ntp_msw.to_be_bytes());
        out.extend_from_slice(&self.ntp_lsw.to_be_bytes());
        out.extend_from_slice(&self.rtp_ts.to_be_bytes());
        out.extend_from_slice(&self.packet_count.to_be_bytes());
        out.extend_from_slice(&self.octet_count.to_be_bytes());
    }

    pub fn decode(buf: &[u8]) -> Result<(Self, usize), RtcpError> {
        if buf.len() < 20 {
            return Err(RtcpError::Truncated);
        }
        Ok((
            Self {
                ntp_msw: BigEndian::read_u32(&buf[0..4]),
                ntp_lsw: BigEndian::read_u32(&buf[4..8]),
                rtp_ts: BigEndian::read_u32(&buf[8..12]),
                packet_count: BigEndian::read_u32(&buf[12..16]),
                octet_count: BigEndian::read_u32(&buf[16..20]),
            },
            20,
        ))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn ntp_stamp_roundtrips_within_a_millisecond() {
        let info = SenderInfo::default().with_unix_ms(1_700_000_123_456);
        assert_eq!(info.unix_ms(), 1_700_000_123_456);
    }

    #[test]
    fn pre_epoch_stamp_reads_zero() {
        let info = SenderInfo {
            ntp_msw: 1,
            ..Default::default()
        };
        assert_eq!(info.unix_ms(), 0);
    }
}
