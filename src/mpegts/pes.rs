//! PES packet header parsing (ISO 13818-1 §2.4.3.6).

use byteorder::{BigEndian, ByteOrder};

use super::ts_error::TsError;

/// Parsed PES header: timestamps plus the offset where payload starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PesHeader {
    pub stream_id: u8,
    /// Declared packet length; 0 means unbounded (video).
    pub packet_length: usize,
    pub pts: Option<u64>,
    pub dts: Option<u64>,
    /// Offset of the elementary payload inside the PES packet.
    pub payload_offset: usize,
}

impl PesHeader {
    pub fn parse(data: &[u8]) -> Result<PesHeader, TsError> {
        if data.len() < 9 {
            return Err(TsError::PesHeaderTooShort);
        }
        if data[0] != 0 || data[1] != 0 || data[2] != 1 {
            return Err(TsError::BadPesStartCode);
        }

        let stream_id = data[3];
        let packet_length = BigEndian::read_u16(&data[4..6]) as usize;
        let flags = data[7];
        let header_data_length = data[8] as usize;
        let payload_offset = 9 + header_data_length;
        if data.len() < payload_offset {
            return Err(TsError::PesHeaderTooShort);
        }

        let mut pts = None;
        let mut dts = None;
        if flags & 0x80 != 0 {
            pts = Some(read_timestamp(&data[9..14])?);
        }
        if flags & 0xC0 == 0xC0 {
            dts = Some(read_timestamp(&data[14..19])?);
        }

        Ok(PesHeader {
            stream_id,
            packet_length,
            pts,
            dts,
            payload_offset,
        })
    }
}

/// 33-bit timestamp packed as `xxxx TTTm TTTT TTTT TTTm TTTT TTTT TTTm`.
fn read_timestamp(b: &[u8]) -> Result<u64, TsError> {
    if b.len() < 5 {
        return Err(TsError::PesHeaderTooShort);
    }
    if b[0] & 0x01 == 0 || b[2] & 0x01 == 0 || b[4] & 0x01 == 0 {
        return Err(TsError::BadTimestampMarker);
    }
    let ts = (u64::from(b[0] & 0x0E) << 29)
        | (u64::from(b[1]) << 22)
        | (u64::from(b[2] & 0xFE) << 14)
        | (u64::from(b[3]) << 7)
        | (u64::from(b[4]) >> 1);
    Ok(ts)
}

/// Write a PES header with PTS (and optional DTS); used by test fixtures.
pub fn write_header(out: &mut Vec<u8>, stream_id: u8, length: usize, pts: u64, dts: Option<u64>) {
    out.extend_from_slice(&[0, 0, 1, stream_id]);
    out.extend_from_slice(&(length as u16).to_be_bytes());
    out.push(0x80); // marker bits
    let (flags, header_len) = if dts.is_some() { (0xC0, 10) } else { (0x80, 5) };
    out.push(flags);
    out.push(header_len);
    write_timestamp(out, if dts.is_some() { 0x3 } else { 0x2 }, pts);
    if let Some(dts) = dts {
        write_timestamp(out, 0x1, dts);
    }
}

fn write_timestamp(out: &mut Vec<u8>, prefix: u8, ts: u64) {
    out.push((prefix << 4) | (((ts >> 30) as u8 & 0x07) << 1) | 1);
    out.push((ts >> 22) as u8);
    out.push((((ts >> 14) as u8) & 0xFE) | 1);
    out.push((ts >> 7) as u8);
    out.push(((ts << 1) as u8) | 1);
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn pts_and_dts_roundtrip() {
        let mut buf = Vec::new();
        write_header(&mut buf, 0xE0, 0, 0x1_2345_6789 & 0x1_FFFF_FFFF, Some(90_000));
        buf.extend_from_slice(&[0xAA, 0xBB]);

        let hdr = PesHeader::parse(&buf).expect("parse");
        assert_eq!(hdr.stream_id, 0xE0);
        assert_eq!(hdr.pts, Some(0x1_2345_6789 & 0x1_FFFF_FFFF));
        assert_eq!(hdr.dts, Some(90_000));
        assert_eq!(&buf[hdr.payload_offset..], &[0xAA, 0xBB]);
    }

    #[test]
    fn pts_only_header_is_shorter() {
        let mut buf = Vec::new();
        write_header(&mut buf, 0xC0, 0, 1234, None);
        let hdr = PesHeader::parse(&buf).expect("parse");
        assert_eq!(hdr.pts, Some(1234));
        assert_eq!(hdr.dts, None);
        assert_eq!(hdr.payload_offset, 14);
    }

    #[test]
    fn missing_start_code_is_an_error() {
        let buf = [0u8, 0, 2, 0xE0, 0, 0, 0x80, 0x00, 0];
        assert_eq!(PesHeader::parse(&buf).unwrap_err(), TsError::BadPesStartCode);
    }

    #[test]
    fn bad_marker_bits_are_rejected() {
        let mut buf = Vec::new();
        write_header(&mut buf, 0xE0, 0, 5678, None);
        buf[9] &= 0xFE; // clear first marker bit
        assert_eq!(
            PesHeader::parse(&buf).unwrap_err(),
            TsError::BadTimestampMarker
        );
    }
}
