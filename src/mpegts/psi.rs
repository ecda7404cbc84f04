//! Program-specific information: just enough PAT/PMT parsing to find the
//! elementary streams of the single program a WFD source sends.

use byteorder::{BigEndian, ByteOrder};

/// An elementary stream announced by the PMT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmtStream {
    pub stream_type: u8,
    pub pid: u16,
}

/// Skip the pointer_field that precedes a PSI section on packet start.
fn section(payload: &[u8]) -> Option<&[u8]> {
    let pointer = *payload.first()? as usize;
    payload.get(1 + pointer..)
}

/// Parse a PAT section and return the first program's PMT PID.
pub fn parse_pat(payload: &[u8]) -> Option<u16> {
    let sec = section(payload)?;
    // table_id, section_length, tsid, version, section numbers: 8 bytes.
    if sec.len() < 8 || sec[0] != 0x00 {
        return None;
    }
    let section_length = (BigEndian::read_u16(&sec[1..3]) & 0x0FFF) as usize;
    let end = (3 + section_length).min(sec.len());

    let mut idx = 8;
    while idx + 4 <= end.saturating_sub(4) {
        let program_number = BigEndian::read_u16(&sec[idx..idx + 2]);
        let pid = BigEndian::read_u16(&sec[idx + 2..idx + 4]) & 0x1FFF;
        if program_number != 0 {
            return Some(pid);
        }
        idx += 4;
    }
    None
}

/// Parse a PMT section into its elementary stream list.
pub fn parse_pmt(payload: &[u8]) -> Vec<PmtStream> {
    let Some(sec) = section(payload) else {
        return Vec::new();
    };
    if sec.len() < 12 || sec[0] != 0x02 {
        return Vec::new();
    }
    let section_length = (BigEndian::read_u16(&sec[1..3]) & 0x0FFF) as usize;
    let end = (3 + section_length).min(sec.len()).saturating_sub(4); // minus CRC

    let program_info_length = (BigEndian::read_u16(&sec[10..12]) & 0x0FFF) as usize;
    let mut idx = 12 + program_info_length;

    let mut streams = Vec::new();
    while idx + 5 <= end {
        let stream_type = sec[idx];
        let pid = BigEndian::read_u16(&sec[idx + 1..idx + 3]) & 0x1FFF;
        let es_info_length = (BigEndian::read_u16(&sec[idx + 3..idx + 5]) & 0x0FFF) as usize;
        streams.push(PmtStream { stream_type, pid });
        idx += 5 + es_info_length;
    }
    streams
}


#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::fixtures::{build_pat, build_pmt};
    use super::*;
    use crate::mpegts::{STREAM_TYPE_AAC_ADTS, STREAM_TYPE_H264};

    #[test]
    fn pat_yields_pmt_pid() {
        let payload = build_pat(0x1000);
        assert_eq!(parse_pat(&payload), Some(0x1000));
    }

    #[test]
    fn pmt_lists_both_streams() {
        let payload = build_pmt(&[(STREAM_TYPE_H264, 0x1011), (STREAM_TYPE_AAC_ADTS, 0x1100)]);
        let streams = parse_pmt(&payload);
        assert_eq!(
            streams,
            vec![
                PmtStream { stream_type: STREAM_TYPE_H264, pid: 0x1011 },
                PmtStream { stream_type: STREAM_TYPE_AAC_ADTS, pid: 0x1100 },
            ]
        );
    }

    #[test]
    fn garbage_sections_yield_nothing() {
        assert_eq!(parse_pat(&[0x05, 1, 2, 3]), None);
        assert!(parse_pmt(&[0x00]).is_empty());
    }
}
