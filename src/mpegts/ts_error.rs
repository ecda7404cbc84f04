use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TsError {
    LostSync(u8),
    PacketTooShort,
    BadPesStartCode,
    PesHeaderTooShort,
    BadTimestampMarker,
}

impl fmt::Display for TsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TsError::*;
        match self {
            LostSync(b) => write!(f, "lost transport sync, got 0x{b:02X}"),
            PacketTooShort => write!(f, "transport packet shorter than 188 bytes"),
            BadPesStartCode => write!(f, "PES packet start code missing"),
            PesHeaderTooShort => write!(f, "PES header shorter than its declared length"),
            BadTimestampMarker => write!(f, "PTS/DTS marker bits invalid"),
        }
    }
}
impl std::error::Error for TsError {}
