pub mod demuxer;
pub mod pes;
pub mod psi;
pub mod ts_error;

pub use demuxer::{EsPacket, TsDemuxer};
pub use ts_error::TsError;

/// Fixed MPEG-2 transport packet size.
pub const TS_PACKET_SIZE: usize = 188;
/// Transport packet sync byte.
pub const TS_SYNC_BYTE: u8 = 0x47;

/// Stream types from the PMT that this sink understands.
pub const STREAM_TYPE_H264: u8 = 0x1B;
pub const STREAM_TYPE_AAC_ADTS: u8 = 0x0F;
pub const STREAM_TYPE_AAC_LATM: u8 = 0x11;
/// WFD LPCM audio (private stream type used by Wi-Fi Display sources).
pub const STREAM_TYPE_LPCM: u8 = 0x83;
