pub mod codec_id;
pub mod frame;
pub mod media_data;
pub mod track;

pub use codec_id::{CodecId, TrackKind};
pub use frame::Frame;
pub use media_data::{MediaData, MediaType};
pub use track::{AudioTrack, VideoTrack};

/// 90 kHz media clock used by the transport stream timestamps.
pub const MEDIA_CLOCK_RATE: u32 = 90_000;

/// Convert a 90 kHz tick count to microseconds.
#[must_use]
pub fn ticks_to_us(ticks: u64) -> i64 {
    (ticks as i64) * 100 / 9
}
