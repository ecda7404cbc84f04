use crate::media::codec_id::CodecId;

/// Negotiated audio descriptor. Immutable after session negotiation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioTrack {
    pub codec_id: CodecId,
    pub sample_rate: u32,
    pub channels: u32,
    pub sample_bit: u32,
}

/// Negotiated video descriptor. Immutable after session negotiation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoTrack {
    pub codec_id: CodecId,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}
