/// Identifies the codec carried by a [`Frame`](crate::media::Frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecId {
    #[default]
    None,
    H264,
    Aac,
    PcmS16be,
    G711a,
    G711u,
}

impl CodecId {
    #[must_use]
    pub fn is_audio(self) -> bool {
        matches!(
            self,
            CodecId::Aac | CodecId::PcmS16be | CodecId::G711a | CodecId::G711u
        )
    }
}

/// Which elementary track a frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}
