use bytes::Bytes;

/// Media category used to key the dispatcher and pause/resume requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Audio,
    Video,
    Av,
}

impl MediaType {
    /// Whether a pause on `self` covers `other`.
    #[must_use]
    pub fn covers(self, other: MediaType) -> bool {
        self == MediaType::Av || self == other
    }
}

/// Dispatcher-level wrapper around a raw or decoded buffer.
///
/// Cloning is cheap: the payload is a shared [`Bytes`] handle, so every
/// attached receiver reads the same bytes. The datum is dropped once the last
/// receiver advances past it.
#[derive(Debug, Clone)]
pub struct MediaData {
    pub media_type: MediaType,
    /// True when the buffer holds decoded samples rather than bitstream.
    pub is_raw: bool,
    pub key_frame: bool,
    /// Presentation timestamp in 90 kHz ticks.
    pub pts: u64,
    pub ssrc: Option<u32>,
    pub buff: Bytes,
}

impl MediaData {
    pub fn video(buff: Bytes, key_frame: bool, pts: u64) -> Self {
        Self {
            media_type: MediaType::Video,
            is_raw: false,
            key_frame,
            pts,
            ssrc: None,
            buff,
        }
    }

    pub fn audio(buff: Bytes, pts: u64) -> Self {
        Self {
            media_type: MediaType::Audio,
            is_raw: false,
            key_frame: false,
            pts,
            ssrc: None,
            buff,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn av_pause_covers_both_tracks() {
        assert!(MediaType::Av.covers(MediaType::Audio));
        assert!(MediaType::Av.covers(MediaType::Video));
        assert!(MediaType::Audio.covers(MediaType::Audio));
        assert!(!MediaType::Audio.covers(MediaType::Video));
    }
}
