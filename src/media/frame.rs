use bytes::Bytes;

use crate::media::codec_id::{CodecId, TrackKind};
use crate::nal;

/// One access unit (or one NAL unit for video) produced by the ingest
/// pipeline. Immutable after publish; receivers share the payload buffer.
#[derive(Debug, Clone)]
pub struct Frame {
    pub codec_id: CodecId,
    pub track: TrackKind,
    pub key_frame: bool,
    /// Decode timestamp in 90 kHz ticks.
    pub dts: u64,
    /// Presentation timestamp in 90 kHz ticks.
    pub pts: u64,
    /// Payload bytes. For video this includes the Annex-B start-code prefix.
    pub payload: Bytes,
    /// Length of the start-code prefix for video payloads, 0 for audio.
    pub prefix: usize,
    pub ssrc: Option<u32>,
}

impl Frame {
    pub fn video(payload: Bytes, prefix: usize, dts: u64, pts: u64) -> Self {
        let key_frame = payload
            .get(prefix)
            .is_some_and(|b| nal::h264_type(*b) == nal::NAL_IDR);
        Self {
            codec_id: CodecId::H264,
            track: TrackKind::Video,
            key_frame,
            dts,
            pts,
            payload,
            prefix,
            ssrc: None,
        }
    }

    pub fn audio(codec_id: CodecId, payload: Bytes, dts: u64, pts: u64) -> Self {
        Self {
            codec_id,
            track: TrackKind::Audio,
            key_frame: false,
            dts,
            pts,
            payload,
            prefix: 0,
            ssrc: None,
        }
    }

    /// The H.264 NAL unit type of a video frame, if any.
    #[must_use]
    pub fn nal_type(&self) -> Option<u8> {
        if self.track != TrackKind::Video {
            return None;
        }
        self.payload.get(self.prefix).map(|b| nal::h264_type(*b))
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn video_frame_classifies_idr_as_key() {
        let idr = Bytes::from_static(&[0, 0, 0, 1, 0x65, 0xAA]);
        let frame = Frame::video(idr, 4, 0, 0);
        assert!(frame.key_frame);
        assert_eq!(frame.nal_type(), Some(nal::NAL_IDR));
    }

    #[test]
    fn video_frame_non_idr_is_not_key() {
        let slice = Bytes::from_static(&[0, 0, 1, 0x41, 0xAA]);
        let frame = Frame::video(slice, 3, 90, 90);
        assert!(!frame.key_frame);
        assert_eq!(frame.nal_type(), Some(nal::NAL_NON_IDR));
    }

    #[test]
    fn audio_frame_has_no_nal_type() {
        let frame = Frame::audio(CodecId::Aac, Bytes::from_static(&[0xFF, 0xF1]), 0, 0);
        assert_eq!(frame.nal_type(), None);
        assert!(!frame.key_frame);
    }
}
