use std::sync::Arc;

use crate::log::log_sink::LogSink;
use crate::media::CodecId;
use crate::sink_error;

use super::audio_decoder::AudioCodecDecoder;
use super::backend::DecoderBackend;
use super::codec_error::CodecError;
use super::h264_backend::Openh264Backend;
use super::pcm_backend::PcmBackend;
use super::video_decoder::VideoCodecDecoder;

pub type BackendFactoryFn = Box<dyn Fn() -> Box<dyn DecoderBackend> + Send + Sync>;

/// Per-codec decoder instantiation. The linear audio codecs and H.264 use the
/// built-in backends; AAC needs a platform backend registered by the embedder
/// (the OS codec service owns that decoder).
pub struct CodecFactory {
    aac_backend: Option<BackendFactoryFn>,
}

impl CodecFactory {
    #[must_use]
    pub fn new() -> Self {
        Self { aac_backend: None }
    }

    pub fn set_aac_backend(&mut self, factory: BackendFactoryFn) {
        self.aac_backend = Some(factory);
    }

    pub fn create_audio_decoder(
        &self,
        codec: CodecId,
        logger: Arc<dyn LogSink>,
    ) -> Result<AudioCodecDecoder, CodecError> {
        match codec {
            CodecId::G711a | CodecId::G711u | CodecId::PcmS16be => Ok(AudioCodecDecoder::new(
                Box::new(PcmBackend::new(codec)),
                logger,
            )),
            CodecId::Aac => match self.aac_backend.as_ref() {
                Some(factory) => Ok(AudioCodecDecoder::new(factory(), logger)),
                None => {
                    sink_error!(logger, "[CodecFactory] no AAC backend registered");
                    Err(CodecError::UnsupportedCodec("AAC"))
                }
            },
            _ => Err(CodecError::UnsupportedCodec("audio codec")),
        }
    }

    pub fn create_video_decoder(
        &self,
        codec: CodecId,
        logger: Arc<dyn LogSink>,
    ) -> Result<VideoCodecDecoder, CodecError> {
        match codec {
            CodecId::H264 => Ok(VideoCodecDecoder::new(
                Box::new(Openh264Backend::new()),
                logger,
            )),
            _ => Err(CodecError::UnsupportedCodec("video codec")),
        }
    }
}

impl Default for CodecFactory {
    fn default() -> Self {
        Self::new()
    }
}
