use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::codec::{AudioCodecDecoder, AudioSampleSink, CodecFactory};
use crate::event;
use crate::log::log_sink::LogSink;
use crate::media::{AudioTrack, CodecId, Frame, MediaData};
use crate::{sink_error, sink_warn};

use super::audio_render::AudioRender;
use super::audio_sink::AudioSink;

/// Bridges the decoder output queue to the renderer.
struct SinkAdapter {
    sink: Arc<AudioSink>,
}

impl AudioSampleSink for SinkAdapter {
    fn on_pcm(&self, data: &[u8], _pts_us: i64) {
        self.sink.write(data);
    }
}

/// One audio track: decoder plus renderer, glued by the sample sink.
pub struct AudioPlayer {
    player_id: u32,
    logger: Arc<dyn LogSink>,
    codec_id: CodecId,
    track: AudioTrack,
    sink: Arc<AudioSink>,
    decoder: Arc<AudioCodecDecoder>,
    running: AtomicBool,
}

impl AudioPlayer {
    pub fn new(
        track: AudioTrack,
        is_pc_source: bool,
        factory: &CodecFactory,
        render: Box<dyn AudioRender>,
        logger: Arc<dyn LogSink>,
    ) -> Result<Self, String> {
        if track.codec_id == CodecId::None {
            return Err("no audio codec negotiated".into());
        }
        let player_id = event::next_id();

        let sink = Arc::new(AudioSink::new(player_id, render, Arc::clone(&logger)));
        sink.set_is_pc_source(is_pc_source);

        let decoder = factory
            .create_audio_decoder(track.codec_id, Arc::clone(&logger))
            .map_err(|e| e.to_string())?;
        decoder.init(&track).map_err(|e| e.to_string())?;
        let decoder = Arc::new(decoder);
        decoder.set_sample_sink(Arc::new(SinkAdapter {
            sink: Arc::clone(&sink),
        }));

        Ok(Self {
            player_id,
            logger,
            codec_id: track.codec_id,
            track,
            sink,
            decoder,
            running: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.player_id
    }

    pub fn start(&self) -> bool {
        if self.running.load(Ordering::Acquire) {
            sink_warn!(self.logger, "[AudioPlayer] already running");
            return true;
        }

        if self.sink.prepare(self.track.channels, self.track.sample_rate).is_err()
            || self.sink.start().is_err()
        {
            sink_error!(self.logger, "[AudioPlayer] sink start failed");
            return false;
        }
        if let Err(e) = self.decoder.start() {
            sink_error!(self.logger, "[AudioPlayer] decoder start failed: {e}");
            self.sink.stop();
            return false;
        }
        self.running.store(true, Ordering::Release);
        true
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.decoder.stop();
        self.sink.stop();
    }

    pub fn release(&self) {
        self.stop();
        self.decoder.release();
        self.sink.release();
    }

    /// Feed one buffered datum into the decoder.
    pub fn process_audio_data(&self, data: &MediaData) {
        if !self.running.load(Ordering::Acquire) || data.buff.is_empty() {
            return;
        }
        let frame = Frame::audio(self.codec_id, Bytes::clone(&data.buff), data.pts, data.pts);
        self.decoder.on_frame(&frame);
    }

    /// Refresh the decoder's view of the renderer queue depth.
    pub fn update_latency(&self) {
        self.decoder.set_audio_latency_us(self.sink.latency_us());
    }

    #[must_use]
    pub fn decoder_timestamp_us(&self) -> i64 {
        self.decoder.decoder_timestamp_us()
    }

    pub fn drop_one_frame(&self) {
        self.decoder.drop_one_frame();
    }

    pub fn set_volume(&self, volume: f32) {
        self.sink.set_volume(volume);
    }
}

impl Drop for AudioPlayer {
    fn drop(&mut self) {
        self.release();
    }
}
