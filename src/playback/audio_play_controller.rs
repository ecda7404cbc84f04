use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::codec::CodecFactory;
use crate::dispatch::{BufferDispatcher, BufferReceiver, ReadStatus};
use crate::log::log_sink::LogSink;
use crate::media::{AudioTrack, CodecId, MediaType};
use crate::{sink_debug, sink_error, sink_info, sink_warn};

use super::audio_player::AudioPlayer;
use super::audio_render::AudioRender;
use super::av_sync::AudioClock;

/// Owns the audio player, its dispatcher receiver and the play thread.
pub struct AudioPlayController {
    channel_id: u32,
    logger: Arc<dyn LogSink>,
    receiver: Arc<BufferReceiver>,
    player: Mutex<Option<Arc<AudioPlayer>>>,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl AudioPlayController {
    pub fn new(channel_id: u32, logger: Arc<dyn LogSink>) -> Self {
        Self {
            channel_id,
            logger,
            receiver: Arc::new(BufferReceiver::new()),
            player: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
        }
    }

    pub fn init(
        &self,
        track: AudioTrack,
        is_pc_source: bool,
        factory: &CodecFactory,
        render: Box<dyn AudioRender>,
    ) -> bool {
        if track.codec_id == CodecId::None {
            sink_warn!(self.logger, "[AudioPlayController] no audio to play");
            return false;
        }
        match AudioPlayer::new(track, is_pc_source, factory, render, Arc::clone(&self.logger)) {
            Ok(player) => {
                if let Ok(mut slot) = self.player.lock() {
                    *slot = Some(Arc::new(player));
                }
                true
            }
            Err(e) => {
                sink_error!(self.logger, "[AudioPlayController] init failed: {e}");
                false
            }
        }
    }

    pub fn start(&self, dispatcher: &BufferDispatcher) -> bool {
        let Some(player) = self.player.lock().ok().and_then(|p| p.clone()) else {
            sink_error!(self.logger, "[AudioPlayController] start before init");
            return false;
        };
        if self.running.load(Ordering::Acquire) {
            sink_warn!(self.logger, "[AudioPlayController] already running");
            return true;
        }
        if !player.start() {
            return false;
        }

        self.running.store(true, Ordering::Release);
        dispatcher.attach_receiver(&self.receiver);
        self.start_audio_thread(player);
        true
    }

    pub fn stop(&self, dispatcher: &BufferDispatcher) {
        dispatcher.detach_receiver(&self.receiver);
        self.running.store(false, Ordering::Release);
        self.receiver.notify_read_stop();
        if let Some(thread) = self.thread.lock().ok().and_then(|mut t| t.take()) {
            let _ = thread.join();
        }
        if let Some(player) = self.player.lock().ok().and_then(|p| p.clone()) {
            player.stop();
        }
        sink_info!(
            self.logger,
            "[AudioPlayController] stopped, channelId: {}",
            self.channel_id
        );
    }

    pub fn release(&self) {
        if let Ok(mut slot) = self.player.lock() {
            if let Some(player) = slot.take() {
                player.release();
            }
        }
    }

    pub fn set_volume(&self, volume: f32) {
        if let Some(player) = self.player.lock().ok().and_then(|p| p.clone()) {
            player.set_volume(volume);
        }
    }

    fn start_audio_thread(&self, player: Arc<AudioPlayer>) {
        let running = Arc::clone(&self.running);
        let receiver = Arc::clone(&self.receiver);
        let logger = Arc::clone(&self.logger);
        let channel_id = self.channel_id;

        let handle = thread::Builder::new()
            .name("audioplay".into())
            .spawn(move || {
                sink_debug!(logger, "[AudioPlayController] play thread start, channelId: {channel_id}");
                while running.load(Ordering::Acquire) {
                    let status = receiver.request_read(MediaType::Audio, |data| {
                        player.process_audio_data(data);
                    });
                    match status {
                        ReadStatus::Data => player.update_latency(),
                        ReadStatus::Stopped => {
                            if !running.load(Ordering::Acquire) {
                                break;
                            }
                            thread::sleep(Duration::from_millis(5));
                        }
                    }
                }
                sink_debug!(logger, "[AudioPlayController] play thread exit, channelId: {channel_id}");
            })
            .ok();

        if let Ok(mut slot) = self.thread.lock() {
            *slot = handle;
        }
    }
}

impl AudioClock for AudioPlayController {
    /// Master clock for A/V sync, in microseconds; 0 while no clock exists.
    fn audio_decoder_timestamp_us(&self) -> i64 {
        self.player
            .lock()
            .ok()
            .and_then(|p| p.clone())
            .map(|p| p.decoder_timestamp_us())
            .unwrap_or(0)
    }

    fn drop_one_frame(&self) {
        if let Some(player) = self.player.lock().ok().and_then(|p| p.clone()) {
            player.drop_one_frame();
        }
    }
}
