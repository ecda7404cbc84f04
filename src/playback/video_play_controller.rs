use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;

use crate::codec::{CodecFactory, VideoCodecDecoder};
use crate::dispatch::{BufferDispatcher, BufferReceiver, ReadStatus};
use crate::log::log_sink::LogSink;
use crate::media::{CodecId, Frame, MediaData, MediaType, TrackKind, VideoTrack};
use crate::nal;
use crate::{sink_debug, sink_error, sink_info};

use super::av_sync::VideoAudioSync;
use super::surface::Surface;

/// One render surface: video decoder, dispatcher receiver and feed thread.
pub struct VideoPlayController {
    channel_id: u32,
    logger: Arc<dyn LogSink>,
    receiver: Arc<BufferReceiver>,
    decoder: Mutex<Option<Arc<VideoCodecDecoder>>>,
    surface_id: Mutex<Option<u64>>,
    key_redirect: AtomicBool,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl VideoPlayController {
    pub fn new(channel_id: u32, logger: Arc<dyn LogSink>) -> Self {
        Self {
            channel_id,
            logger,
            receiver: Arc::new(BufferReceiver::new()),
            decoder: Mutex::new(None),
            surface_id: Mutex::new(None),
            key_redirect: AtomicBool::new(false),
            running: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
        }
    }

    pub fn init(&self, track: VideoTrack, factory: &CodecFactory) -> bool {
        let decoder = match factory.create_video_decoder(track.codec_id, Arc::clone(&self.logger)) {
            Ok(decoder) => decoder,
            Err(e) => {
                sink_error!(self.logger, "[VideoPlayController] create decoder: {e}");
                return false;
            }
        };
        if let Err(e) = decoder.init(&track) {
            sink_error!(self.logger, "[VideoPlayController] decoder init: {e}");
            return false;
        }
        if let Ok(mut slot) = self.decoder.lock() {
            *slot = Some(Arc::new(decoder));
        }
        true
    }

    pub fn set_surface(&self, surface: Arc<dyn Surface>, key_frame_only: bool) -> bool {
        let Some(decoder) = self.decoder.lock().ok().and_then(|d| d.clone()) else {
            return false;
        };
        if let Ok(mut slot) = self.surface_id.lock() {
            *slot = Some(surface.unique_id());
        }
        decoder.set_surface(surface);
        decoder.set_key_frame_only(key_frame_only);
        true
    }

    pub fn set_av_sync(&self, sync: Arc<VideoAudioSync>) {
        if let Some(decoder) = self.decoder.lock().ok().and_then(|d| d.clone()) {
            decoder.set_av_sync(sync);
        }
    }

    pub fn set_fatal_handler(&self, handler: Box<dyn Fn() + Send + Sync>) {
        if let Some(decoder) = self.decoder.lock().ok().and_then(|d| d.clone()) {
            decoder.set_fatal_handler(handler);
        }
    }

    #[must_use]
    pub fn surface_id(&self) -> Option<u64> {
        self.surface_id.lock().ok().and_then(|s| *s)
    }

    /// Render only key frames (background scene).
    pub fn set_key_mode(&self, enabled: bool) {
        if let Some(decoder) = self.decoder.lock().ok().and_then(|d| d.clone()) {
            decoder.set_key_frame_only(enabled);
        }
    }

    pub fn set_key_redirect(&self, key_redirect: bool) {
        sink_info!(
            self.logger,
            "[VideoPlayController] key redirect: {key_redirect}, channelId: {}",
            self.channel_id
        );
        self.key_redirect.store(key_redirect, Ordering::Relaxed);
    }

    #[must_use]
    pub fn key_redirect(&self) -> bool {
        self.key_redirect.load(Ordering::Relaxed)
    }

    pub fn start(&self, dispatcher: &BufferDispatcher) -> bool {
        let Some(decoder) = self.decoder.lock().ok().and_then(|d| d.clone()) else {
            sink_error!(self.logger, "[VideoPlayController] start before init");
            return false;
        };
        if self.running.load(Ordering::Acquire) {
            return true;
        }
        if let Err(e) = decoder.start() {
            sink_error!(self.logger, "[VideoPlayController] decoder start: {e}");
            return false;
        }

        self.running.store(true, Ordering::Release);
        dispatcher.attach_receiver(&self.receiver);
        self.start_video_thread(decoder);
        true
    }

    pub fn stop(&self, dispatcher: &BufferDispatcher) {
        dispatcher.detach_receiver(&self.receiver);
        self.running.store(false, Ordering::Release);
        self.receiver.notify_read_stop();
        if let Some(thread) = self.thread.lock().ok().and_then(|mut t| t.take()) {
            let _ = thread.join();
        }
        if let Some(decoder) = self.decoder.lock().ok().and_then(|d| d.clone()) {
            decoder.stop();
        }
    }

    pub fn release(&self) {
        if let Ok(mut slot) = self.decoder.lock() {
            if let Some(decoder) = slot.take() {
                decoder.release();
            }
        }
    }

    fn start_video_thread(&self, decoder: Arc<VideoCodecDecoder>) {
        let running = Arc::clone(&self.running);
        let receiver = Arc::clone(&self.receiver);
        let logger = Arc::clone(&self.logger);
        let channel_id = self.channel_id;

        let handle = thread::Builder::new()
            .name("videoplay".into())
            .spawn(move || {
                sink_debug!(logger, "[VideoPlayController] play thread start, channelId: {channel_id}");
                while running.load(Ordering::Acquire) {
                    let status = receiver.request_read(MediaType::Video, |data| {
                        decoder.on_frame(&media_data_to_frame(data));
                    });
                    if status == ReadStatus::Stopped {
                        if !running.load(Ordering::Acquire) {
                            break;
                        }
                        thread::sleep(Duration::from_millis(5));
                    }
                }
                sink_debug!(logger, "[VideoPlayController] play thread exit, channelId: {channel_id}");
            })
            .ok();

        if let Ok(mut slot) = self.thread.lock() {
            *slot = handle;
        }
    }
}

fn media_data_to_frame(data: &MediaData) -> Frame {
    let prefix = nal::prefix_size(&data.buff);
    Frame {
        codec_id: CodecId::H264,
        track: TrackKind::Video,
        key_frame: data.key_frame,
        dts: data.pts,
        pts: data.pts,
        payload: Bytes::clone(&data.buff),
        prefix,
        ssrc: data.ssrc,
    }
}
