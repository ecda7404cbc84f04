//! Owns the audio play controller and one video play controller per attached
//! surface; routes volume, scene-type and key-redirect changes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::codec::{BackendFactoryFn, CodecFactory};
use crate::dispatch::BufferDispatcher;
use crate::log::log_sink::LogSink;
use crate::media::{AudioTrack, CodecId, VideoTrack};
use crate::{sink_error, sink_info, sink_warn};

use super::audio_play_controller::AudioPlayController;
use super::audio_render::AudioRender;
use super::av_sync::{AudioClock, VideoAudioSync};
use super::cpal_render::CpalAudioRender;
use super::surface::Surface;
use super::video_play_controller::VideoPlayController;

/// Rendering intent for a surface; background surfaces decode key frames only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneType {
    Foreground,
    Background,
}

/// Out-of-band notifications surfaced through the media channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerNotify {
    AccelerationDone,
    DecoderDied { surface_id: u64 },
    KeymodeStart { surface_id: u64 },
    KeymodeStop { surface_id: u64 },
}

pub type NotifyHandler = Box<dyn Fn(ControllerNotify) + Send + Sync>;
pub type RenderFactory = Box<dyn Fn() -> Box<dyn AudioRender> + Send + Sync>;

pub struct MediaController {
    channel_id: u32,
    logger: Arc<dyn LogSink>,
    audio: Mutex<Option<Arc<AudioPlayController>>>,
    videos: Mutex<HashMap<u64, Arc<VideoPlayController>>>,
    sync: Arc<VideoAudioSync>,
    codec_factory: Mutex<CodecFactory>,
    render_factory: Mutex<RenderFactory>,
    notify: Arc<Mutex<Option<NotifyHandler>>>,
    audio_track: Mutex<AudioTrack>,
    video_track: Mutex<VideoTrack>,
    is_playing: AtomicBool,
}

impl MediaController {
    pub fn new(channel_id: u32, logger: Arc<dyn LogSink>) -> Self {
        let render_logger = Arc::clone(&logger);
        Self {
            channel_id,
            logger,
            audio: Mutex::new(None),
            videos: Mutex::new(HashMap::new()),
            sync: Arc::new(VideoAudioSync::new()),
            codec_factory: Mutex::new(CodecFactory::new()),
            render_factory: Mutex::new(Box::new(move || {
                Box::new(CpalAudioRender::new(Arc::clone(&render_logger)))
            })),
            notify: Arc::new(Mutex::new(None)),
            audio_track: Mutex::new(AudioTrack::default()),
            video_track: Mutex::new(VideoTrack::default()),
            is_playing: AtomicBool::new(false),
        }
    }

    /// Replace the renderer factory (tests, embedders with their own output).
    pub fn set_render_factory(&self, factory: RenderFactory) {
        if let Ok(mut slot) = self.render_factory.lock() {
            *slot = factory;
        }
    }

    /// Register the platform AAC decoder backend.
    pub fn set_aac_backend(&self, factory: BackendFactoryFn) {
        if let Ok(mut codec_factory) = self.codec_factory.lock() {
            codec_factory.set_aac_backend(factory);
        }
    }

    pub fn set_notify_handler(&self, handler: NotifyHandler) {
        if let Ok(mut slot) = self.notify.lock() {
            *slot = Some(handler);
        }
    }

    fn emit(&self, notify: ControllerNotify) {
        if let Ok(slot) = self.notify.lock() {
            if let Some(handler) = slot.as_ref() {
                handler(notify);
            }
        }
    }

    /// Prepare players for the negotiated tracks. Fails when neither track
    /// carries a codec or when the audio pipeline cannot be built.
    pub fn init(&self, audio_track: AudioTrack, video_track: VideoTrack, is_pc_source: bool) -> bool {
        if audio_track.codec_id == CodecId::None && video_track.codec_id == CodecId::None {
            sink_warn!(self.logger, "[MediaController] no need to play");
            return false;
        }
        if let Ok(mut slot) = self.audio_track.lock() {
            *slot = audio_track;
        }
        if let Ok(mut slot) = self.video_track.lock() {
            *slot = video_track;
        }

        if audio_track.codec_id != CodecId::None {
            let controller = Arc::new(AudioPlayController::new(
                self.channel_id,
                Arc::clone(&self.logger),
            ));
            let render = match self.render_factory.lock() {
                Ok(factory) => factory(),
                Err(_) => return false,
            };
            let ok = match self.codec_factory.lock() {
                Ok(codec_factory) => {
                    controller.init(audio_track, is_pc_source, &codec_factory, render)
                }
                Err(_) => false,
            };
            if !ok {
                sink_error!(self.logger, "[MediaController] audio play init error");
                return false;
            }
            self.sync
                .set_audio_clock(Arc::clone(&controller) as Arc<dyn AudioClock>);
            if let Ok(mut slot) = self.audio.lock() {
                *slot = Some(controller);
            }
        }

        true
    }

    pub fn start(&self, dispatcher: &BufferDispatcher) {
        sink_info!(
            self.logger,
            "[MediaController] media play start, channelId: {}",
            self.channel_id
        );
        if let Some(audio) = self.audio.lock().ok().and_then(|a| a.clone()) {
            if audio.start(dispatcher) {
                self.is_playing.store(true, Ordering::Release);
            }
        }
        let videos: Vec<_> = self
            .videos
            .lock()
            .map(|v| v.values().cloned().collect())
            .unwrap_or_default();
        for video in videos {
            if video.start(dispatcher) {
                self.is_playing.store(true, Ordering::Release);
            }
        }
    }

    pub fn stop(&self, dispatcher: &BufferDispatcher) {
        if !self.is_playing.load(Ordering::Acquire) {
            return;
        }
        if let Some(audio) = self.audio.lock().ok().and_then(|a| a.clone()) {
            audio.stop(dispatcher);
        }
        let videos: Vec<_> = self
            .videos
            .lock()
            .map(|v| v.values().cloned().collect())
            .unwrap_or_default();
        for video in videos {
            video.stop(dispatcher);
        }
        self.is_playing.store(false, Ordering::Release);
        sink_info!(
            self.logger,
            "[MediaController] media play stop done, channelId: {}",
            self.channel_id
        );
    }

    pub fn release(&self) {
        if let Ok(mut slot) = self.audio.lock() {
            if let Some(audio) = slot.take() {
                audio.release();
            }
        }
        if let Ok(mut videos) = self.videos.lock() {
            for video in videos.values() {
                video.release();
            }
            videos.clear();
        }
    }

    /// Attach a render surface, instantiating its video player.
    pub fn append_surface(
        &self,
        surface: Arc<dyn Surface>,
        scene_type: SceneType,
        dispatcher: &BufferDispatcher,
    ) -> bool {
        let video_track = match self.video_track.lock() {
            Ok(track) => *track,
            Err(_) => return false,
        };
        if video_track.codec_id == CodecId::None {
            sink_warn!(self.logger, "[MediaController] no need to play video");
            return false;
        }

        let surface_id = surface.unique_id();
        let Ok(mut videos) = self.videos.lock() else {
            return false;
        };
        if videos.contains_key(&surface_id) {
            sink_error!(self.logger, "[MediaController] surface in use: {surface_id:#x}");
            return false;
        }

        let controller = Arc::new(VideoPlayController::new(
            self.channel_id,
            Arc::clone(&self.logger),
        ));
        let inited = match self.codec_factory.lock() {
            Ok(codec_factory) => controller.init(video_track, &codec_factory),
            Err(_) => false,
        };
        let key_frame_only = scene_type == SceneType::Background;
        if !inited || !controller.set_surface(surface, key_frame_only) {
            sink_error!(self.logger, "[MediaController] video play init failed");
            return false;
        }
        controller.set_av_sync(Arc::clone(&self.sync));

        let notify = Arc::clone(&self.notify);
        controller.set_fatal_handler(Box::new(move || {
            if let Ok(slot) = notify.lock() {
                if let Some(handler) = slot.as_ref() {
                    handler(ControllerNotify::DecoderDied { surface_id });
                }
            }
        }));

        videos.insert(surface_id, Arc::clone(&controller));
        drop(videos);

        if self.is_playing.load(Ordering::Acquire) {
            controller.start(dispatcher);
        }
        sink_info!(
            self.logger,
            "[MediaController] append surface done, channelId: {}",
            self.channel_id
        );
        true
    }

    pub fn remove_surface(&self, surface_id: u64, dispatcher: &BufferDispatcher) {
        let removed = self
            .videos
            .lock()
            .ok()
            .and_then(|mut videos| videos.remove(&surface_id));
        if let Some(controller) = removed {
            controller.stop(dispatcher);
            controller.release();
        }
        sink_info!(
            self.logger,
            "[MediaController] remove surface done, channelId: {}",
            self.channel_id
        );
    }

    pub fn set_volume(&self, volume: f32) {
        if let Some(audio) = self.audio.lock().ok().and_then(|a| a.clone()) {
            audio.set_volume(volume);
        }
    }

    pub fn set_key_mode(&self, surface_id: u64, enabled: bool) {
        if let Some(video) = self
            .videos
            .lock()
            .ok()
            .and_then(|videos| videos.get(&surface_id).cloned())
        {
            video.set_key_mode(enabled);
            self.emit(if enabled {
                ControllerNotify::KeymodeStart { surface_id }
            } else {
                ControllerNotify::KeymodeStop { surface_id }
            });
        }
    }

    pub fn set_key_redirect(&self, surface_id: u64, key_redirect: bool) {
        if let Some(video) = self
            .videos
            .lock()
            .ok()
            .and_then(|videos| videos.get(&surface_id).cloned())
        {
            video.set_key_redirect(key_redirect);
        }
    }

    #[must_use]
    pub fn surface_count(&self) -> usize {
        self.videos.lock().map(|v| v.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::log::NoopLogSink;
    use crate::playback::audio_render::{AudioRenderCallback, RenderResult};
    use crate::playback::surface::VideoFrame;

    struct NullRender;
    impl AudioRender for NullRender {
        fn prepare(&mut self, _c: u32, _r: u32) -> RenderResult<()> {
            Ok(())
        }
        fn start(&mut self) -> RenderResult<()> {
            Ok(())
        }
        fn stop(&mut self) -> RenderResult<()> {
            Ok(())
        }
        fn pause(&mut self) -> RenderResult<()> {
            Ok(())
        }
        fn drain(&mut self) -> RenderResult<()> {
            Ok(())
        }
        fn flush(&mut self) -> RenderResult<()> {
            Ok(())
        }
        fn release(&mut self) {}
        fn set_volume(&mut self, _v: f32) -> RenderResult<()> {
            Ok(())
        }
        fn set_parameters(&mut self, _b: u32, _c: u32, _r: u32) -> RenderResult<()> {
            Ok(())
        }
        fn write(&mut self, buf: &[u8]) -> RenderResult<usize> {
            Ok(buf.len())
        }
        fn set_callback(&mut self, _cb: Arc<dyn AudioRenderCallback>) {}
        fn latency_us(&self) -> i64 {
            0
        }
    }

    struct NullSurface(u64);
    impl Surface for NullSurface {
        fn unique_id(&self) -> u64 {
            self.0
        }
        fn render(&self, _frame: &VideoFrame) {}
    }

    fn new_controller() -> MediaController {
        let controller = MediaController::new(1, Arc::new(NoopLogSink));
        controller.set_render_factory(Box::new(|| Box::new(NullRender)));
        controller
    }

    fn tracks() -> (AudioTrack, VideoTrack) {
        (
            AudioTrack {
                codec_id: CodecId::PcmS16be,
                sample_rate: 48_000,
                channels: 2,
                sample_bit: 16,
            },
            VideoTrack {
                codec_id: CodecId::H264,
                width: 1280,
                height: 720,
                frame_rate: 30,
            },
        )
    }

    #[test]
    fn init_requires_some_codec() {
        let controller = new_controller();
        assert!(!controller.init(AudioTrack::default(), VideoTrack::default(), false));

        let (audio, video) = tracks();
        assert!(controller.init(audio, video, false));
    }

    #[test]
    fn append_surface_rejects_duplicates_and_missing_video() {
        let controller = new_controller();
        let dispatcher = BufferDispatcher::new(16, 4);

        // Without a negotiated video track nothing can be appended.
        let (audio, _) = tracks();
        assert!(controller.init(audio, VideoTrack::default(), false));
        assert!(!controller.append_surface(
            Arc::new(NullSurface(7)),
            SceneType::Foreground,
            &dispatcher
        ));

        let controller = new_controller();
        let (audio, video) = tracks();
        assert!(controller.init(audio, video, false));
        assert!(controller.append_surface(
            Arc::new(NullSurface(7)),
            SceneType::Foreground,
            &dispatcher
        ));
        assert!(!controller.append_surface(
            Arc::new(NullSurface(7)),
            SceneType::Background,
            &dispatcher
        ));
        assert_eq!(controller.surface_count(), 1);

        controller.remove_surface(7, &dispatcher);
        assert_eq!(controller.surface_count(), 0);
        controller.release();
    }

    #[test]
    fn keymode_changes_are_notified() {
        let controller = new_controller();
        let dispatcher = BufferDispatcher::new(16, 4);
        let (audio, video) = tracks();
        assert!(controller.init(audio, video, false));

        let notifications = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&notifications);
        controller.set_notify_handler(Box::new(move |n| {
            sink.lock().unwrap().push(n);
        }));

        assert!(controller.append_surface(
            Arc::new(NullSurface(9)),
            SceneType::Foreground,
            &dispatcher
        ));
        controller.set_key_mode(9, true);
        controller.set_key_mode(9, false);

        let seen = notifications.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                ControllerNotify::KeymodeStart { surface_id: 9 },
                ControllerNotify::KeymodeStop { surface_id: 9 },
            ]
        );
        controller.release();
    }
}
