//! Video decode runner: mirrors the audio runner, with surface output,
//! audio-anchored pacing and a key-frame-only mode for background scenes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::log::log_sink::LogSink;
use crate::media::{ticks_to_us, Frame, VideoTrack};
use crate::nal;
use crate::playback::av_sync::SyncAction;
use crate::playback::surface::{Surface, VideoFrame};
use crate::playback::VideoAudioSync;
use crate::{sink_debug, sink_error, sink_warn};

use super::backend::{BackendFormat, BackendObserver, BufferInfo, DecoderBackend};
use super::codec_error::CodecError;
use super::{DecoderState, MAX_RENDER_BUFFER};

const RENDER_POLL_INTERVAL: Duration = Duration::from_millis(10);
const DEFAULT_FRAME_RATE: u32 = 60;

struct RenderEntry {
    index: u32,
    pts_us: i64,
    data: Vec<u8>,
}

struct RenderState {
    queue: VecDeque<RenderEntry>,
    ready: bool,
}

pub(crate) struct VideoInner {
    logger: Arc<dyn LogSink>,
    backend: Mutex<Option<Box<dyn DecoderBackend>>>,
    input_indices: Mutex<VecDeque<u32>>,
    input_cond: Condvar,
    render: Mutex<RenderState>,
    render_cond: Condvar,
    surface: Mutex<Option<Arc<dyn Surface>>>,
    sync: Mutex<Option<Arc<VideoAudioSync>>>,
    state: Mutex<DecoderState>,
    key_only: AtomicBool,
    dims: Mutex<(u32, u32)>,
    frame_interval: Mutex<Duration>,
    dropped_frames: AtomicU32,
    on_fatal: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl VideoInner {
    fn release_output(&self, index: u32) {
        if let Ok(mut backend) = self.backend.lock() {
            if let Some(backend) = backend.as_mut() {
                let _ = backend.release_output_buffer(index);
            }
        }
    }

    fn clear_render_queue(&self, render: &mut RenderState) {
        while let Some(entry) = render.queue.pop_front() {
            self.release_output(entry.index);
        }
    }
}

impl BackendObserver for VideoInner {
    fn on_input_available(&self, index: u32) {
        if let Ok(mut indices) = self.input_indices.lock() {
            indices.push_back(index);
        }
        self.input_cond.notify_all();
    }

    fn on_output_available(&self, index: u32, info: BufferInfo, data: &[u8]) {
        if info.size == 0 || info.size > data.len() {
            sink_error!(
                self.logger,
                "[VideoDecoder] bad output info: size {} of {}",
                info.size,
                data.len()
            );
            self.release_output(index);
            return;
        }

        let Ok(mut render) = self.render.lock() else {
            self.release_output(index);
            return;
        };
        if !render.ready {
            self.release_output(index);
            return;
        }
        if render.queue.len() > MAX_RENDER_BUFFER {
            sink_warn!(self.logger, "[VideoDecoder] render queue overrun, dropping all");
            self.clear_render_queue(&mut render);
        }
        render.queue.push_back(RenderEntry {
            index,
            pts_us: info.presentation_us,
            data: data[..info.size].to_vec(),
        });
        drop(render);
        self.render_cond.notify_all();
    }

    fn on_format_changed(&self, format: &BackendFormat) {
        if let BackendFormat::Video { width, height, .. } = format {
            sink_debug!(self.logger, "[VideoDecoder] picture size {width}x{height}");
            if let Ok(mut dims) = self.dims.lock() {
                *dims = (*width, *height);
            }
        }
    }

    fn on_error(&self, code: i32) {
        sink_error!(self.logger, "[VideoDecoder] backend error {code}");
        if let Ok(handler) = self.on_fatal.lock() {
            if let Some(handler) = handler.as_ref() {
                handler();
            }
        }
    }
}

/// Decode runner around an asynchronous video [`DecoderBackend`].
pub struct VideoCodecDecoder {
    inner: Arc<VideoInner>,
    render_thread: Mutex<Option<JoinHandle<()>>>,
}

impl VideoCodecDecoder {
    pub fn new(backend: Box<dyn DecoderBackend>, logger: Arc<dyn LogSink>) -> Self {
        Self {
            inner: Arc::new(VideoInner {
                logger,
                backend: Mutex::new(Some(backend)),
                input_indices: Mutex::new(VecDeque::new()),
                input_cond: Condvar::new(),
                render: Mutex::new(RenderState {
                    queue: VecDeque::new(),
                    ready: false,
                }),
                render_cond: Condvar::new(),
                surface: Mutex::new(None),
                sync: Mutex::new(None),
                state: Mutex::new(DecoderState::Created),
                key_only: AtomicBool::new(false),
                dims: Mutex::new((0, 0)),
                frame_interval: Mutex::new(Duration::from_micros(
                    1_000_000 / u64::from(DEFAULT_FRAME_RATE),
                )),
                dropped_frames: AtomicU32::new(0),
                on_fatal: Mutex::new(None),
            }),
            render_thread: Mutex::new(None),
        }
    }

    pub fn set_surface(&self, surface: Arc<dyn Surface>) {
        if let Ok(mut slot) = self.inner.surface.lock() {
            *slot = Some(surface);
        }
    }

    pub fn set_av_sync(&self, sync: Arc<VideoAudioSync>) {
        if let Ok(mut slot) = self.inner.sync.lock() {
            *slot = Some(sync);
        }
    }

    pub fn set_fatal_handler(&self, handler: Box<dyn Fn() + Send + Sync>) {
        if let Ok(mut slot) = self.inner.on_fatal.lock() {
            *slot = Some(handler);
        }
    }

    /// Only decode and render IDR frames (background scenes).
    pub fn set_key_frame_only(&self, enabled: bool) {
        self.inner.key_only.store(enabled, Ordering::Relaxed);
    }

    pub fn init(&self, track: &VideoTrack) -> Result<(), CodecError> {
        let observer: Arc<dyn BackendObserver> = Arc::clone(&self.inner) as _;
        let Ok(mut backend) = self.inner.backend.lock() else {
            return Err(CodecError::BadState("init"));
        };
        let Some(backend) = backend.as_mut() else {
            return Err(CodecError::BadState("init after release"));
        };

        backend.set_observer(observer);
        backend.configure(BackendFormat::Video {
            width: track.width,
            height: track.height,
            frame_rate: track.frame_rate,
        })?;
        backend.prepare()?;

        let frame_rate = if track.frame_rate == 0 {
            DEFAULT_FRAME_RATE
        } else {
            track.frame_rate
        };
        if let Ok(mut interval) = self.inner.frame_interval.lock() {
            *interval = Duration::from_micros(1_000_000 / u64::from(frame_rate));
        }
        if let Ok(mut dims) = self.inner.dims.lock() {
            *dims = (track.width, track.height);
        }
        if let Ok(mut state) = self.inner.state.lock() {
            *state = DecoderState::Inited;
        }
        Ok(())
    }

    pub fn start(&self) -> Result<(), CodecError> {
        {
            let Ok(state) = self.inner.state.lock() else {
                return Err(CodecError::BadState("start"));
            };
            if *state == DecoderState::Running {
                return Ok(());
            }
            if *state != DecoderState::Inited && *state != DecoderState::Stopped {
                return Err(CodecError::BadState("start"));
            }
        }

        {
            let Ok(mut backend) = self.inner.backend.lock() else {
                return Err(CodecError::BadState("start"));
            };
            let Some(backend) = backend.as_mut() else {
                return Err(CodecError::BadState("start after release"));
            };
            backend.start()?;
        }

        self.start_render();
        if let Ok(mut state) = self.inner.state.lock() {
            *state = DecoderState::Running;
        }
        Ok(())
    }

    pub fn stop(&self) {
        {
            let Ok(state) = self.inner.state.lock() else { return };
            if *state != DecoderState::Running {
                return;
            }
        }
        self.stop_render();

        // Stop the backend outside the slot; its worker callbacks lock the
        // same slot, and joining the worker under it would deadlock.
        let mut backend = self
            .inner
            .backend
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        let mut flush_failed = false;
        if let Some(backend) = backend.as_mut() {
            if backend.flush().is_err() {
                flush_failed = true;
            } else {
                let _ = backend.stop();
                let _ = backend.reset();
            }
        }
        if flush_failed {
            sink_error!(self.inner.logger, "[VideoDecoder] flush failed, releasing");
            if let Some(mut backend) = backend {
                backend.release();
            }
            if let Ok(mut state) = self.inner.state.lock() {
                *state = DecoderState::Released;
            }
            return;
        }

        if let Ok(mut slot) = self.inner.backend.lock() {
            *slot = backend;
        }
        if let Ok(mut state) = self.inner.state.lock() {
            *state = DecoderState::Stopped;
        }
    }

    pub fn release(&self) {
        let backend = self
            .inner
            .backend
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(mut backend) = backend {
            backend.release();
        }
        if let Ok(mut state) = self.inner.state.lock() {
            *state = DecoderState::Released;
        }
    }

    /// Queue one NAL unit. In key-frame-only mode everything except
    /// parameter sets and IDR slices is skipped.
    pub fn on_frame(&self, frame: &Frame) {
        {
            let Ok(state) = self.inner.state.lock() else { return };
            if *state != DecoderState::Running {
                return;
            }
        }

        if self.inner.key_only.load(Ordering::Relaxed) {
            let keep = frame.key_frame
                || matches!(frame.nal_type(), Some(nal::NAL_SPS) | Some(nal::NAL_PPS));
            if !keep {
                return;
            }
        }

        let index = {
            let Ok(mut indices) = self.inner.input_indices.lock() else {
                return;
            };
            if indices.is_empty() {
                indices = match self
                    .inner
                    .input_cond
                    .wait_timeout(indices, super::AUDIO_DECODE_WAIT)
                {
                    Ok((guard, _)) => guard,
                    Err(_) => return,
                };
            }
            match indices.pop_front() {
                Some(index) => index,
                None => {
                    self.inner.dropped_frames.fetch_add(1, Ordering::Relaxed);
                    sink_warn!(self.inner.logger, "[VideoDecoder] input wait timed out");
                    return;
                }
            }
        };

        let info = BufferInfo {
            presentation_us: ticks_to_us(frame.pts),
            size: frame.payload.len(),
        };
        if let Ok(mut backend) = self.inner.backend.lock() {
            if let Some(backend) = backend.as_mut() {
                if let Err(e) = backend.queue_input_buffer(index, &frame.payload, info) {
                    sink_error!(self.inner.logger, "[VideoDecoder] queue input: {e}");
                }
            }
        }
    }

    fn start_render(&self) {
        if let Ok(mut render) = self.inner.render.lock() {
            render.ready = true;
        }
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("video-render".into())
            .spawn(move || render_loop(&inner))
            .ok();
        if let Ok(mut slot) = self.render_thread.lock() {
            *slot = handle;
        }
    }

    fn stop_render(&self) {
        if let Ok(mut render) = self.inner.render.lock() {
            render.ready = false;
        }
        self.inner.render_cond.notify_all();
        let handle = self.render_thread.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        if let Ok(mut render) = self.inner.render.lock() {
            self.inner.clear_render_queue(&mut render);
        }
    }
}

fn render_loop(inner: &Arc<VideoInner>) {
    let mut last_render = Instant::now();

    loop {
        let entry = {
            let Ok(mut render) = inner.render.lock() else { return };
            loop {
                if !render.ready {
                    return;
                }
                if let Some(entry) = render.queue.pop_front() {
                    break entry;
                }
                render = match inner.render_cond.wait_timeout(render, RENDER_POLL_INTERVAL) {
                    Ok((guard, _)) => guard,
                    Err(_) => return,
                };
            }
        };

        let frame_interval = inner
            .frame_interval
            .lock()
            .map(|i| *i)
            .unwrap_or(RENDER_POLL_INTERVAL);
        let sync = inner.sync.lock().ok().and_then(|s| s.clone());

        let mut dropped = false;
        loop {
            let ready = inner.render.lock().map(|r| r.ready).unwrap_or(false);
            if !ready {
                inner.release_output(entry.index);
                return;
            }
            let action = sync
                .as_ref()
                .map(|s| s.decide(entry.pts_us, frame_interval))
                .unwrap_or(SyncAction::NoClock);
            match action {
                SyncAction::Drop => {
                    inner.dropped_frames.fetch_add(1, Ordering::Relaxed);
                    inner.release_output(entry.index);
                    dropped = true;
                    break;
                }
                SyncAction::Wait(wait) => thread::sleep(wait),
                SyncAction::Render => break,
                SyncAction::NoClock => {
                    // No audio track: pace by wall clock.
                    let elapsed = last_render.elapsed();
                    if elapsed < frame_interval {
                        thread::sleep(frame_interval - elapsed);
                    }
                    break;
                }
            }
        }
        if dropped {
            continue;
        }

        let (width, height) = inner.dims.lock().map(|d| *d).unwrap_or((0, 0));
        let surface = inner.surface.lock().ok().and_then(|s| s.clone());
        if let Some(surface) = surface {
            surface.render(&VideoFrame {
                width,
                height,
                pts_us: entry.pts_us,
                data: Bytes::from(entry.data),
            });
        }
        inner.release_output(entry.index);
        last_render = Instant::now();
    }
}

impl Drop for VideoCodecDecoder {
    fn drop(&mut self) {
        self.stop();
        self.release();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::log::NoopLogSink;
    use crate::media::CodecId;
    use std::sync::mpsc;

    /// Passthrough backend: every queued NAL comes straight back out.
    struct LoopbackBackend {
        observer: Option<Arc<dyn BackendObserver>>,
        worker: Option<JoinHandle<()>>,
        queue: Arc<(Mutex<VecDeque<(u32, Vec<u8>, BufferInfo)>>, Condvar)>,
        running: Arc<AtomicBool>,
    }

    impl LoopbackBackend {
        fn new() -> Self {
            Self {
                observer: None,
                worker: None,
                queue: Arc::new((Mutex::new(VecDeque::new()), Condvar::new())),
                running: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl DecoderBackend for LoopbackBackend {
        fn set_observer(&mut self, observer: Arc<dyn BackendObserver>) {
            self.observer = Some(observer);
        }
        fn configure(&mut self, _format: BackendFormat) -> Result<(), CodecError> {
            Ok(())
        }
        fn prepare(&mut self) -> Result<(), CodecError> {
            Ok(())
        }
        fn start(&mut self) -> Result<(), CodecError> {
            let observer = self.observer.clone().ok_or(CodecError::BadState("start"))?;
            self.running.store(true, Ordering::Release);
            let running = Arc::clone(&self.running);
            let queue = Arc::clone(&self.queue);
            self.worker = Some(
                thread::Builder::new()
                    .name("loopback-decode".into())
                    .spawn(move || {
                        for i in 0..4 {
                            observer.on_input_available(i);
                        }
                        let mut out_index = 0u32;
                        while running.load(Ordering::Acquire) {
                            let item = {
                                let Ok(mut items) = queue.0.lock() else { break };
                                match items.pop_front() {
                                    Some(item) => Some(item),
                                    None => {
                                        let _ = queue
                                            .1
                                            .wait_timeout(items, Duration::from_millis(10));
                                        None
                                    }
                                }
                            };
                            if let Some((index, data, mut info)) = item {
                                info.size = data.len();
                                observer.on_output_available(out_index, info, &data);
                                out_index = out_index.wrapping_add(1);
                                observer.on_input_available(index);
                            }
                        }
                    })
                    .map_err(|e| CodecError::BackendUnavailable(e.to_string()))?,
            );
            Ok(())
        }
        fn flush(&mut self) -> Result<(), CodecError> {
            if let Ok(mut items) = self.queue.0.lock() {
                items.clear();
            }
            Ok(())
        }
        fn stop(&mut self) -> Result<(), CodecError> {
            self.running.store(false, Ordering::Release);
            self.queue.1.notify_all();
            if let Some(worker) = self.worker.take() {
                let _ = worker.join();
            }
            Ok(())
        }
        fn reset(&mut self) -> Result<(), CodecError> {
            self.flush()
        }
        fn release(&mut self) {
            let _ = self.stop();
            self.observer = None;
        }
        fn queue_input_buffer(
            &mut self,
            index: u32,
            data: &[u8],
            info: BufferInfo,
        ) -> Result<(), CodecError> {
            if let Ok(mut items) = self.queue.0.lock() {
                items.push_back((index, data.to_vec(), info));
            }
            self.queue.1.notify_all();
            Ok(())
        }
        fn release_output_buffer(&mut self, _index: u32) -> Result<(), CodecError> {
            Ok(())
        }
    }

    struct ChannelSurface {
        id: u64,
        tx: mpsc::Sender<VideoFrame>,
    }
    impl Surface for ChannelSurface {
        fn unique_id(&self) -> u64 {
            self.id
        }
        fn render(&self, frame: &VideoFrame) {
            let _ = self.tx.send(frame.clone());
        }
    }

    fn nal_frame(header: u8, pts_ticks: u64) -> Frame {
        let payload = Bytes::from(vec![0, 0, 0, 1, header, 0x11]);
        Frame {
            codec_id: CodecId::H264,
            track: crate::media::TrackKind::Video,
            key_frame: nal::h264_type(header) == nal::NAL_IDR,
            dts: pts_ticks,
            pts: pts_ticks,
            payload,
            prefix: 4,
            ssrc: None,
        }
    }

    fn running_decoder() -> (VideoCodecDecoder, mpsc::Receiver<VideoFrame>) {
        let decoder = VideoCodecDecoder::new(Box::new(LoopbackBackend::new()), Arc::new(NoopLogSink));
        let (tx, rx) = mpsc::channel();
        decoder.set_surface(Arc::new(ChannelSurface { id: 1, tx }));
        let track = VideoTrack {
            codec_id: CodecId::H264,
            width: 1920,
            height: 1080,
            frame_rate: 60,
        };
        decoder.init(&track).expect("init");
        decoder.start().expect("start");
        (decoder, rx)
    }

    #[test]
    fn frames_reach_the_surface_without_audio_clock() {
        let (decoder, rx) = running_decoder();
        decoder.on_frame(&nal_frame(0x65, 9_000));
        let frame = rx.recv_timeout(Duration::from_secs(2)).expect("frame");
        assert_eq!(frame.pts_us, 100_000);
        assert_eq!(frame.width, 1920);
        decoder.stop();
    }

    #[test]
    fn key_frame_only_mode_skips_plain_slices() {
        let (decoder, rx) = running_decoder();
        decoder.set_key_frame_only(true);

        decoder.on_frame(&nal_frame(0x41, 9_000)); // non-IDR slice, skipped
        decoder.on_frame(&nal_frame(0x67, 9_000)); // SPS, kept
        decoder.on_frame(&nal_frame(0x65, 18_000)); // IDR, kept

        let first = rx.recv_timeout(Duration::from_secs(2)).expect("frame");
        let second = rx.recv_timeout(Duration::from_secs(2)).expect("frame");
        assert_eq!(first.pts_us, 100_000);
        assert_eq!(second.pts_us, 200_000);
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        decoder.stop();
    }

    #[test]
    fn stop_keeps_the_surface_silent() {
        let (decoder, rx) = running_decoder();
        decoder.on_frame(&nal_frame(0x65, 9_000));
        rx.recv_timeout(Duration::from_secs(2)).expect("frame");

        decoder.stop();
        decoder.on_frame(&nal_frame(0x65, 90_000));
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }
}
