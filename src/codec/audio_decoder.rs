//! Audio decode runner: input-buffer pump on the caller side, a render
//! thread on the output side, forced-drop accounting for A/V sync and an
//! audio-latency-compensated decoder clock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::log::log_sink::LogSink;
use crate::media::{ticks_to_us, AudioTrack, Frame};
use crate::{sink_debug, sink_error, sink_warn};

use super::backend::{BackendFormat, BackendObserver, BufferInfo, DecoderBackend};
use super::codec_error::CodecError;
use super::{DecoderState, AUDIO_DECODE_DROP_INTERVAL_US, AUDIO_DECODE_WAIT, MAX_RENDER_BUFFER};

const RENDER_POLL_INTERVAL: Duration = Duration::from_millis(10);
const AUDIO_DEFAULT_SAMPLE_RATE: u32 = 48_000;
const AUDIO_DEFAULT_CHANNELS: u32 = 2;

/// Destination for decoded S16LE samples.
pub trait AudioSampleSink: Send + Sync {
    fn on_pcm(&self, data: &[u8], pts_us: i64);
}

struct RenderEntry {
    index: u32,
    pts_us: i64,
    data: Vec<u8>,
    need_drop: bool,
}

struct RenderState {
    queue: VecDeque<RenderEntry>,
    ready: bool,
}

struct ForceDrop {
    flag: bool,
    last_drop_us: i64,
}

pub(crate) struct AudioInner {
    logger: Arc<dyn LogSink>,
    backend: Mutex<Option<Box<dyn DecoderBackend>>>,
    input_indices: Mutex<VecDeque<u32>>,
    input_cond: Condvar,
    render: Mutex<RenderState>,
    render_cond: Condvar,
    sink: Mutex<Option<Arc<dyn AudioSampleSink>>>,
    state: Mutex<DecoderState>,
    first_ts_us: AtomicI64,
    last_play_pts_us: AtomicI64,
    audio_latency_us: AtomicI64,
    force_drop: Mutex<ForceDrop>,
    on_fatal: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl AudioInner {
    fn release_output(&self, index: u32) {
        // Stop may race the render thread here; re-check the handle.
        if let Ok(mut backend) = self.backend.lock() {
            if let Some(backend) = backend.as_mut() {
                let _ = backend.release_output_buffer(index);
            }
        }
    }

    fn is_need_drop(&self, now_us: i64) -> bool {
        let Ok(mut force) = self.force_drop.lock() else {
            return false;
        };
        if force.flag && now_us - force.last_drop_us > AUDIO_DECODE_DROP_INTERVAL_US {
            force.flag = false;
            force.last_drop_us = now_us;
            return true;
        }
        false
    }

    fn clear_render_queue(&self, render: &mut RenderState) {
        while let Some(entry) = render.queue.pop_front() {
            self.release_output(entry.index);
        }
    }
}

impl BackendObserver for AudioInner {
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
                "[AudioDecoder] bad output info: size {} of {}",
                info.size,
                data.len()
            );
            self.release_output(index);
            return;
        }

        if self.first_ts_us.load(Ordering::Relaxed) == 0 {
            self.first_ts_us.store(info.presentation_us, Ordering::Relaxed);
        }
        let need_drop = self.is_need_drop(now_us());

        let Ok(mut render) = self.render.lock() else {
            self.release_output(index);
            return;
        };
        if !render.ready {
            self.release_output(index);
            return;
        }
        if render.queue.len() > MAX_RENDER_BUFFER {
            sink_warn!(self.logger, "[AudioDecoder] render queue overrun, dropping all");
            self.clear_render_queue(&mut render);
        }
        render.queue.push_back(RenderEntry {
            index,
            pts_us: info.presentation_us,
            data: data[..info.size].to_vec(),
            need_drop,
        });
        drop(render);
        self.render_cond.notify_all();
    }

    fn on_format_changed(&self, format: &BackendFormat) {
        sink_debug!(self.logger, "[AudioDecoder] format changed: {format:?}");
    }

    fn on_error(&self, code: i32) {
        sink_error!(self.logger, "[AudioDecoder] backend error {code}");
        if let Ok(handler) = self.on_fatal.lock() {
            if let Some(handler) = handler.as_ref() {
                handler();
            }
        }
    }
}

/// Decode runner around an asynchronous audio [`DecoderBackend`].
pub struct AudioCodecDecoder {
    inner: Arc<AudioInner>,
    render_thread: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for AudioCodecDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCodecDecoder").finish()
    }
}

impl AudioCodecDecoder {
    pub fn new(backend: Box<dyn DecoderBackend>, logger: Arc<dyn LogSink>) -> Self {
        Self {
            inner: Arc::new(AudioInner {
                logger,
                backend: Mutex::new(Some(backend)),
                input_indices: Mutex::new(VecDeque::new()),
                input_cond: Condvar::new(),
                render: Mutex::new(RenderState {
                    queue: VecDeque::new(),
                    ready: false,
                }),
                render_cond: Condvar::new(),
                sink: Mutex::new(None),
                state: Mutex::new(DecoderState::Created),
                first_ts_us: AtomicI64::new(0),
                last_play_pts_us: AtomicI64::new(0),
                audio_latency_us: AtomicI64::new(0),
                force_drop: Mutex::new(ForceDrop {
                    flag: false,
                    last_drop_us: 0,
                }),
                on_fatal: Mutex::new(None),
            }),
            render_thread: Mutex::new(None),
        }
    }

    pub fn set_sample_sink(&self, sink: Arc<dyn AudioSampleSink>) {
        if let Ok(mut slot) = self.inner.sink.lock() {
            *slot = Some(sink);
        }
    }

    pub fn set_fatal_handler(&self, handler: Box<dyn Fn() + Send + Sync>) {
        if let Ok(mut slot) = self.inner.on_fatal.lock() {
            *slot = Some(handler);
        }
    }

    pub fn init(&self, track: &AudioTrack) -> Result<(), CodecError> {
        let observer: Arc<dyn BackendObserver> = Arc::clone(&self.inner) as _;
        let Ok(mut backend) = self.inner.backend.lock() else {
            return Err(CodecError::BadState("init"));
        };
        let Some(backend) = backend.as_mut() else {
            return Err(CodecError::BadState("init after release"));
        };

        backend.set_observer(observer);
        let sample_rate = if track.sample_rate == 0 {
            AUDIO_DEFAULT_SAMPLE_RATE
        } else {
            track.sample_rate
        };
        let channels = if track.channels == 0 {
            AUDIO_DEFAULT_CHANNELS
        } else {
            track.channels
        };
        backend.configure(BackendFormat::Audio {
            sample_rate,
            channels,
        })?;
        backend.prepare()?;

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
                sink_warn!(self.inner.logger, "[AudioDecoder] already running");
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

        // Flush precedes Stop; Stop precedes Reset. A flush failure is fatal
        // and short-circuits to Release. The backend leaves the slot while
        // being stopped: its worker callbacks lock the same slot, and joining
        // the worker under that lock would deadlock.
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
            sink_error!(self.inner.logger, "[AudioDecoder] flush failed, releasing");
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

    /// Queue one encoded frame, waiting briefly for a free input buffer.
    pub fn on_frame(&self, frame: &Frame) {
        {
            let Ok(state) = self.inner.state.lock() else { return };
            if *state != DecoderState::Running {
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
                    .wait_timeout(indices, AUDIO_DECODE_WAIT)
                {
                    Ok((guard, _)) => guard,
                    Err(_) => return,
                };
            }
            match indices.pop_front() {
                Some(index) => index,
                None => {
                    sink_warn!(self.inner.logger, "[AudioDecoder] input wait timed out");
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
                    sink_error!(self.inner.logger, "[AudioDecoder] queue input: {e}");
                }
            }
        }
    }

    /// Last played PTS minus the renderer latency, in microseconds.
    /// Returns 0 while no output has been observed yet.
    #[must_use]
    pub fn decoder_timestamp_us(&self) -> i64 {
        if self.inner.first_ts_us.load(Ordering::Relaxed) == 0 {
            return 0;
        }
        self.inner.last_play_pts_us.load(Ordering::Relaxed)
            - self.inner.audio_latency_us.load(Ordering::Relaxed)
    }

    pub fn set_audio_latency_us(&self, latency_us: i64) {
        self.inner.audio_latency_us.store(latency_us, Ordering::Relaxed);
    }

    /// Arm a single forced drop; consumed by the next output buffer outside
    /// the drop interval.
    pub fn drop_one_frame(&self) {
        if let Ok(mut force) = self.inner.force_drop.lock() {
            force.flag = true;
        }
    }

    fn start_render(&self) {
        if let Ok(mut render) = self.inner.render.lock() {
            render.ready = true;
        }
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("audio-render".into())
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

fn render_loop(inner: &Arc<AudioInner>) {
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

        if entry.need_drop {
            sink_warn!(inner.logger, "[AudioDecoder] forced drop at {}us", entry.pts_us);
        } else {
            let sink = inner.sink.lock().ok().and_then(|s| s.clone());
            if let Some(sink) = sink {
                sink.on_pcm(&entry.data, entry.pts_us);
            }
        }
        inner.release_output(entry.index);
        inner
            .last_play_pts_us
            .store(entry.pts_us, Ordering::Relaxed);
    }
}

fn now_us() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

impl Drop for AudioCodecDecoder {
    fn drop(&mut self) {
        self.stop();
        self.release();
    }
}
