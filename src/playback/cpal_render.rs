//! `AudioRender` implementation over CPAL.
//!
//! The CPAL stream is not `Send`, so it lives on a dedicated playback thread;
//! `write` only touches the shared sample ring.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::log::log_sink::LogSink;
use crate::{sink_error, sink_info};

use super::audio_render::{AudioRender, AudioRenderCallback, RenderResult, RenderState};

/// Cap the ring at one second of queued audio.
fn ring_cap(channels: u32, sample_rate: u32) -> usize {
    (channels * sample_rate) as usize
}

struct Ring {
    samples: VecDeque<i16>,
    cap: usize,
}

pub struct CpalAudioRender {
    logger: Arc<dyn LogSink>,
    channels: u32,
    sample_rate: u32,
    ring: Arc<Mutex<Ring>>,
    volume: Arc<Mutex<f32>>,
    playing: Arc<AtomicBool>,
    thread_stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    callback: Option<Arc<dyn AudioRenderCallback>>,
}

impl CpalAudioRender {
    pub fn new(logger: Arc<dyn LogSink>) -> Self {
        Self {
            logger,
            channels: 2,
            sample_rate: 48_000,
            ring: Arc::new(Mutex::new(Ring {
                samples: VecDeque::new(),
                cap: ring_cap(2, 48_000),
            })),
            volume: Arc::new(Mutex::new(1.0)),
            playing: Arc::new(AtomicBool::new(false)),
            thread_stop: Arc::new(AtomicBool::new(false)),
            thread: None,
            callback: None,
        }
    }

    fn queued_samples(&self) -> usize {
        self.ring.lock().map(|r| r.samples.len()).unwrap_or(0)
    }
}

impl AudioRender for CpalAudioRender {
    fn prepare(&mut self, channels: u32, sample_rate: u32) -> RenderResult<()> {
        self.set_parameters(16, channels, sample_rate)
    }

    fn start(&mut self) -> RenderResult<()> {
        self.playing.store(true, Ordering::Release);
        if self.thread.is_some() {
            return Ok(());
        }

        self.thread_stop.store(false, Ordering::Release);
        let stop = Arc::clone(&self.thread_stop);
        let playing = Arc::clone(&self.playing);
        let ring = Arc::clone(&self.ring);
        let volume = Arc::clone(&self.volume);
        let logger = Arc::clone(&self.logger);
        let channels = self.channels;
        let sample_rate = self.sample_rate;

        let thread = thread::Builder::new()
            .name("cpal-render".into())
            .spawn(move || {
                let host = cpal::default_host();
                let Some(device) = host.default_output_device() else {
                    sink_error!(logger, "[CpalAudioRender] no output device");
                    return;
                };

                let cfg = cpal::StreamConfig {
                    channels: channels as u16,
                    sample_rate: cpal::SampleRate(sample_rate),
                    buffer_size: cpal::BufferSize::Default,
                };

                let cb_ring = Arc::clone(&ring);
                let cb_volume = Arc::clone(&volume);
                let cb_playing = Arc::clone(&playing);
                let err_logger = Arc::clone(&logger);

                let stream = device.build_output_stream(
                    &cfg,
                    move |output: &mut [f32], _| {
                        let gain = cb_volume.lock().map(|v| *v).unwrap_or(1.0);
                        let mut ring = match cb_ring.lock() {
                            Ok(ring) => ring,
                            Err(_) => return,
                        };
                        for slot in output.iter_mut() {
                            *slot = if cb_playing.load(Ordering::Relaxed) {
                                match ring.samples.pop_front() {
                                    Some(sample) => {
                                        gain * f32::from(sample) / f32::from(i16::MAX)
                                    }
                                    None => 0.0,
                                }
                            } else {
                                0.0
                            };
                        }
                    },
                    move |err| {
                        sink_error!(err_logger, "[CpalAudioRender] stream error: {err}");
                    },
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        sink_error!(logger, "[CpalAudioRender] build stream failed: {e}");
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    sink_error!(logger, "[CpalAudioRender] play failed: {e}");
                    return;
                }
                sink_info!(logger, "[CpalAudioRender] playing {channels}ch @ {sample_rate}Hz");

                // The stream must stay alive on this thread.
                while !stop.load(Ordering::Acquire) {
                    thread::sleep(Duration::from_millis(50));
                }
                drop(stream);
            })
            .map_err(|e| format!("spawn cpal-render: {e}"))?;

        self.thread = Some(thread);
        if let Some(callback) = &self.callback {
            callback.on_state_change(RenderState::Running);
        }
        Ok(())
    }

    fn stop(&mut self) -> RenderResult<()> {
        self.playing.store(false, Ordering::Release);
        self.thread_stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        if let Some(callback) = &self.callback {
            callback.on_state_change(RenderState::Stopped);
        }
        Ok(())
    }

    fn pause(&mut self) -> RenderResult<()> {
        self.playing.store(false, Ordering::Release);
        Ok(())
    }

    fn drain(&mut self) -> RenderResult<()> {
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while self.queued_samples() > 0 {
            if std::time::Instant::now() > deadline {
                return Err("drain timed out".into());
            }
            thread::sleep(Duration::from_millis(10));
        }
        Ok(())
    }

    fn flush(&mut self) -> RenderResult<()> {
        if let Ok(mut ring) = self.ring.lock() {
            ring.samples.clear();
        }
        Ok(())
    }

    fn release(&mut self) {
        let _ = self.stop();
        let _ = self.flush();
    }

    fn set_volume(&mut self, volume: f32) -> RenderResult<()> {
        let mut gain = self.volume.lock().map_err(|_| "volume poisoned".to_string())?;
        *gain = volume.clamp(0.0, 1.0);
        Ok(())
    }

    fn set_parameters(&mut self, _bits: u32, channels: u32, sample_rate: u32) -> RenderResult<()> {
        if channels == 0 || sample_rate == 0 {
            return Err(format!("bad parameters: {channels}ch @ {sample_rate}Hz"));
        }
        self.channels = channels;
        self.sample_rate = sample_rate;
        if let Ok(mut ring) = self.ring.lock() {
            ring.cap = ring_cap(channels, sample_rate);
        }
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> RenderResult<usize> {
        let mut ring = self.ring.lock().map_err(|_| "ring poisoned".to_string())?;
        let mut written = 0usize;
        for pair in buf.chunks_exact(2) {
            if ring.samples.len() >= ring.cap {
                break;
            }
            ring.samples.push_back(i16::from_le_bytes([pair[0], pair[1]]));
            written += 2;
        }
        Ok(written)
    }

    fn set_callback(&mut self, callback: Arc<dyn AudioRenderCallback>) {
        self.callback = Some(callback);
    }

    fn latency_us(&self) -> i64 {
        let queued = self.queued_samples() as i64;
        let per_second = i64::from(self.channels) * i64::from(self.sample_rate);
        if per_second == 0 {
            return 0;
        }
        queued * 1_000_000 / per_second
    }
}

impl Drop for CpalAudioRender {
    fn drop(&mut self) {
        self.release();
    }
}
