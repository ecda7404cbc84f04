//! Thin policy layer between decoded samples and the renderer: write-retry
//! discipline, interrupt handling and the PC-source pacing tweak.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::log::log_sink::LogSink;
use crate::{sink_error, sink_info, sink_warn};

use super::audio_render::{AudioRender, AudioRenderCallback, InterruptHint, RenderState};

/// Give up after this many consecutive zero-byte writes.
const MAX_AUDIO_WRITE_FAIL_NUM: u32 = 5;

pub struct AudioSink {
    player_id: u32,
    logger: Arc<dyn LogSink>,
    render: Mutex<Option<Box<dyn AudioRender>>>,
    running: AtomicBool,
    need_write: AtomicBool,
    is_pc_source: AtomicBool,
}

impl AudioSink {
    pub fn new(player_id: u32, render: Box<dyn AudioRender>, logger: Arc<dyn LogSink>) -> Self {
        Self {
            player_id,
            logger,
            render: Mutex::new(Some(render)),
            running: AtomicBool::new(false),
            need_write: AtomicBool::new(false),
            is_pc_source: AtomicBool::new(false),
        }
    }

    pub fn set_is_pc_source(&self, is_pc_source: bool) {
        sink_info!(
            self.logger,
            "[AudioSink] playerId: {} pc source: {is_pc_source}",
            self.player_id
        );
        self.is_pc_source.store(is_pc_source, Ordering::Relaxed);
    }

    pub fn prepare(&self, channels: u32, sample_rate: u32) -> Result<(), String> {
        let mut render = self.render.lock().map_err(|_| "render poisoned".to_string())?;
        let render = render.as_mut().ok_or_else(|| "renderer released".to_string())?;
        render.prepare(channels, sample_rate)
    }

    pub fn start(&self) -> Result<(), String> {
        let mut render = self.render.lock().map_err(|_| "render poisoned".to_string())?;
        let render = render.as_mut().ok_or_else(|| "renderer released".to_string())?;
        render.start()?;
        self.running.store(true, Ordering::Release);
        self.need_write.store(true, Ordering::Release);
        Ok(())
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.need_write.store(false, Ordering::Release);
        if let Ok(mut render) = self.render.lock() {
            if let Some(render) = render.as_mut() {
                let _ = render.stop();
            }
        }
    }

    pub fn pause(&self) {
        self.need_write.store(false, Ordering::Release);
        if let Ok(mut render) = self.render.lock() {
            if let Some(render) = render.as_mut() {
                let _ = render.pause();
            }
        }
    }

    pub fn flush(&self) {
        if let Ok(mut render) = self.render.lock() {
            if let Some(render) = render.as_mut() {
                let _ = render.flush();
            }
        }
    }

    pub fn release(&self) {
        self.stop();
        if let Ok(mut render) = self.render.lock() {
            if let Some(render) = render.as_mut() {
                render.release();
            }
            *render = None;
        }
    }

    pub fn set_volume(&self, volume: f32) {
        if let Ok(mut render) = self.render.lock() {
            if let Some(render) = render.as_mut() {
                if let Err(e) = render.set_volume(volume) {
                    sink_warn!(self.logger, "[AudioSink] set volume failed: {e}");
                }
            }
        }
    }

    #[must_use]
    pub fn latency_us(&self) -> i64 {
        self.render
            .lock()
            .ok()
            .and_then(|render| render.as_ref().map(|r| r.latency_us()))
            .unwrap_or(0)
    }

    /// Push decoded samples through the renderer, tolerating short writes.
    pub fn write(&self, buf: &[u8]) {
        if !self.running.load(Ordering::Acquire) || !self.need_write.load(Ordering::Acquire) {
            return;
        }
        let Ok(mut render) = self.render.lock() else {
            return;
        };
        let Some(render) = render.as_mut() else {
            return;
        };

        // A PC source sends larger bursts; halve the write granularity to
        // keep the renderer queue shallow.
        let chunk = if self.is_pc_source.load(Ordering::Relaxed) {
            (buf.len() / 2).max(2)
        } else {
            buf.len()
        };

        let mut written = 0usize;
        let mut fail_num = 0u32;
        while written < buf.len()
            && self.running.load(Ordering::Acquire)
            && self.need_write.load(Ordering::Acquire)
        {
            let end = (written + chunk).min(buf.len());
            match render.write(&buf[written..end]) {
                Ok(0) | Err(_) => {
                    fail_num += 1;
                    if fail_num >= MAX_AUDIO_WRITE_FAIL_NUM {
                        sink_error!(
                            self.logger,
                            "[AudioSink] renderer write failed too many times, playerId: {}",
                            self.player_id
                        );
                        break;
                    }
                }
                Ok(n) => {
                    written += n;
                    fail_num = 0;
                }
            }
        }
    }
}

impl AudioRenderCallback for AudioSink {
    fn on_interrupt(&self, hint: InterruptHint) {
        sink_info!(self.logger, "[AudioSink] interrupt hint: {hint:?}");
        match hint {
            InterruptHint::Pause => self.need_write.store(false, Ordering::Release),
            InterruptHint::Resume => {
                if let Err(e) = self.start() {
                    sink_error!(self.logger, "[AudioSink] resume failed: {e}");
                }
            }
        }
    }

    fn on_state_change(&self, state: RenderState) {
        sink_info!(self.logger, "[AudioSink] renderer state: {state:?}");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::log::NoopLogSink;
    use std::sync::Mutex as StdMutex;

    /// Renderer double that consumes at most `accept` bytes per write.
    struct ScriptedRender {
        accept: usize,
        writes: Arc<StdMutex<Vec<usize>>>,
        fail_forever: bool,
    }

    impl AudioRender for ScriptedRender {
        fn prepare(&mut self, _c: u32, _r: u32) -> Result<(), String> {
            Ok(())
        }
        fn start(&mut self) -> Result<(), String> {
            Ok(())
        }
        fn stop(&mut self) -> Result<(), String> {
            Ok(())
        }
        fn pause(&mut self) -> Result<(), String> {
            Ok(())
        }
        fn drain(&mut self) -> Result<(), String> {
            Ok(())
        }
        fn flush(&mut self) -> Result<(), String> {
            Ok(())
        }
        fn release(&mut self) {}
        fn set_volume(&mut self, _v: f32) -> Result<(), String> {
            Ok(())
        }
        fn set_parameters(&mut self, _b: u32, _c: u32, _r: u32) -> Result<(), String> {
            Ok(())
        }
        fn write(&mut self, buf: &[u8]) -> Result<usize, String> {
            if self.fail_forever {
                return Ok(0);
            }
            let n = buf.len().min(self.accept);
            self.writes.lock().unwrap().push(n);
            Ok(n)
        }
        fn set_callback(&mut self, _cb: Arc<dyn AudioRenderCallback>) {}
        fn latency_us(&self) -> i64 {
            0
        }
    }

    #[test]
    fn short_writes_are_retried_to_completion() {
        let writes = Arc::new(StdMutex::new(Vec::new()));
        let sink = AudioSink::new(
            1,
            Box::new(ScriptedRender {
                accept: 4,
                writes: Arc::clone(&writes),
                fail_forever: false,
            }),
            Arc::new(NoopLogSink),
        );
        sink.start().expect("start");
        sink.write(&[0u8; 10]);

        let total: usize = writes.lock().unwrap().iter().sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn persistent_failure_gives_up() {
        let writes = Arc::new(StdMutex::new(Vec::new()));
        let sink = AudioSink::new(
            1,
            Box::new(ScriptedRender {
                accept: 0,
                writes,
                fail_forever: true,
            }),
            Arc::new(NoopLogSink),
        );
        sink.start().expect("start");
        // Must terminate despite zero progress.
        sink.write(&[0u8; 16]);
    }

    #[test]
    fn writes_before_start_are_discarded() {
        let writes = Arc::new(StdMutex::new(Vec::new()));
        let sink = AudioSink::new(
            1,
            Box::new(ScriptedRender {
                accept: 64,
                writes: Arc::clone(&writes),
                fail_forever: false,
            }),
            Arc::new(NoopLogSink),
        );
        sink.write(&[0u8; 8]);
        assert!(writes.lock().unwrap().is_empty());
    }

    #[test]
    fn pause_interrupt_blocks_writes_until_resume() {
        let writes = Arc::new(StdMutex::new(Vec::new()));
        let sink = AudioSink::new(
            1,
            Box::new(ScriptedRender {
                accept: 64,
                writes: Arc::clone(&writes),
                fail_forever: false,
            }),
            Arc::new(NoopLogSink),
        );
        sink.start().expect("start");

        sink.on_interrupt(InterruptHint::Pause);
        sink.write(&[0u8; 8]);
        assert!(writes.lock().unwrap().is_empty());

        sink.on_interrupt(InterruptHint::Resume);
        sink.write(&[0u8; 8]);
        assert_eq!(writes.lock().unwrap().iter().sum::<usize>(), 8);
    }
}
