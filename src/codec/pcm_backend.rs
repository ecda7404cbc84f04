//! Software audio backend for the linear codecs (LPCM and G.711).
//!
//! Runs the same index-based asynchronous contract as a platform codec: a
//! worker thread drains the input work queue, expands the payload to S16LE
//! and fires the observer callbacks from its own thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::media::CodecId;

use super::backend::{BackendFormat, BackendObserver, BufferInfo, DecoderBackend};
use super::codec_error::CodecError;
use super::g711;

const INPUT_BUFFER_COUNT: u32 = 4;
const OUTPUT_BUFFER_COUNT: usize = 8;
const WORK_POLL_INTERVAL: Duration = Duration::from_millis(20);

struct WorkItem {
    index: u32,
    data: Vec<u8>,
    info: BufferInfo,
}

struct WorkQueue {
    items: Mutex<VecDeque<WorkItem>>,
    cond: Condvar,
}

pub struct PcmBackend {
    codec: CodecId,
    observer: Option<Arc<dyn BackendObserver>>,
    queue: Arc<WorkQueue>,
    free_outputs: Arc<Mutex<Vec<u32>>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    configured: bool,
}

impl PcmBackend {
    pub fn new(codec: CodecId) -> Self {
        Self {
            codec,
            observer: None,
            queue: Arc::new(WorkQueue {
                items: Mutex::new(VecDeque::new()),
                cond: Condvar::new(),
            }),
            free_outputs: Arc::new(Mutex::new((0..OUTPUT_BUFFER_COUNT as u32).collect())),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            configured: false,
        }
    }

    fn decode(codec: CodecId, data: &[u8]) -> Vec<u8> {
        match codec {
            CodecId::G711a => g711::expand(data, true),
            CodecId::G711u => g711::expand(data, false),
            // Big-endian linear PCM to host little-endian.
            CodecId::PcmS16be => {
                let mut out = Vec::with_capacity(data.len());
                for pair in data.chunks_exact(2) {
                    out.push(pair[1]);
                    out.push(pair[0]);
                }
                out
            }
            _ => data.to_vec(),
        }
    }
}

impl DecoderBackend for PcmBackend {
    fn set_observer(&mut self, observer: Arc<dyn BackendObserver>) {
        self.observer = Some(observer);
    }

    fn configure(&mut self, format: BackendFormat) -> Result<(), CodecError> {
        match format {
            BackendFormat::Audio { .. } => {
                self.configured = true;
                Ok(())
            }
            BackendFormat::Video { .. } => Err(CodecError::ConfigureFailed(
                "audio backend got a video format".into(),
            )),
        }
    }

    fn prepare(&mut self) -> Result<(), CodecError> {
        if !self.configured {
            return Err(CodecError::BadState("prepare"));
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), CodecError> {
        if self.worker.is_some() {
            return Ok(());
        }
        let observer = self
            .observer
            .clone()
            .ok_or(CodecError::BadState("start without observer"))?;

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let queue = Arc::clone(&self.queue);
        let free_outputs = Arc::clone(&self.free_outputs);
        let codec = self.codec;

        let worker = thread::Builder::new()
            .name("pcm-decode".into())
            .spawn(move || {
                for index in 0..INPUT_BUFFER_COUNT {
                    observer.on_input_available(index);
                }

                while running.load(Ordering::Acquire) {
                    let item = {
                        let Ok(mut items) = queue.items.lock() else {
                            break;
                        };
                        loop {
                            if !running.load(Ordering::Acquire) {
                                return;
                            }
                            if let Some(item) = items.pop_front() {
                                break item;
                            }
                            items = match queue.cond.wait_timeout(items, WORK_POLL_INTERVAL) {
                                Ok((guard, _)) => guard,
                                Err(_) => return,
                            };
                        }
                    };

                    let pcm = Self::decode(codec, &item.data);
                    let out_index = free_outputs.lock().ok().and_then(|mut free| free.pop());
                    if let Some(out_index) = out_index {
                        let info = BufferInfo {
                            presentation_us: item.info.presentation_us,
                            size: pcm.len(),
                        };
                        observer.on_output_available(out_index, info, &pcm);
                    }
                    // Recycle the input slot either way.
                    observer.on_input_available(item.index);
                }
            })
            .map_err(|e| CodecError::BackendUnavailable(e.to_string()))?;

        self.worker = Some(worker);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), CodecError> {
        if let Ok(mut items) = self.queue.items.lock() {
            items.clear();
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CodecError> {
        self.running.store(false, Ordering::Release);
        self.queue.cond.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<(), CodecError> {
        self.flush()?;
        if let Ok(mut free) = self.free_outputs.lock() {
            *free = (0..OUTPUT_BUFFER_COUNT as u32).collect();
        }
        Ok(())
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
        let Ok(mut items) = self.queue.items.lock() else {
            return Err(CodecError::BackendUnavailable("work queue poisoned".into()));
        };
        items.push_back(WorkItem {
            index,
            data: data.to_vec(),
            info,
        });
        drop(items);
        self.queue.cond.notify_all();
        Ok(())
    }

    fn release_output_buffer(&mut self, index: u32) -> Result<(), CodecError> {
        if let Ok(mut free) = self.free_outputs.lock() {
            if !free.contains(&index) {
                free.push(index);
            }
        }
        Ok(())
    }
}

impl Drop for PcmBackend {
    fn drop(&mut self) {
        self.release();
    }
}
