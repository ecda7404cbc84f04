//! H.264 decoder backend over openh264.
//!
//! The decoder instance lives on the backend worker thread; decoded pictures
//! are converted to packed RGB8 and handed to the observer with the
//! presentation timestamp of the corresponding access unit.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use openh264::decoder::Decoder as OpenH264Decoder;
use openh264::formats::YUVSource;

use super::backend::{BackendFormat, BackendObserver, BufferInfo, DecoderBackend};
use super::codec_error::CodecError;

const INPUT_BUFFER_COUNT: u32 = 8;
const OUTPUT_BUFFER_COUNT: usize = 4;
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

pub struct Openh264Backend {
    observer: Option<Arc<dyn BackendObserver>>,
    queue: Arc<WorkQueue>,
    free_outputs: Arc<Mutex<Vec<u32>>>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    format: Option<BackendFormat>,
}

impl Openh264Backend {
    pub fn new() -> Self {
        Self {
            observer: None,
            queue: Arc::new(WorkQueue {
                items: Mutex::new(VecDeque::new()),
                cond: Condvar::new(),
            }),
            free_outputs: Arc::new(Mutex::new((0..OUTPUT_BUFFER_COUNT as u32).collect())),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            format: None,
        }
    }
}

impl Default for Openh264Backend {
    fn default() -> Self {
        Self::new()
    }
}

impl DecoderBackend for Openh264Backend {
    fn set_observer(&mut self, observer: Arc<dyn BackendObserver>) {
        self.observer = Some(observer);
    }

    fn configure(&mut self, format: BackendFormat) -> Result<(), CodecError> {
        match format {
            BackendFormat::Video { .. } => {
                self.format = Some(format);
                Ok(())
            }
            BackendFormat::Audio { .. } => Err(CodecError::ConfigureFailed(
                "video backend got an audio format".into(),
            )),
        }
    }

    fn prepare(&mut self) -> Result<(), CodecError> {
        if self.format.is_none() {
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

        let worker = thread::Builder::new()
            .name("h264-decode".into())
            .spawn(move || {
                let mut decoder = OpenH264Decoder::new().ok();
                let mut announced_dims = (0usize, 0usize);

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

                    let Some(dec) = decoder.as_mut() else {
                        observer.on_error(-1);
                        observer.on_input_available(item.index);
                        continue;
                    };

                    match dec.decode(&item.data) {
                        Ok(Some(yuv)) => {
                            let (w, h) = yuv.dimensions();
                            if (w, h) != announced_dims {
                                announced_dims = (w, h);
                                observer.on_format_changed(&BackendFormat::Video {
                                    width: w as u32,
                                    height: h as u32,
                                    frame_rate: 0,
                                });
                            }

                            let mut rgb = vec![0u8; yuv.rgb8_len()];
                            yuv.write_rgb8(&mut rgb);

                            let out_index =
                                free_outputs.lock().ok().and_then(|mut free| free.pop());
                            if let Some(out_index) = out_index {
                                let info = BufferInfo {
                                    presentation_us: item.info.presentation_us,
                                    size: rgb.len(),
                                };
                                observer.on_output_available(out_index, info, &rgb);
                            }
                        }
                        Ok(None) => {
                            // Parameter sets or an incomplete AU; nothing out yet.
                        }
                        Err(_) => {
                            // Reinitialise the decoder to clear its internal state.
                            decoder = OpenH264Decoder::new().ok();
                            observer.on_error(-2);
                        }
                    }
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

impl Drop for Openh264Backend {
    fn drop(&mut self) {
        self.release();
    }
}
