//! Producer endpoint: drains the dispatcher on its own threads and hands the
//! buffered data to an attached consumer callback (local monitoring taps,
//! loopback tests). Outbound packetisation is out of scope for a sink.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::dispatch::{BufferDispatcher, BufferReceiver, ReadStatus};
use crate::event;
use crate::log::log_sink::LogSink;
use crate::media::{MediaData, MediaType};
use crate::sink_debug;

pub type OnMediaData = Box<dyn Fn(&Arc<MediaData>) + Send + Sync>;

/// Each media type gets its own receiver so the two drain threads keep
/// independent read cursors.
pub struct RtpProducer {
    id: u32,
    logger: Arc<dyn LogSink>,
    audio_receiver: Arc<BufferReceiver>,
    video_receiver: Arc<BufferReceiver>,
    on_data: Arc<Mutex<Option<OnMediaData>>>,
    paused: Arc<Mutex<Option<MediaType>>>,
    running: Arc<AtomicBool>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl RtpProducer {
    pub fn new(logger: Arc<dyn LogSink>) -> Self {
        Self {
            id: event::next_id(),
            logger,
            audio_receiver: Arc::new(BufferReceiver::new()),
            video_receiver: Arc::new(BufferReceiver::new()),
            on_data: Arc::new(Mutex::new(None)),
            paused: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            threads: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn set_on_data(&self, cb: OnMediaData) {
        if let Ok(mut slot) = self.on_data.lock() {
            *slot = Some(cb);
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn pause(&self, media_type: MediaType) {
        if let Ok(mut paused) = self.paused.lock() {
            *paused = Some(media_type);
        }
    }

    pub fn resume(&self) {
        if let Ok(mut paused) = self.paused.lock() {
            *paused = None;
        }
    }

    /// Attach both receivers to `dispatcher` and start draining.
    pub fn attach_and_start(&self, dispatcher: &BufferDispatcher) {
        dispatcher.attach_receiver(&self.audio_receiver);
        dispatcher.attach_receiver(&self.video_receiver);
        self.start_dispatch();
    }

    pub fn detach(&self, dispatcher: &BufferDispatcher) {
        dispatcher.detach_receiver(&self.audio_receiver);
        dispatcher.detach_receiver(&self.video_receiver);
    }

    /// Spawn one dispatch thread per media type.
    pub fn start_dispatch(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut threads = Vec::new();
        for media_type in [MediaType::Audio, MediaType::Video] {
            let running = Arc::clone(&self.running);
            let receiver = match media_type {
                MediaType::Audio => Arc::clone(&self.audio_receiver),
                _ => Arc::clone(&self.video_receiver),
            };
            let on_data = Arc::clone(&self.on_data);
            let paused = Arc::clone(&self.paused);
            let logger = Arc::clone(&self.logger);
            let name = match media_type {
                MediaType::Audio => "producer-audio",
                _ => "producer-video",
            };

            if let Ok(handle) = thread::Builder::new().name(name.into()).spawn(move || {
                while running.load(Ordering::Acquire) {
                    let status = receiver.request_read(media_type, |data| {
                        let is_paused = paused
                            .lock()
                            .ok()
                            .and_then(|p| *p)
                            .is_some_and(|p| p.covers(media_type));
                        if is_paused {
                            return;
                        }
                        if let Ok(slot) = on_data.lock() {
                            if let Some(cb) = slot.as_ref() {
                                cb(data);
                            }
                        }
                    });
                    if status == ReadStatus::Stopped {
                        if !running.load(Ordering::Acquire) {
                            break;
                        }
                        thread::sleep(Duration::from_millis(5));
                    }
                }
                sink_debug!(logger, "[RtpProducer] {name} dispatch exit");
            }) {
                threads.push(handle);
            }
        }
        if let Ok(mut slot) = self.threads.lock() {
            *slot = threads;
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.audio_receiver.notify_read_stop();
        self.video_receiver.notify_read_stop();
        let threads = self
            .threads
            .lock()
            .map(|mut t| std::mem::take(&mut *t))
            .unwrap_or_default();
        for handle in threads {
            let _ = handle.join();
        }
    }
}

impl Drop for RtpProducer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::log::NoopLogSink;
    use bytes::Bytes;
    use std::sync::mpsc;

    #[test]
    fn producer_drains_both_media_types() {
        let dispatcher = BufferDispatcher::new(16, 4);
        let producer = RtpProducer::new(Arc::new(NoopLogSink));
        let (tx, rx) = mpsc::channel();
        producer.set_on_data(Box::new(move |data| {
            let _ = tx.send((data.media_type, data.pts));
        }));

        producer.attach_and_start(&dispatcher);
        dispatcher.input_data(MediaData::audio(Bytes::from_static(&[1, 2]), 42));
        dispatcher.input_data(MediaData::video(
            Bytes::from_static(&[0, 0, 0, 1, 0x65]),
            true,
            43,
        ));

        let mut seen = vec![
            rx.recv_timeout(Duration::from_secs(2)).expect("datum"),
            rx.recv_timeout(Duration::from_secs(2)).expect("datum"),
        ];
        seen.sort_by_key(|(_, pts)| *pts);
        assert_eq!(
            seen,
            vec![(MediaType::Audio, 42), (MediaType::Video, 43)]
        );

        producer.stop();
        producer.detach(&dispatcher);
    }
}
