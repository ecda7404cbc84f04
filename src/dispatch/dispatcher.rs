//! Single-producer / multi-consumer bounded buffer between the RTP consumer
//! and the players.
//!
//! The ring is keyed by media type through per-entry tags; every attached
//! receiver owns a read cursor over a monotonically increasing write index.
//! Late joiners are anchored so that the first video datum they observe is a
//! key frame preceded by the cached SPS and PPS.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::media::{MediaData, MediaType};

use super::receiver::BufferReceiver;
use super::DEFAULT_WRITE_TIMEOUT;

pub(super) struct Entry {
    pub seq: u64,
    pub data: Arc<MediaData>,
}

pub(super) struct Cursor {
    pub next_seq: u64,
    pub pending_sps: bool,
    pub pending_pps: bool,
    pub stopped: bool,
}

pub(super) struct State {
    pub ring: VecDeque<Entry>,
    pub next_seq: u64,
    pub sps: Option<Arc<MediaData>>,
    pub pps: Option<Arc<MediaData>>,
    /// Write index of the most recent video key frame still in the ring.
    pub anchor_seq: Option<u64>,
    pub cursors: HashMap<u32, Cursor>,
    pub overflow_since: Option<Instant>,
}

pub(super) struct Shared {
    pub state: Mutex<State>,
    pub cond: Condvar,
    pub stopped: AtomicBool,
}

type WriteTimeoutHandler = Box<dyn Fn() + Send + Sync>;

pub struct BufferDispatcher {
    shared: Arc<Shared>,
    capacity: usize,
    capacity_increment: usize,
    write_timeout: Duration,
    on_write_timeout: Mutex<Option<WriteTimeoutHandler>>,
}

impl BufferDispatcher {
    pub fn new(capacity: usize, capacity_increment: usize) -> Self {
        Self::with_write_timeout(capacity, capacity_increment, DEFAULT_WRITE_TIMEOUT)
    }

    pub fn with_write_timeout(
        capacity: usize,
        capacity_increment: usize,
        write_timeout: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    ring: VecDeque::with_capacity(capacity),
                    next_seq: 0,
                    sps: None,
                    pps: None,
                    anchor_seq: None,
                    cursors: HashMap::new(),
                    overflow_since: None,
                }),
                cond: Condvar::new(),
                stopped: AtomicBool::new(false),
            }),
            capacity: capacity.max(1),
            capacity_increment,
            write_timeout,
            on_write_timeout: Mutex::new(None),
        }
    }

    /// Invoked when intake stays saturated past the write timeout.
    pub fn set_write_timeout_handler(&self, handler: WriteTimeoutHandler) {
        if let Ok(mut slot) = self.on_write_timeout.lock() {
            *slot = Some(handler);
        }
    }

    /// Register a receiver; its cursor lands just before the most recent
    /// SPS + PPS + key-frame triple, or at the tail when none exists.
    pub fn attach_receiver(&self, receiver: &Arc<BufferReceiver>) {
        let Ok(mut state) = self.shared.state.lock() else {
            return;
        };
        let next_seq = state.anchor_seq.unwrap_or(state.next_seq);
        let cursor = Cursor {
            next_seq,
            pending_sps: state.sps.is_some(),
            pending_pps: state.pps.is_some(),
            stopped: false,
        };
        state.cursors.insert(receiver.id(), cursor);
        drop(state);
        receiver.bind(Arc::clone(&self.shared));
    }

    /// Remove the receiver and release everything it uniquely held.
    pub fn detach_receiver(&self, receiver: &Arc<BufferReceiver>) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.cursors.remove(&receiver.id());
        }
        receiver.unbind();
        self.shared.cond.notify_all();
    }

    /// Append a media datum, recording key frames as late-join anchors.
    pub fn input_data(&self, data: MediaData) {
        if self.shared.stopped.load(Ordering::Acquire) {
            return;
        }
        let mut fire_write_timeout = false;
        {
            let Ok(mut state) = self.shared.state.lock() else {
                return;
            };

            while state.ring.len() >= self.capacity && Self::drop_one(&mut state) {}
            if state.ring.len() >= self.capacity + self.capacity_increment {
                // Nothing droppable left; sacrifice the oldest entry outright.
                if let Some(old) = state.ring.pop_front() {
                    if state.anchor_seq == Some(old.seq) {
                        state.anchor_seq = None;
                    }
                }
            }

            let seq = state.next_seq;
            state.next_seq += 1;
            if data.media_type == MediaType::Video && data.key_frame {
                state.anchor_seq = Some(seq);
            }
            state.ring.push_back(Entry {
                seq,
                data: Arc::new(data),
            });

            if state.ring.len() >= self.capacity {
                match state.overflow_since {
                    None => state.overflow_since = Some(Instant::now()),
                    Some(since) if since.elapsed() > self.write_timeout => {
                        fire_write_timeout = true;
                        state.overflow_since = Some(Instant::now());
                    }
                    Some(_) => {}
                }
            } else {
                state.overflow_since = None;
            }
        }
        self.shared.cond.notify_all();

        if fire_write_timeout {
            if let Ok(slot) = self.on_write_timeout.lock() {
                if let Some(handler) = slot.as_ref() {
                    handler();
                }
            }
        }
    }

    /// Replace the cached SPS only when the bytes actually changed.
    pub fn set_sps_nalu(&self, data: MediaData) {
        if let Ok(mut state) = self.shared.state.lock() {
            let same = state
                .sps
                .as_ref()
                .is_some_and(|old| old.buff == data.buff);
            if !same {
                state.sps = Some(Arc::new(data));
            }
        }
    }

    /// Replace the cached PPS only when the bytes actually changed.
    pub fn set_pps_nalu(&self, data: MediaData) {
        if let Ok(mut state) = self.shared.state.lock() {
            let same = state
                .pps
                .as_ref()
                .is_some_and(|old| old.buff == data.buff);
            if !same {
                state.pps = Some(Arc::new(data));
            }
        }
    }

    #[must_use]
    pub fn sps_nalu(&self) -> Option<Arc<MediaData>> {
        self.shared.state.lock().ok().and_then(|s| s.sps.clone())
    }

    #[must_use]
    pub fn pps_nalu(&self) -> Option<Arc<MediaData>> {
        self.shared.state.lock().ok().and_then(|s| s.pps.clone())
    }

    /// Current in-memory entry count.
    #[must_use]
    pub fn size(&self) -> usize {
        self.shared.state.lock().map(|s| s.ring.len()).unwrap_or(0)
    }

    /// Drop every buffered entry; caches and cursors survive.
    pub fn flush_buffer(&self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.ring.clear();
            state.anchor_seq = None;
            state.overflow_since = None;
            let tail = state.next_seq;
            for cursor in state.cursors.values_mut() {
                cursor.next_seq = tail;
            }
        }
        self.shared.cond.notify_all();
    }

    /// Stop dispatching: blocked and future reads observe the stop sentinel.
    pub fn stop_dispatch(&self) {
        self.shared.stopped.store(true, Ordering::Release);
        self.shared.cond.notify_all();
    }

    pub fn release_all_receivers(&self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.cursors.clear();
        }
        self.shared.cond.notify_all();
    }

    /// Oldest non-key video entry first, oldest audio entry second.
    fn drop_one(state: &mut State) -> bool {
        let victim = state
            .ring
            .iter()
            .position(|e| e.data.media_type == MediaType::Video && !e.data.key_frame)
            .or_else(|| {
                state
                    .ring
                    .iter()
                    .position(|e| e.data.media_type == MediaType::Audio)
            });
        match victim {
            Some(pos) => {
                state.ring.remove(pos);
                true
            }
            None => false,
        }
    }
}

impl Drop for BufferDispatcher {
    fn drop(&mut self) {
        self.stop_dispatch();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::dispatch::ReadStatus;
    use bytes::Bytes;
    use std::sync::mpsc;
    use std::thread;

    fn sps() -> MediaData {
        MediaData::video(Bytes::from_static(&[0, 0, 0, 1, 0x67, 1]), false, 0)
    }
    fn pps() -> MediaData {
        MediaData::video(Bytes::from_static(&[0, 0, 0, 1, 0x68, 2]), false, 0)
    }
    fn idr(pts: u64) -> MediaData {
        MediaData::video(Bytes::from_static(&[0, 0, 0, 1, 0x65, 3]), true, pts)
    }
    fn slice(pts: u64) -> MediaData {
        MediaData::video(Bytes::from_static(&[0, 0, 0, 1, 0x41, 4]), false, pts)
    }
    fn audio(pts: u64) -> MediaData {
        MediaData::audio(Bytes::from_static(&[0xFF, 0xF1]), pts)
    }

    fn read_one(receiver: &Arc<BufferReceiver>, media_type: MediaType) -> Option<Arc<MediaData>> {
        let mut got = None;
        let status = receiver.request_read(media_type, |d| got = Some(Arc::clone(d)));
        match status {
            ReadStatus::Data => got,
            ReadStatus::Stopped => None,
        }
    }

    #[test]
    fn late_joiner_sees_sps_pps_then_key_frame() {
        let dispatcher = BufferDispatcher::new(16, 4);
        dispatcher.set_sps_nalu(sps());
        dispatcher.set_pps_nalu(pps());
        dispatcher.input_data(slice(100));
        dispatcher.input_data(idr(200));
        dispatcher.input_data(slice(300));
        dispatcher.input_data(slice(400));

        let receiver = Arc::new(BufferReceiver::new());
        dispatcher.attach_receiver(&receiver);

        let seen: Vec<u64> = (0..5)
            .map(|_| read_one(&receiver, MediaType::Video).expect("datum").pts)
            .collect();
        // SPS, PPS (cached with pts 0), then IDR and trailing slices.
        assert_eq!(seen, vec![0, 0, 200, 300, 400]);
    }

    #[test]
    fn sps_cache_updates_only_on_changed_bytes() {
        let dispatcher = BufferDispatcher::new(16, 4);
        dispatcher.set_sps_nalu(sps());
        let first = dispatcher.sps_nalu().expect("cached");
        dispatcher.set_sps_nalu(sps());
        let second = dispatcher.sps_nalu().expect("cached");
        assert!(Arc::ptr_eq(&first, &second));

        dispatcher.set_sps_nalu(MediaData::video(
            Bytes::from_static(&[0, 0, 0, 1, 0x67, 9]),
            false,
            0,
        ));
        let third = dispatcher.sps_nalu().expect("cached");
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn overflow_drops_oldest_non_key_video_first() {
        let dispatcher = BufferDispatcher::new(4, 2);
        dispatcher.input_data(idr(1));
        dispatcher.input_data(audio(2));
        dispatcher.input_data(slice(3));
        dispatcher.input_data(slice(4));
        assert_eq!(dispatcher.size(), 4);

        dispatcher.input_data(slice(5));
        assert_eq!(dispatcher.size(), 4);

        // The receiver should still find the key frame, but pts 3 is gone.
        let receiver = Arc::new(BufferReceiver::new());
        dispatcher.attach_receiver(&receiver);
        let seen: Vec<u64> = (0..3)
            .map(|_| read_one(&receiver, MediaType::Video).expect("datum").pts)
            .collect();
        assert_eq!(seen, vec![1, 4, 5]);
    }

    #[test]
    fn overflow_falls_back_to_oldest_audio() {
        let dispatcher = BufferDispatcher::new(2, 2);
        dispatcher.input_data(idr(1));
        dispatcher.input_data(audio(2));
        dispatcher.input_data(audio(3));
        assert_eq!(dispatcher.size(), 2);

        let receiver = Arc::new(BufferReceiver::new());
        dispatcher.attach_receiver(&receiver);
        let got = read_one(&receiver, MediaType::Audio).expect("datum");
        assert_eq!(got.pts, 3);
    }

    #[test]
    fn size_stays_bounded_by_capacity_plus_increment() {
        let dispatcher = BufferDispatcher::new(4, 2);
        for pts in 0..64 {
            dispatcher.input_data(idr(pts)); // nothing droppable: all key frames
            assert!(dispatcher.size() <= 6);
        }
    }

    #[test]
    fn sustained_overflow_signals_write_timeout() {
        let dispatcher =
            BufferDispatcher::with_write_timeout(4, 2, Duration::from_millis(20));
        let (tx, rx) = mpsc::channel();
        dispatcher.set_write_timeout_handler(Box::new(move || {
            let _ = tx.send(());
        }));

        for pts in 0..5 {
            dispatcher.input_data(slice(pts));
        }
        thread::sleep(Duration::from_millis(30));
        dispatcher.input_data(slice(99));

        rx.recv_timeout(Duration::from_millis(100))
            .expect("write timeout fired");
    }

    #[test]
    fn notify_read_stop_wakes_blocked_reader() {
        let dispatcher = BufferDispatcher::new(8, 2);
        let receiver = Arc::new(BufferReceiver::new());
        dispatcher.attach_receiver(&receiver);

        let reader = Arc::clone(&receiver);
        let join = thread::spawn(move || reader.request_read(MediaType::Video, |_| {}));

        thread::sleep(Duration::from_millis(30));
        receiver.notify_read_stop();
        assert_eq!(join.join().expect("join"), ReadStatus::Stopped);
    }

    #[test]
    fn stop_dispatch_stops_every_reader() {
        let dispatcher = BufferDispatcher::new(8, 2);
        let receiver = Arc::new(BufferReceiver::new());
        dispatcher.attach_receiver(&receiver);
        dispatcher.stop_dispatch();
        assert_eq!(
            receiver.request_read(MediaType::Video, |_| {}),
            ReadStatus::Stopped
        );
    }

    #[test]
    fn frames_are_observed_in_input_order_per_media_type() {
        let dispatcher = BufferDispatcher::new(64, 8);
        let receiver = Arc::new(BufferReceiver::new());
        dispatcher.attach_receiver(&receiver);

        for pts in 0..10 {
            dispatcher.input_data(audio(pts));
            dispatcher.input_data(slice(100 + pts));
        }

        let audio_seen: Vec<u64> = (0..10)
            .map(|_| read_one(&receiver, MediaType::Audio).expect("datum").pts)
            .collect();
        assert_eq!(audio_seen, (0..10).collect::<Vec<_>>());
    }
}
