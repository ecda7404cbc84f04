use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::event;
use crate::media::{MediaData, MediaType};

use super::dispatcher::Shared;

/// Outcome of a blocking read against the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// A datum was delivered to the callback.
    Data,
    /// The receiver or the dispatcher was stopped; nothing was delivered.
    Stopped,
}

const READ_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A read endpoint attached to a [`BufferDispatcher`].
///
/// [`BufferDispatcher`]: super::BufferDispatcher
pub struct BufferReceiver {
    id: u32,
    shared: Mutex<Option<Arc<Shared>>>,
}

impl BufferReceiver {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: event::next_id(),
            shared: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    pub(super) fn bind(&self, shared: Arc<Shared>) {
        if let Ok(mut slot) = self.shared.lock() {
            *slot = Some(shared);
        }
    }

    pub(super) fn unbind(&self) {
        if let Ok(mut slot) = self.shared.lock() {
            *slot = None;
        }
    }

    /// Block until a datum of `media_type` is available at this receiver's
    /// cursor, hand it to `cb` and advance. Cached parameter sets are always
    /// delivered before the first video datum after attach.
    pub fn request_read(
        &self,
        media_type: MediaType,
        cb: impl FnOnce(&Arc<MediaData>),
    ) -> ReadStatus {
        let shared = match self.shared.lock() {
            Ok(slot) => match slot.as_ref() {
                Some(shared) => Arc::clone(shared),
                None => return ReadStatus::Stopped,
            },
            Err(_) => return ReadStatus::Stopped,
        };

        let Ok(mut state) = shared.state.lock() else {
            return ReadStatus::Stopped;
        };

        loop {
            if shared.stopped.load(std::sync::atomic::Ordering::Acquire) {
                return ReadStatus::Stopped;
            }

            let sps = state.sps.clone();
            let pps = state.pps.clone();
            let Some(cursor) = state.cursors.get_mut(&self.id) else {
                return ReadStatus::Stopped;
            };
            if cursor.stopped {
                return ReadStatus::Stopped;
            }

            if media_type == MediaType::Video && cursor.pending_sps {
                cursor.pending_sps = false;
                if let Some(data) = sps {
                    drop(state);
                    cb(&data);
                    return ReadStatus::Data;
                }
            }
            let Some(cursor) = state.cursors.get_mut(&self.id) else {
                return ReadStatus::Stopped;
            };
            if media_type == MediaType::Video && cursor.pending_pps {
                cursor.pending_pps = false;
                if let Some(data) = pps {
                    drop(state);
                    cb(&data);
                    return ReadStatus::Data;
                }
            }

            let next_seq = match state.cursors.get(&self.id) {
                Some(cursor) => cursor.next_seq,
                None => return ReadStatus::Stopped,
            };
            let found = state
                .ring
                .iter()
                .find(|e| e.seq >= next_seq && e.data.media_type == media_type)
                .map(|e| (e.seq, Arc::clone(&e.data)));

            if let Some((seq, data)) = found {
                if let Some(cursor) = state.cursors.get_mut(&self.id) {
                    cursor.next_seq = seq + 1;
                }
                drop(state);
                cb(&data);
                return ReadStatus::Data;
            }

            state = match shared.cond.wait_timeout(state, READ_POLL_INTERVAL) {
                Ok((guard, _)) => guard,
                Err(_) => return ReadStatus::Stopped,
            };
        }
    }

    /// Wake a blocked read and make subsequent reads return [`ReadStatus::Stopped`].
    pub fn notify_read_stop(&self) {
        let shared = match self.shared.lock() {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        if let Some(shared) = shared {
            if let Ok(mut state) = shared.state.lock() {
                if let Some(cursor) = state.cursors.get_mut(&self.id) {
                    cursor.stopped = true;
                }
            }
            shared.cond.notify_all();
        }
    }
}

impl Default for BufferReceiver {
    fn default() -> Self {
        Self::new()
    }
}
