//! Audio-anchored video pacing.
//!
//! The audio decoder's last-played PTS (minus renderer latency) is the master
//! clock. Video frames far behind it are dropped outright, and an audio drop
//! is armed so both pipelines converge; frames ahead of it make the render
//! thread sleep, at most one frame interval per check.

use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Video lagging the audio clock by more than this is dropped.
pub const SYNC_DROP_THRESHOLD_US: i64 = 60_000;
/// Video ahead of the audio clock by more than this waits.
pub const SYNC_WAIT_THRESHOLD_US: i64 = 40_000;

/// The master clock side of the sync pair.
pub trait AudioClock: Send + Sync {
    /// Last played PTS minus renderer latency; 0 while no clock exists yet.
    fn audio_decoder_timestamp_us(&self) -> i64;
    /// Arm one forced drop so a lagging video pipeline can catch up.
    fn drop_one_frame(&self);
}

/// Verdict for one video frame at render time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Render,
    Drop,
    Wait(Duration),
    /// No audio clock yet; pace by wall clock instead.
    NoClock,
}

pub struct VideoAudioSync {
    audio: Mutex<Option<Arc<dyn AudioClock>>>,
}

impl VideoAudioSync {
    #[must_use]
    pub fn new() -> Self {
        Self {
            audio: Mutex::new(None),
        }
    }

    pub fn set_audio_clock(&self, clock: Arc<dyn AudioClock>) {
        if let Ok(mut slot) = self.audio.lock() {
            *slot = Some(clock);
        }
    }

    /// Judge a video frame with presentation time `video_pts_us`.
    #[must_use]
    pub fn decide(&self, video_pts_us: i64, frame_interval: Duration) -> SyncAction {
        let audio = match self.audio.lock() {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        let Some(audio) = audio else {
            return SyncAction::NoClock;
        };

        let t_audio = audio.audio_decoder_timestamp_us();
        if t_audio == 0 {
            return SyncAction::NoClock;
        }

        let diff = video_pts_us - t_audio;
        if diff < -SYNC_DROP_THRESHOLD_US {
            // Ask the audio side to give one buffer back as well.
            audio.drop_one_frame();
            return SyncAction::Drop;
        }
        if diff > SYNC_WAIT_THRESHOLD_US {
            let wait = Duration::from_micros((diff - SYNC_WAIT_THRESHOLD_US) as u64);
            return SyncAction::Wait(wait.min(frame_interval));
        }
        SyncAction::Render
    }
}

impl Default for VideoAudioSync {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

    struct FixedClock {
        now_us: AtomicI64,
        drops: AtomicU32,
    }

    impl AudioClock for FixedClock {
        fn audio_decoder_timestamp_us(&self) -> i64 {
            self.now_us.load(Ordering::Relaxed)
        }
        fn drop_one_frame(&self) {
            self.drops.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn sync_at(now_us: i64) -> (VideoAudioSync, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock {
            now_us: AtomicI64::new(now_us),
            drops: AtomicU32::new(0),
        });
        let sync = VideoAudioSync::new();
        sync.set_audio_clock(Arc::clone(&clock) as Arc<dyn AudioClock>);
        (sync, clock)
    }

    const INTERVAL: Duration = Duration::from_millis(16);

    #[test]
    fn in_window_frames_render() {
        let (sync, clock) = sync_at(1_000_000);
        assert_eq!(sync.decide(1_000_000, INTERVAL), SyncAction::Render);
        assert_eq!(sync.decide(1_030_000, INTERVAL), SyncAction::Render);
        assert_eq!(sync.decide(960_000, INTERVAL), SyncAction::Render);
        assert_eq!(clock.drops.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn far_behind_frames_drop_and_arm_an_audio_drop() {
        let (sync, clock) = sync_at(1_000_000);
        assert_eq!(sync.decide(900_000, INTERVAL), SyncAction::Drop);
        assert_eq!(clock.drops.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn ahead_frames_wait_at_most_one_interval() {
        let (sync, _clock) = sync_at(1_000_000);
        match sync.decide(1_050_000, INTERVAL) {
            SyncAction::Wait(wait) => assert_eq!(wait, Duration::from_micros(10_000)),
            other => panic!("expected wait, got {other:?}"),
        }
        match sync.decide(2_000_000, INTERVAL) {
            SyncAction::Wait(wait) => assert_eq!(wait, INTERVAL),
            other => panic!("expected capped wait, got {other:?}"),
        }
    }

    #[test]
    fn missing_or_silent_clock_defers_to_wall_clock() {
        let sync = VideoAudioSync::new();
        assert_eq!(sync.decide(500_000, INTERVAL), SyncAction::NoClock);

        let (sync, _clock) = sync_at(0);
        assert_eq!(sync.decide(500_000, INTERVAL), SyncAction::NoClock);
    }
}
