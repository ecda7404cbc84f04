//! The RTP consumer: binds the UDP receiver and the TS depacketiser, routes
//! parameter sets into the dispatcher caches and feeds every other NAL or
//! audio access unit into the dispatcher ring.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::dispatch::BufferDispatcher;
use crate::event::{self, ConsumerInit};
use crate::ingest::{RtpTsDepacketizer, UdpServer};
use crate::log::log_sink::LogSink;
use crate::media::{AudioTrack, Frame, MediaData, MediaType, TrackKind, VideoTrack};
use crate::nal;
use crate::{sink_debug, sink_error, sink_info};

struct GopStats {
    first_key_pending: bool,
    started: Instant,
    gop_started: Instant,
    frames: u32,
}

struct FrameRouter {
    dispatcher: Arc<BufferDispatcher>,
    paused: Mutex<Option<MediaType>>,
    stats: Mutex<GopStats>,
    logger: Arc<dyn LogSink>,
}

impl FrameRouter {
    fn paused_for(&self, media_type: MediaType) -> bool {
        self.paused
            .lock()
            .ok()
            .and_then(|p| *p)
            .is_some_and(|p| p.covers(media_type))
    }

    fn on_key_frame(&self) {
        let Ok(mut stats) = self.stats.lock() else {
            return;
        };
        if stats.first_key_pending {
            stats.first_key_pending = false;
            sink_debug!(
                self.logger,
                "[WfdRtpConsumer] first key frame after {} ms",
                stats.started.elapsed().as_millis()
            );
        } else if stats.frames > 0 {
            let interval = stats.gop_started.elapsed().as_millis();
            sink_debug!(
                self.logger,
                "[WfdRtpConsumer] gop: {} frames, avg arrival {} ms",
                stats.frames,
                interval / u128::from(stats.frames)
            );
        }
        stats.frames = 1;
        stats.gop_started = Instant::now();
    }

    fn route(&self, frame: Frame) {
        match frame.track {
            TrackKind::Audio => {
                if self.paused_for(MediaType::Audio) {
                    return;
                }
                let mut data = MediaData::audio(frame.payload, frame.pts);
                data.ssrc = frame.ssrc;
                self.dispatcher.input_data(data);
            }
            TrackKind::Video => {
                if self.paused_for(MediaType::Video) {
                    return;
                }
                match frame.nal_type() {
                    Some(nal::NAL_SEI) => {} // discard SEI payloads
                    Some(nal::NAL_SPS) => {
                        self.dispatcher
                            .set_sps_nalu(MediaData::video(frame.payload, false, frame.pts));
                    }
                    Some(nal::NAL_PPS) => {
                        self.dispatcher
                            .set_pps_nalu(MediaData::video(frame.payload, false, frame.pts));
                    }
                    _ => {
                        if frame.key_frame {
                            self.on_key_frame();
                        } else if let Ok(mut stats) = self.stats.lock() {
                            stats.frames += 1;
                        }
                        let mut data =
                            MediaData::video(frame.payload, frame.key_frame, frame.pts);
                        data.ssrc = frame.ssrc;
                        self.dispatcher.input_data(data);
                    }
                }
            }
        }
    }
}

pub struct WfdRtpConsumer {
    id: u32,
    logger: Arc<dyn LogSink>,
    router: Arc<FrameRouter>,
    depacketizer: Arc<Mutex<Option<RtpTsDepacketizer>>>,
    udp: Mutex<Option<UdpServer>>,
    init_params: Mutex<ConsumerInit>,
    is_init: AtomicBool,
    is_running: AtomicBool,
}

impl WfdRtpConsumer {
    pub fn new(dispatcher: Arc<BufferDispatcher>, logger: Arc<dyn LogSink>) -> Self {
        let now = Instant::now();
        Self {
            id: event::next_id(),
            logger: Arc::clone(&logger),
            router: Arc::new(FrameRouter {
                dispatcher,
                paused: Mutex::new(None),
                stats: Mutex::new(GopStats {
                    first_key_pending: true,
                    started: now,
                    gop_started: now,
                    frames: 0,
                }),
                logger,
            }),
            depacketizer: Arc::new(Mutex::new(None)),
            udp: Mutex::new(None),
            init_params: Mutex::new(ConsumerInit::default()),
            is_init: AtomicBool::new(false),
            is_running: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Apply the negotiated parameters delivered by the session.
    pub fn apply_init_info(&self, init: ConsumerInit) {
        if let Ok(mut params) = self.init_params.lock() {
            *params = init;
        }
        self.is_init.store(true, Ordering::Release);
    }

    /// Build the depacketiser and hook it to the frame router.
    pub fn init(&self) -> bool {
        let depacketizer = RtpTsDepacketizer::new(Arc::clone(&self.logger));
        let router = Arc::clone(&self.router);
        depacketizer.set_on_frame(Box::new(move |_ssrc, frame| {
            router.route(frame);
        }));
        if let Ok(mut slot) = self.depacketizer.lock() {
            *slot = Some(depacketizer);
        }
        true
    }

    /// Bind the advertised RTP port and begin ingesting.
    pub fn start(&self) -> bool {
        if !self.is_init.load(Ordering::Acquire) {
            sink_error!(self.logger, "[WfdRtpConsumer] start before init");
            return false;
        }
        let (ip, port) = match self.init_params.lock() {
            Ok(params) => (params.local_ip.clone(), params.local_rtp_port),
            Err(_) => return false,
        };

        let depacketizer = Arc::clone(&self.depacketizer);
        let server = UdpServer::start(
            &ip,
            port,
            Arc::clone(&self.logger),
            Box::new(move |datagram| {
                if let Ok(mut slot) = depacketizer.lock() {
                    if let Some(depacketizer) = slot.as_mut() {
                        depacketizer.input_rtp(datagram);
                    }
                }
            }),
        );
        match server {
            Ok(server) => {
                sink_info!(
                    self.logger,
                    "[WfdRtpConsumer] receiving on port {}",
                    server.local_port()
                );
                if let Ok(mut slot) = self.udp.lock() {
                    *slot = Some(server);
                }
                self.is_running.store(true, Ordering::Release);
                true
            }
            Err(e) => {
                sink_error!(self.logger, "[WfdRtpConsumer] start rtp server failed: {e}");
                false
            }
        }
    }

    pub fn stop(&self) {
        self.is_running.store(false, Ordering::Release);
        if let Ok(mut slot) = self.udp.lock() {
            if let Some(mut server) = slot.take() {
                server.stop();
            }
        }
        if let Ok(mut slot) = self.depacketizer.lock() {
            if let Some(mut depacketizer) = slot.take() {
                depacketizer.release();
            }
        }
    }

    pub fn pause(&self, media_type: MediaType) {
        if let Ok(mut paused) = self.router.paused.lock() {
            *paused = Some(media_type);
        }
    }

    pub fn resume(&self) {
        if let Ok(mut paused) = self.router.paused.lock() {
            *paused = None;
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn audio_track(&self) -> AudioTrack {
        self.init_params
            .lock()
            .map(|p| p.audio_track)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn video_track(&self) -> VideoTrack {
        self.init_params
            .lock()
            .map(|p| p.video_track)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_pc_source(&self) -> bool {
        self.init_params
            .lock()
            .map(|p| p.is_pc_source)
            .unwrap_or(false)
    }

    /// Local ingest used by tests and loopback paths.
    pub fn inject_frame(&self, frame: Frame) {
        self.router.route(frame);
    }
}

impl Drop for WfdRtpConsumer {
    fn drop(&mut self) {
        self.stop();
    }
}
