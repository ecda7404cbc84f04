//! Headless Miracast sink: wires a WFD session to a media channel and routes
//! agent events between them, standing in for the surrounding service layer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};

use castsink::channel::{ChannelEvent, ChannelEventKind, MediaChannel};
use castsink::config::Config;
use castsink::event::{AgentEvent, AgentEventKind, EventMsg};
use castsink::log::log_sink::LogSink;
use castsink::log::logger::Logger;
use castsink::playback::{SceneType, Surface, VideoFrame};
use castsink::session::{WfdSessionConfig, WfdSinkSession};
use castsink::{sink_error, sink_info};
use rand::Rng;

/// Render target that only accounts frames; a compositor would draw them.
struct StatsSurface {
    id: u64,
    frames: AtomicU64,
    logger: Arc<dyn LogSink>,
}

impl Surface for StatsSurface {
    fn unique_id(&self) -> u64 {
        self.id
    }

    fn render(&self, frame: &VideoFrame) {
        let n = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        if n % 60 == 1 {
            sink_info!(
                self.logger,
                "[StatsSurface] frame {n}: {}x{} pts={}us",
                frame.width,
                frame.height,
                frame.pts_us
            );
        }
    }
}

fn main() {
    let logger = Logger::start_default("castsink", 4096);
    let log: Arc<dyn LogSink> = Arc::new(logger.handle());
    sink_info!(log, "castsink starting, log file: {:?}", logger.file_path());

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "castsink.ini".into());
    let config = Config::load(&config_path).unwrap_or_else(|e| {
        sink_error!(log, "config: {e}; using defaults");
        Config::empty()
    });

    // Without a configured port, advertise a random one from the ephemeral
    // range so parallel sinks on one host do not collide.
    let local_rtp_port = match config.get_u16("session", "local_rtp_port", 0) {
        0 => rand::thread_rng().gen_range(15_000..30_000),
        port => port,
    };
    let session_config = WfdSessionConfig {
        remote_mac: config.get_or_default("session", "remote_mac", "").to_string(),
        remote_ip: config
            .get_or_default("session", "remote_ip", "192.168.49.1")
            .to_string(),
        remote_port: config.get_u16("session", "remote_port", 0),
        local_ip: config.get_or_default("session", "local_ip", "0.0.0.0").to_string(),
        local_rtp_port,
        wfd_params: Default::default(),
    };
    let volume: f32 = config
        .get_or_default("playback", "volume", "1.0")
        .parse()
        .unwrap_or(1.0);

    let (agent_tx, agent_rx) = mpsc::channel::<AgentEvent>();
    let channel = MediaChannel::new(&config, Arc::clone(&log), agent_tx.clone());
    let session = WfdSinkSession::new(session_config, Arc::clone(&log), agent_tx);

    if !session.start() {
        sink_error!(log, "session start failed");
        return;
    }

    let surface = Arc::new(StatsSurface {
        id: 1,
        frames: AtomicU64::new(0),
        logger: Arc::clone(&log),
    });

    // Service loop: translate agent events into channel operations and feed
    // media-side outcomes back into the session.
    while let Ok(event) = agent_rx.recv() {
        match &event.kind {
            AgentEventKind::CreateConsumer { kind } => {
                channel.handle_event(ChannelEvent::new(
                    EventMsg::default(),
                    ChannelEventKind::ConsumerCreate { kind: *kind },
                ));
            }
            AgentEventKind::ConsumerInitInfo(init) => {
                channel.handle_event(ChannelEvent::new(
                    EventMsg::default(),
                    ChannelEventKind::ConsumerInitInfo(init.clone()),
                ));
            }
            AgentEventKind::ProsumerCreated { .. }
            | AgentEventKind::ProsumerInit { .. }
            | AgentEventKind::ProsumerResumed { .. }
            | AgentEventKind::KeymodeStop
            | AgentEventKind::RequestIdr
            | AgentEventKind::WriteWarning => {
                session.on_media_event(&event);
            }
            AgentEventKind::SessionStarted => {
                channel.handle_event(ChannelEvent::new(
                    EventMsg::default(),
                    ChannelEventKind::ConsumerStart,
                ));
            }
            AgentEventKind::RtspPlayed => {
                channel.handle_event(ChannelEvent::new(
                    EventMsg::default(),
                    ChannelEventKind::AppendSurface {
                        surface: Arc::clone(&surface) as Arc<dyn Surface>,
                        scene_type: SceneType::Foreground,
                    },
                ));
                channel.handle_event(ChannelEvent::new(
                    EventMsg::default(),
                    ChannelEventKind::SetVolume { volume },
                ));
                channel.handle_event(ChannelEvent::new(
                    EventMsg::default(),
                    ChannelEventKind::PlayStart,
                ));
            }
            AgentEventKind::RtspTeardown => {
                sink_info!(log, "source tore the session down");
                break;
            }
            AgentEventKind::SessionError => {
                sink_error!(log, "session error: {}", event.msg.error_code);
                break;
            }
            AgentEventKind::SessionInterrupted => {
                sink_info!(log, "session interrupted");
                break;
            }
            _ => {}
        }
    }

    channel.handle_event(ChannelEvent::new(
        EventMsg::default(),
        ChannelEventKind::PlayStop,
    ));
    channel.handle_event(ChannelEvent::new(
        EventMsg::default(),
        ChannelEventKind::ConsumerStop,
    ));
    session.teardown();
    session.shutdown();
    channel.release();
    sink_info!(log, "castsink exiting");
}
