use crate::media::{AudioTrack, VideoTrack};

use super::event_msg::EventMsg;

/// Closed set of endpoint kinds a media channel can instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProsumerKind {
    WfdRtpConsumer,
    RtpProducer,
}

/// Negotiated stream parameters handed from the session to the consumer.
#[derive(Debug, Clone, Default)]
pub struct ConsumerInit {
    pub local_ip: String,
    pub local_rtp_port: u16,
    pub audio_track: AudioTrack,
    pub video_track: VideoTrack,
    pub is_pc_source: bool,
}

/// Typed payload of an event posted to the surrounding service layer.
#[derive(Debug, Clone)]
pub enum AgentEventKind {
    // Prosumer state transitions surfaced by the media channel.
    ProsumerCreated { prosumer_id: u32 },
    ProsumerStarted { prosumer_id: u32 },
    ProsumerStopped { prosumer_id: u32 },
    ProsumerPaused { prosumer_id: u32 },
    ProsumerResumed { prosumer_id: u32 },
    ProsumerDestroyed { prosumer_id: u32 },
    ProsumerError { prosumer_id: u32 },
    /// Consumer finished applying its init parameters; echoed to the session.
    ProsumerInit { prosumer_id: u32 },
    AppendSurfaceDone { surface_id: u64 },
    RemoveSurfaceDone { surface_id: u64 },
    PlayStartDone,
    PlayStopDone,
    /// Dispatcher intake stayed saturated past the write timeout.
    WriteWarning,
    AccelerationDone,
    DecoderDied { surface_id: u64 },
    KeymodeStart,
    KeymodeStop,

    // Session-originated notifications.
    SessionStarted,
    SessionStopped,
    SessionError,
    SessionInterrupted,
    /// Ask the service layer to build the consumer for this session.
    CreateConsumer { kind: ProsumerKind },
    /// Negotiated parameters for the consumer (private event).
    ConsumerInitInfo(ConsumerInit),
    RtspPlayed,
    RtspTeardown,
    RequestIdr,
    NotifyIsPcSource,
}

/// An outbound event: routing header plus typed payload.
#[derive(Debug, Clone)]
pub struct AgentEvent {
    pub msg: EventMsg,
    pub kind: AgentEventKind,
}

impl AgentEvent {
    pub fn new(msg: EventMsg, kind: AgentEventKind) -> Self {
        Self { msg, kind }
    }
}
