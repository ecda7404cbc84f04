use std::sync::Arc;

use crate::event::{ConsumerInit, EventMsg, ProsumerKind};
use crate::media::MediaType;
use crate::playback::{SceneType, Surface};

/// Typed operations accepted by the media channel. Each references the
/// prosumer it addresses through `ChannelEvent::prosumer_id` where relevant.
#[derive(Clone)]
pub enum ChannelEventKind {
    ConsumerCreate { kind: ProsumerKind },
    ConsumerDestroy,
    ConsumerStart,
    ConsumerStop,
    ConsumerPause { media_type: MediaType },
    ConsumerResume { media_type: MediaType },
    /// Negotiated parameters for the consumer (forwarded session event).
    ConsumerInitInfo(ConsumerInit),
    ProducerCreate { kind: ProsumerKind },
    ProducerDestroy,
    ProducerStart,
    ProducerStop,
    ProducerPause { media_type: MediaType },
    ProducerResume { media_type: MediaType },
    AppendSurface { surface: Arc<dyn Surface>, scene_type: SceneType },
    RemoveSurface { surface_id: u64 },
    SetSceneType { surface_id: u64, scene_type: SceneType },
    SetVolume { volume: f32 },
    KeyRedirect { surface_id: u64, key_redirect: bool },
    PlayStart,
    PlayStop,
}

/// One routed channel operation.
#[derive(Clone)]
pub struct ChannelEvent {
    pub msg: EventMsg,
    pub prosumer_id: u32,
    pub kind: ChannelEventKind,
}

impl ChannelEvent {
    pub fn new(msg: EventMsg, kind: ChannelEventKind) -> Self {
        Self {
            msg,
            prosumer_id: crate::event::INVALID_ID,
            kind,
        }
    }

    #[must_use]
    pub fn with_prosumer(mut self, prosumer_id: u32) -> Self {
        self.prosumer_id = prosumer_id;
        self
    }
}
