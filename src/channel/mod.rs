pub mod event;
pub mod media_channel;
pub mod rtp_producer;
pub mod wfd_rtp_consumer;

pub use event::{ChannelEvent, ChannelEventKind};
pub use media_channel::MediaChannel;
pub use wfd_rtp_consumer::WfdRtpConsumer;
