pub mod audio_decoder;
pub mod backend;
pub mod codec_error;
pub mod factory;
pub mod g711;
pub mod h264_backend;
pub mod pcm_backend;
pub mod video_decoder;

pub use audio_decoder::{AudioCodecDecoder, AudioSampleSink};
pub use backend::{BackendFormat, BackendObserver, BufferInfo, DecoderBackend};
pub use codec_error::CodecError;
pub use factory::{BackendFactoryFn, CodecFactory};
pub use video_decoder::VideoCodecDecoder;

use std::time::Duration;

/// How long `on_frame` waits for a free input buffer before dropping.
pub const AUDIO_DECODE_WAIT: Duration = Duration::from_millis(10);
/// Minimum spacing between externally forced audio drops, in microseconds.
pub const AUDIO_DECODE_DROP_INTERVAL_US: i64 = 1_000_000;
/// Render queue cap; exceeding it drops the whole queue.
pub const MAX_RENDER_BUFFER: usize = 50;

/// Decoder lifecycle. Transitions are strictly forward except the stop/start
/// cycle between `Running` and `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Created,
    Inited,
    Running,
    Stopped,
    Released,
}
