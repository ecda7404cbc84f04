//! Decoder back-end contract.
//!
//! Mirrors the index-based asynchronous codec interface of platform decoders:
//! the backend announces free input buffers, the runner queues bitstream by
//! index, and decoded output arrives through observer callbacks on the
//! backend's own thread together with an output index the runner must
//! release once rendered.

use std::sync::Arc;

use super::codec_error::CodecError;

/// Timing and size metadata travelling with one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferInfo {
    pub presentation_us: i64,
    pub size: usize,
}

/// Configuration handed to `configure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendFormat {
    Audio {
        sample_rate: u32,
        channels: u32,
    },
    Video {
        width: u32,
        height: u32,
        frame_rate: u32,
    },
}

/// Callbacks fired from the backend's decode thread.
pub trait BackendObserver: Send + Sync {
    fn on_input_available(&self, index: u32);
    fn on_output_available(&self, index: u32, info: BufferInfo, data: &[u8]);
    fn on_format_changed(&self, format: &BackendFormat);
    fn on_error(&self, code: i32);
}

/// An asynchronous decoder backend.
pub trait DecoderBackend: Send {
    fn set_observer(&mut self, observer: Arc<dyn BackendObserver>);
    fn configure(&mut self, format: BackendFormat) -> Result<(), CodecError>;
    fn prepare(&mut self) -> Result<(), CodecError>;
    fn start(&mut self) -> Result<(), CodecError>;
    /// Discard queued input without tearing the decoder down.
    fn flush(&mut self) -> Result<(), CodecError>;
    fn stop(&mut self) -> Result<(), CodecError>;
    fn reset(&mut self) -> Result<(), CodecError>;
    fn release(&mut self);
    fn queue_input_buffer(
        &mut self,
        index: u32,
        data: &[u8],
        info: BufferInfo,
    ) -> Result<(), CodecError>;
    fn release_output_buffer(&mut self, index: u32) -> Result<(), CodecError>;
}
