use std::sync::Arc;

/// Result alias for renderer operations.
pub type RenderResult<T> = Result<T, String>;

/// Focus-change hint delivered by the platform audio service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptHint {
    Pause,
    Resume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Prepared,
    Running,
    Stopped,
    Released,
}

/// State-change and interrupt callbacks from the renderer.
pub trait AudioRenderCallback: Send + Sync {
    fn on_interrupt(&self, hint: InterruptHint);
    fn on_state_change(&self, state: RenderState);
}

/// Abstraction over the operating system's audio output.
///
/// Typical implementations:
/// - `CpalAudioRender`: plays through the default sound device.
/// - a test double that records written samples.
pub trait AudioRender: Send {
    fn prepare(&mut self, channels: u32, sample_rate: u32) -> RenderResult<()>;
    fn start(&mut self) -> RenderResult<()>;
    fn stop(&mut self) -> RenderResult<()>;
    fn pause(&mut self) -> RenderResult<()>;
    /// Block until queued samples have played out.
    fn drain(&mut self) -> RenderResult<()>;
    /// Discard queued samples.
    fn flush(&mut self) -> RenderResult<()>;
    fn release(&mut self);
    fn set_volume(&mut self, volume: f32) -> RenderResult<()>;
    fn set_parameters(&mut self, bits: u32, channels: u32, sample_rate: u32) -> RenderResult<()>;
    /// Write interleaved S16LE bytes; returns the bytes consumed.
    fn write(&mut self, buf: &[u8]) -> RenderResult<usize>;
    fn set_callback(&mut self, callback: Arc<dyn AudioRenderCallback>);
    /// Current output queue depth expressed as microseconds of audio.
    fn latency_us(&self) -> i64;
}
