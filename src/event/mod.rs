pub mod agent_event;
pub mod error_code;
pub mod event_msg;

pub use agent_event::{AgentEvent, AgentEventKind, ConsumerInit, ProsumerKind};
pub use error_code::ErrorCode;
pub use event_msg::{EventMsg, ModuleTag, INVALID_ID};

use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

/// Process-wide id generator for sessions, channels and prosumers.
#[must_use]
pub fn next_id() -> u32 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}
