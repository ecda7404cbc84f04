use super::error_code::ErrorCode;

pub const INVALID_ID: u32 = u32::MAX;

/// The manager a routed event originates from or is destined to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModuleTag {
    #[default]
    Context,
    Agent,
    MediaChannel,
    Interaction,
}

/// Routing header carried by every event crossing a module boundary.
#[derive(Debug, Clone, Copy)]
pub struct EventMsg {
    pub src_id: u32,
    pub dst_id: u32,
    pub from_mgr: ModuleTag,
    pub to_mgr: ModuleTag,
    pub request_id: u32,
    pub error_code: ErrorCode,
}

impl EventMsg {
    pub fn new(src_id: u32, from_mgr: ModuleTag, to_mgr: ModuleTag) -> Self {
        Self {
            src_id,
            dst_id: INVALID_ID,
            from_mgr,
            to_mgr,
            request_id: 0,
            error_code: ErrorCode::Ok,
        }
    }

    #[must_use]
    pub fn with_error(mut self, error_code: ErrorCode) -> Self {
        self.error_code = error_code;
        self
    }

    #[must_use]
    pub fn with_dst(mut self, dst_id: u32) -> Self {
        self.dst_id = dst_id;
        self
    }
}

impl Default for EventMsg {
    fn default() -> Self {
        Self {
            src_id: INVALID_ID,
            dst_id: INVALID_ID,
            from_mgr: ModuleTag::default(),
            to_mgr: ModuleTag::default(),
            request_id: 0,
            error_code: ErrorCode::Ok,
        }
    }
}
