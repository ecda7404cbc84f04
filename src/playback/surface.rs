use bytes::Bytes;

/// One decoded picture, packed RGB8.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub pts_us: i64,
    pub data: Bytes,
}

/// A render target for decoded video. The compositor owns the real surface;
/// the sink only needs a stable id and a place to push pictures.
pub trait Surface: Send + Sync {
    fn unique_id(&self) -> u64;
    fn render(&self, frame: &VideoFrame);
}
