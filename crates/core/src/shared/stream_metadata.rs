#[derive(Clone, Debug, PartialEq)]
pub struct StreamMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// `None` for live sources with no known length.
    pub total_frames: Option<usize>,
    pub codec: String,
    pub source: String,
}

impl StreamMetadata {
    pub fn is_live(&self) -> bool {
        self.total_frames.is_none()
    }
}
