use crate::detection::domain::detection::DetectionSet;
use crate::shared::frame::Frame;

/// Draws detections onto a frame in place.
pub trait FrameAnnotator: Send {
    fn annotate(
        &self,
        frame: &mut Frame,
        detections: &DetectionSet,
    ) -> Result<(), Box<dyn std::error::Error>>;
}
