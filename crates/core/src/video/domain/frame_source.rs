use crate::shared::frame::Frame;
use crate::shared::stream_metadata::StreamMetadata;

/// Supplies frames from a camera device or video stream.
///
/// Opening is the only availability check: if `open` fails the pipeline
/// never starts. `frames` blocks until the next frame is captured.
pub trait FrameSource: Send {
    /// Opens the source (device path, file or URL) and returns its metadata.
    fn open(&mut self, source: &str) -> Result<StreamMetadata, Box<dyn std::error::Error>>;

    /// Returns an iterator over captured frames in order.
    fn frames(
        &mut self,
    ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_>;

    /// Releases the device or stream.
    fn close(&mut self);
}
