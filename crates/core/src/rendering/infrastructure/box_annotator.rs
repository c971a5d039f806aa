use imageproc::rect::Rect;

use crate::detection::domain::detection::{Detection, DetectionSet};
use crate::rendering::domain::frame_annotator::FrameAnnotator;
use crate::shared::frame::Frame;

/// Blue in RGB order.
pub const DEFAULT_BOX_COLOR: [u8; 3] = [0, 0, 255];
pub const DEFAULT_LINE_WIDTH: u32 = 2;

/// Fraction of the box height dropped from the top before drawing, so the
/// rectangle sits over the face rather than the forehead.
const TOP_TRIM: f32 = 0.2;

/// Outlines every detection at or above `threshold` with a hollow rectangle.
///
/// Detections below the threshold are left undrawn.
pub struct BoxAnnotator {
    threshold: f32,
    color: [u8; 3],
    line_width: u32,
}

impl BoxAnnotator {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            color: DEFAULT_BOX_COLOR,
            line_width: DEFAULT_LINE_WIDTH,
        }
    }

    pub fn with_color(mut self, color: [u8; 3]) -> Self {
        self.color = color;
        self
    }

    pub fn with_line_width(mut self, line_width: u32) -> Self {
        self.line_width = line_width.max(1);
        self
    }
}

impl FrameAnnotator for BoxAnnotator {
    fn annotate(
        &self,
        frame: &mut Frame,
        detections: &DetectionSet,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let (width, height, index) = (frame.width(), frame.height(), frame.index());
        let mut canvas =
            image::ImageBuffer::<image::Rgb<u8>, _>::from_raw(width, height, frame.data_mut())
                .ok_or("Frame buffer does not match its dimensions")?;

        let mut drawn = 0usize;
        for det in detections.confirmed(self.threshold) {
            let Some(rect) = outline(det, width, height) else {
                continue;
            };
            for inset in 0..self.line_width {
                let Some(ring) = shrink(rect, inset) else {
                    break;
                };
                imageproc::drawing::draw_hollow_rect_mut(&mut canvas, ring, image::Rgb(self.color));
            }
            drawn += 1;
        }
        log::trace!("Frame {index}: drew {drawn} boxes");
        Ok(())
    }
}

/// Pixel rectangle for a detection, top trimmed and clamped to the frame.
///
/// `None` when nothing of the box lies inside the frame.
fn outline(det: &Detection, width: u32, height: u32) -> Option<Rect> {
    if width == 0 || height == 0 {
        return None;
    }
    let ymin = det.ymin + TOP_TRIM * (det.ymax - det.ymin + 1.0);
    let max_x = (width - 1) as f32;
    let max_y = (height - 1) as f32;

    if det.xmax < 0.0 || ymin > max_y || det.xmin > max_x || det.ymax < 0.0 {
        return None;
    }

    let x0 = det.xmin.clamp(0.0, max_x) as i32;
    let y0 = ymin.clamp(0.0, max_y) as i32;
    let x1 = det.xmax.clamp(0.0, max_x) as i32;
    let y1 = det.ymax.clamp(0.0, max_y) as i32;
    if x1 < x0 || y1 < y0 {
        return None;
    }
    Some(Rect::at(x0, y0).of_size((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32))
}

fn shrink(rect: Rect, inset: u32) -> Option<Rect> {
    let w = rect.width().checked_sub(2 * inset)?;
    let h = rect.height().checked_sub(2 * inset)?;
    if w == 0 || h == 0 {
        return None;
    }
    Some(Rect::at(rect.left() + inset as i32, rect.top() + inset as i32).of_size(w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLUE: [u8; 3] = [0, 0, 255];

    fn black(width: u32, height: u32) -> Frame {
        Frame::new(vec![0; (width * height * 3) as usize], width, height, 0)
    }

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 3] {
        let i = ((y * frame.width() + x) * 3) as usize;
        [frame.data()[i], frame.data()[i + 1], frame.data()[i + 2]]
    }

    fn set(dets: &[Detection]) -> DetectionSet {
        DetectionSet::new(dets.to_vec())
    }

    #[test]
    fn test_confirmed_box_is_outlined_with_trimmed_top() {
        let mut frame = black(100, 100);
        // Height 39 + 1 = 40, trimmed by 8 pixels.
        let det = Detection::new(10.0, 20.0, 50.0, 59.0, 0.95);
        BoxAnnotator::new(0.9).annotate(&mut frame, &set(&[det])).unwrap();

        assert_eq!(pixel(&frame, 10, 28), BLUE);
        assert_eq!(pixel(&frame, 30, 28), BLUE);
        assert_eq!(pixel(&frame, 30, 59), BLUE);
        assert_eq!(pixel(&frame, 50, 40), BLUE);
        // Second ring of the 2px outline
        assert_eq!(pixel(&frame, 11, 40), BLUE);
        // Above the trimmed top and the interior stay untouched
        assert_eq!(pixel(&frame, 30, 20), [0, 0, 0]);
        assert_eq!(pixel(&frame, 30, 40), [0, 0, 0]);
    }

    #[test]
    fn test_unconfirmed_box_is_not_drawn() {
        let mut frame = black(64, 64);
        let det = Detection::new(5.0, 5.0, 40.0, 40.0, 0.5);
        BoxAnnotator::new(0.9).annotate(&mut frame, &set(&[det])).unwrap();
        assert!(frame.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut frame = black(64, 64);
        let det = Detection::new(5.0, 5.0, 40.0, 40.0, 0.9);
        BoxAnnotator::new(0.9).annotate(&mut frame, &set(&[det])).unwrap();
        assert!(frame.data().iter().any(|&b| b != 0));
    }

    #[test]
    fn test_box_past_the_edge_is_clamped() {
        let mut frame = black(32, 32);
        let det = Detection::new(-10.0, 0.0, 100.0, 100.0, 0.99);
        BoxAnnotator::new(0.5)
            .with_color([255, 0, 0])
            .annotate(&mut frame, &set(&[det]))
            .unwrap();
        // Top trimmed to 20.2, so the sides start at row 20
        assert_eq!(pixel(&frame, 0, 25), [255, 0, 0]);
        assert_eq!(pixel(&frame, 31, 25), [255, 0, 0]);
        assert_eq!(pixel(&frame, 0, 10), [0, 0, 0]);
    }

    #[test]
    fn test_box_outside_frame_is_skipped() {
        let mut frame = black(32, 32);
        let det = Detection::new(40.0, 40.0, 60.0, 60.0, 0.99);
        BoxAnnotator::new(0.5).annotate(&mut frame, &set(&[det])).unwrap();
        assert!(frame.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_empty_set_leaves_frame_untouched() {
        let mut frame = black(16, 16);
        BoxAnnotator::new(0.9)
            .with_line_width(3)
            .annotate(&mut frame, &DetectionSet::empty())
            .unwrap();
        assert!(frame.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_shrink_stops_when_rect_collapses() {
        let rect = Rect::at(0, 0).of_size(3, 3);
        assert!(shrink(rect, 1).is_some());
        assert!(shrink(rect, 2).is_none());
    }
}
