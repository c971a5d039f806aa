//! Regression decoding: anchor + predicted offsets → corner-form box.
//!
//! Centers move by `offset * variance[0] * anchor_size`; sizes scale by
//! `exp(offset * variance[1])`. Results stay normalized until
//! [`BoxCorners::scaled`] maps them into pixels.

use super::anchor::{Anchor, ImageSize};

/// Axis-aligned box in corner form.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxCorners {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl BoxCorners {
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        let xmin = cx - w / 2.0;
        let ymin = cy - h / 2.0;
        Self {
            xmin,
            ymin,
            xmax: xmin + w,
            ymax: ymin + h,
        }
    }

    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            xmin: self.xmin * sx,
            ymin: self.ymin * sy,
            xmax: self.xmax * sx,
            ymax: self.ymax * sy,
        }
    }
}

/// Decodes one anchor's regression output.
pub fn decode(loc: &[f32; 4], anchor: &Anchor, variance: [f32; 2]) -> BoxCorners {
    let cx = anchor.cx + loc[0] * variance[0] * anchor.w;
    let cy = anchor.cy + loc[1] * variance[0] * anchor.h;
    let w = anchor.w * (loc[2] * variance[1]).exp();
    let h = anchor.h * (loc[3] * variance[1]).exp();
    BoxCorners::from_center(cx, cy, w, h)
}

/// Decodes a full anchor-aligned output sequence.
///
/// # Panics
///
/// If `locs` and `anchors` differ in length: a misaligned sequence would
/// silently attach every offset to the wrong anchor.
pub fn decode_all(locs: &[[f32; 4]], anchors: &[Anchor], variance: [f32; 2]) -> Vec<BoxCorners> {
    assert_eq!(
        locs.len(),
        anchors.len(),
        "location outputs must align one-to-one with anchors"
    );
    locs.iter()
        .zip(anchors)
        .map(|(loc, anchor)| decode(loc, anchor, variance))
        .collect()
}

/// Pixel scale factors mapping normalized boxes back to the original frame.
///
/// `image` is the network input size; `resize` is the factor the frame was
/// scaled by before inference.
pub fn scale_factors(image: ImageSize, resize: f32) -> (f32, f32) {
    (
        image.width as f32 / resize,
        image.height as f32 / resize,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const VARIANCE: [f32; 2] = [0.1, 0.2];

    #[test]
    fn test_zero_offsets_reproduce_anchor() {
        let anchor = Anchor::new(0.5, 0.25, 0.2, 0.1);
        let b = decode(&[0.0; 4], &anchor, VARIANCE);
        assert_relative_eq!(b.xmin, 0.4, epsilon = 1e-6);
        assert_relative_eq!(b.ymin, 0.2, epsilon = 1e-6);
        assert_relative_eq!(b.xmax, 0.6, epsilon = 1e-6);
        assert_relative_eq!(b.ymax, 0.3, epsilon = 1e-6);
    }

    #[test]
    fn test_center_shift_scales_with_variance_and_anchor_size() {
        let anchor = Anchor::new(0.5, 0.5, 0.2, 0.4);
        let b = decode(&[1.0, -1.0, 0.0, 0.0], &anchor, VARIANCE);
        // cx = 0.5 + 1 * 0.1 * 0.2, cy = 0.5 - 0.1 * 0.4
        assert_relative_eq!((b.xmin + b.xmax) / 2.0, 0.52, epsilon = 1e-6);
        assert_relative_eq!((b.ymin + b.ymax) / 2.0, 0.46, epsilon = 1e-6);
        assert_relative_eq!(b.xmax - b.xmin, 0.2, epsilon = 1e-6);
    }

    #[test]
    fn test_size_offsets_are_exponential() {
        let anchor = Anchor::new(0.5, 0.5, 0.1, 0.1);
        let b = decode(&[0.0, 0.0, 5.0, -5.0], &anchor, VARIANCE);
        assert_relative_eq!(b.xmax - b.xmin, 0.1 * 1.0f32.exp(), epsilon = 1e-6);
        assert_relative_eq!(b.ymax - b.ymin, 0.1 * (-1.0f32).exp(), epsilon = 1e-6);
    }

    #[test]
    fn test_decoded_corners_are_ordered() {
        let anchor = Anchor::new(0.3, 0.7, 0.05, 0.08);
        for loc in [[3.0, -2.0, -10.0, 10.0], [-1.0, 1.0, 4.0, -4.0]] {
            let b = decode(&loc, &anchor, VARIANCE);
            assert!(b.xmin <= b.xmax);
            assert!(b.ymin <= b.ymax);
        }
    }

    #[test]
    fn test_decode_all_preserves_order() {
        let anchors = [
            Anchor::new(0.1, 0.1, 0.1, 0.1),
            Anchor::new(0.9, 0.9, 0.1, 0.1),
        ];
        let boxes = decode_all(&[[0.0; 4], [0.0; 4]], &anchors, VARIANCE);
        assert_eq!(boxes.len(), 2);
        assert!(boxes[0].xmin < boxes[1].xmin);
    }

    #[test]
    #[should_panic(expected = "must align one-to-one")]
    fn test_decode_all_rejects_misalignment() {
        let anchors = [Anchor::new(0.1, 0.1, 0.1, 0.1)];
        decode_all(&[[0.0; 4], [0.0; 4]], &anchors, VARIANCE);
    }

    #[test]
    fn test_scale_factors_undo_resize() {
        let (sx, sy) = scale_factors(ImageSize::new(360, 640), 0.5);
        assert_relative_eq!(sx, 1280.0);
        assert_relative_eq!(sy, 720.0);

        let b = BoxCorners::from_center(0.5, 0.5, 0.1, 0.2).scaled(sx, sy);
        assert_relative_eq!(b.xmin, 576.0, epsilon = 1e-3);
        assert_relative_eq!(b.ymax, 432.0, epsilon = 1e-3);
    }
}
