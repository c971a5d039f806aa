use crate::detection::domain::anchor::{AnchorCache, ImageSize};
use crate::detection::domain::box_decoder::{decode_all, scale_factors};
use crate::detection::domain::detection::{Detection, DetectionSet};
use crate::detection::domain::detection_config::DetectionConfig;
use crate::detection::domain::inference_provider::InferenceOutput;
use crate::detection::domain::suppression::suppress;

/// Turns raw network output into a [`DetectionSet`] in original-frame pixels.
///
/// Anchors are generated lazily and memoized per input shape; decoding and
/// suppression run fresh for every frame.
pub struct DetectionPostProcessor {
    config: DetectionConfig,
    anchors: AnchorCache,
}

impl DetectionPostProcessor {
    pub fn new(config: DetectionConfig) -> Self {
        let anchors = AnchorCache::new(config.anchors.clone());
        Self { config, anchors }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// `image` is the size of the frame the network actually saw.
    ///
    /// # Panics
    ///
    /// If the output is not aligned with the anchor layout for its feature
    /// maps, or `loc` and `conf` differ in length.
    pub fn process(&mut self, output: &InferenceOutput, image: ImageSize) -> DetectionSet {
        assert_eq!(
            output.loc.len(),
            output.conf.len(),
            "location and score outputs must have the same length"
        );
        // No feature maps means no anchors; anything else must match the layout.
        if output.is_empty() && output.feature_maps.is_empty() {
            return DetectionSet::empty();
        }

        let anchors = self.anchors.get_or_generate(&output.feature_maps, image);
        assert_eq!(
            anchors.len(),
            output.len(),
            "network output must align one-to-one with anchors"
        );

        let variance = self.config.anchors.variance;
        let (sx, sy) = scale_factors(image, self.config.resize);
        let threshold = self.config.confidence_threshold;

        // Only candidates that can survive the confidence filter are decoded.
        let mut locs = Vec::new();
        let mut kept_anchors = Vec::new();
        let mut scores = Vec::new();
        for ((loc, score), anchor) in output
            .loc
            .iter()
            .zip(output.face_scores())
            .zip(anchors.iter())
        {
            if score > threshold {
                locs.push(*loc);
                kept_anchors.push(*anchor);
                scores.push(score);
            }
        }

        let candidates: Vec<Detection> = decode_all(&locs, &kept_anchors, variance)
            .into_iter()
            .zip(scores)
            .map(|(corners, score)| {
                let b = corners.scaled(sx, sy);
                Detection::new(b.xmin, b.ymin, b.xmax, b.ymax, score)
            })
            .collect();

        suppress(candidates, &self.config)
    }
}
