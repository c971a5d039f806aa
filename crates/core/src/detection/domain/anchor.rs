use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Reference box in normalized, image-relative center form.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Anchor {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

impl Anchor {
    pub fn new(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self { cx, cy, w, h }
    }

    fn clamped(self) -> Self {
        Self {
            cx: self.cx.clamp(0.0, 1.0),
            cy: self.cy.clamp(0.0, 1.0),
            w: self.w.clamp(0.0, 1.0),
            h: self.h.clamp(0.0, 1.0),
        }
    }
}

/// Pixel dimensions of the image fed to the network (after resizing).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageSize {
    pub height: u32,
    pub width: u32,
}

impl ImageSize {
    pub fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }
}

/// Spatial size of one detection head's feature map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FeatureMapShape {
    pub height: usize,
    pub width: usize,
}

impl FeatureMapShape {
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }
}

/// One anchor edge length and the sub-cell offsets it is replicated at.
///
/// The offsets are applied on both axes, so a size with `n` offsets emits
/// `n * n` anchors per cell ordered by (y offset, x offset). `[0.5]` is the
/// plain cell-centred anchor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnchorSize {
    pub size: u32,
    #[serde(default = "centered_offsets")]
    pub offsets: Vec<f32>,
}

impl AnchorSize {
    pub fn centered(size: u32) -> Self {
        Self {
            size,
            offsets: centered_offsets(),
        }
    }

    pub fn densified(size: u32, offsets: &[f32]) -> Self {
        Self {
            size,
            offsets: offsets.to_vec(),
        }
    }

    fn anchors_per_cell(&self) -> usize {
        self.offsets.len() * self.offsets.len()
    }
}

fn centered_offsets() -> Vec<f32> {
    vec![0.5]
}

/// Anchor sizes emitted for every cell of one feature map, plus its stride.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureLevel {
    pub step: u32,
    pub sizes: Vec<AnchorSize>,
}

/// Full prior-box layout for a network.
///
/// Level order, size order and offset order together define the anchor
/// index layout, which must match the network's output layout exactly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnchorConfig {
    pub levels: Vec<FeatureLevel>,
    pub variance: [f32; 2],
    #[serde(default)]
    pub clip: bool,
}

/// Sub-cell offsets for the 32 px FaceBoxes anchors (4x densification).
pub const DENSE_OFFSETS_32: [f32; 4] = [0.0, 0.25, 0.5, 0.75];
/// Sub-cell offsets for the 64 px FaceBoxes anchors (2x densification).
pub const DENSE_OFFSETS_64: [f32; 2] = [0.0, 0.5];

impl Default for AnchorConfig {
    /// The published FaceBoxes layout: 21 anchors per cell on the stride-32
    /// map, one on the stride-64 and stride-128 maps.
    fn default() -> Self {
        Self {
            levels: vec![
                FeatureLevel {
                    step: 32,
                    sizes: vec![
                        AnchorSize::densified(32, &DENSE_OFFSETS_32),
                        AnchorSize::densified(64, &DENSE_OFFSETS_64),
                        AnchorSize::centered(128),
                    ],
                },
                FeatureLevel {
                    step: 64,
                    sizes: vec![AnchorSize::centered(256)],
                },
                FeatureLevel {
                    step: 128,
                    sizes: vec![AnchorSize::centered(512)],
                },
            ],
            variance: [0.1, 0.2],
            clip: false,
        }
    }
}

impl AnchorConfig {
    /// Feature-map shapes implied by the level strides: `ceil(dim / step)`.
    pub fn feature_maps_for(&self, image: ImageSize) -> Vec<FeatureMapShape> {
        self.levels
            .iter()
            .map(|level| {
                let step = level.step.max(1);
                FeatureMapShape::new(
                    image.height.div_ceil(step) as usize,
                    image.width.div_ceil(step) as usize,
                )
            })
            .collect()
    }

    /// Number of anchors [`generate_anchors`] produces for these shapes.
    pub fn anchor_count(&self, feature_maps: &[FeatureMapShape]) -> usize {
        feature_maps
            .iter()
            .zip(&self.levels)
            .map(|(shape, level)| {
                let per_cell: usize = level.sizes.iter().map(AnchorSize::anchors_per_cell).sum();
                shape.height * shape.width * per_cell
            })
            .sum()
    }
}

/// Generates the ordered anchor sequence for one network input.
///
/// Cells are visited row-major within each level; within a cell, sizes come
/// in configured order and each size's offsets in (y, x) row-major order.
/// Coordinates are computed in f64 and narrowed once, so repeated calls are
/// bit-identical.
///
/// # Panics
///
/// If the number of feature maps differs from the configured levels, or
/// any dimension is zero.
pub fn generate_anchors(
    feature_maps: &[FeatureMapShape],
    image: ImageSize,
    config: &AnchorConfig,
) -> Vec<Anchor> {
    assert_eq!(
        feature_maps.len(),
        config.levels.len(),
        "feature map count must match configured anchor levels"
    );
    assert!(
        image.width > 0 && image.height > 0,
        "image dimensions must be positive, got {}x{}",
        image.width,
        image.height
    );

    let img_w = image.width as f64;
    let img_h = image.height as f64;
    let mut anchors = Vec::with_capacity(config.anchor_count(feature_maps));

    for (shape, level) in feature_maps.iter().zip(&config.levels) {
        assert!(
            shape.height > 0 && shape.width > 0,
            "feature map dimensions must be positive, got {}x{}",
            shape.width,
            shape.height
        );
        let step = level.step as f64;
        for i in 0..shape.height {
            for j in 0..shape.width {
                for size in &level.sizes {
                    let w = (size.size as f64 / img_w) as f32;
                    let h = (size.size as f64 / img_h) as f32;
                    for &oy in &size.offsets {
                        let cy = ((i as f64 + oy as f64) * step / img_h) as f32;
                        for &ox in &size.offsets {
                            let cx = ((j as f64 + ox as f64) * step / img_w) as f32;
                            let anchor = Anchor::new(cx, cy, w, h);
                            anchors.push(if config.clip { anchor.clamped() } else { anchor });
                        }
                    }
                }
            }
        }
    }

    anchors
}

type AnchorKey = (Vec<FeatureMapShape>, ImageSize);

/// Memoizes anchor sequences per (feature maps, image size).
///
/// Consecutive frames from one camera share a shape, so generation normally
/// runs once. Returned sequences are shared and immutable.
pub struct AnchorCache {
    config: AnchorConfig,
    entries: HashMap<AnchorKey, Arc<[Anchor]>>,
}

impl AnchorCache {
    pub fn new(config: AnchorConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
        }
    }

    pub fn config(&self) -> &AnchorConfig {
        &self.config
    }

    pub fn get_or_generate(
        &mut self,
        feature_maps: &[FeatureMapShape],
        image: ImageSize,
    ) -> Arc<[Anchor]> {
        let key = (feature_maps.to_vec(), image);
        if let Some(anchors) = self.entries.get(&key) {
            return Arc::clone(anchors);
        }
        let anchors: Arc<[Anchor]> = generate_anchors(feature_maps, image, &self.config).into();
        log::debug!(
            "Generated {} anchors for {}x{} input",
            anchors.len(),
            image.width,
            image.height
        );
        self.entries.insert(key, Arc::clone(&anchors));
        anchors
    }

    /// Number of distinct shapes generated so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
