/// A decoded face candidate in original-frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
    pub score: f32,
}

impl Detection {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32, score: f32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
            score,
        }
    }

    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }

    /// Area under the inclusive-pixel convention: `(w + 1) * (h + 1)`.
    ///
    /// A zero-size box still covers one pixel.
    pub fn legacy_area(&self) -> f32 {
        (self.width() + 1.0) * (self.height() + 1.0)
    }

    pub fn is_confirmed(&self, facebox_threshold: f32) -> bool {
        self.score >= facebox_threshold
    }
}

/// Ordered detections surviving one post-processing pass, best score first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionSet {
    detections: Vec<Detection>,
}

impl DetectionSet {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }

    pub fn as_slice(&self) -> &[Detection] {
        &self.detections
    }

    pub fn into_vec(self) -> Vec<Detection> {
        self.detections
    }

    /// Detections at or above the display threshold.
    ///
    /// Candidates between the confidence and facebox thresholds stay in the
    /// set but are not reported as faces.
    pub fn confirmed(&self, facebox_threshold: f32) -> impl Iterator<Item = &Detection> + '_ {
        self.detections
            .iter()
            .filter(move |d| d.is_confirmed(facebox_threshold))
    }
}

impl<'a> IntoIterator for &'a DetectionSet {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.detections.iter()
    }
}
