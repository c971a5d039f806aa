use crate::detection::domain::anchor::FeatureMapShape;
use crate::shared::frame::Frame;

/// Raw per-anchor network output for one image.
///
/// `loc[i]` and `conf[i]` both belong to anchor `i`; `conf` holds
/// `[background, face]` probabilities.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InferenceOutput {
    pub loc: Vec<[f32; 4]>,
    pub conf: Vec<[f32; 2]>,
    pub feature_maps: Vec<FeatureMapShape>,
}

impl InferenceOutput {
    pub fn len(&self) -> usize {
        self.loc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loc.is_empty()
    }

    pub fn face_scores(&self) -> impl Iterator<Item = f32> + '_ {
        self.conf.iter().map(|c| c[1])
    }
}

/// Domain interface to the pretrained network.
///
/// The post-processing core only sees [`InferenceOutput`]; how the weights
/// are loaded and executed is the implementation's business.
pub trait InferenceProvider: Send {
    /// Runs the network on an already-resized frame.
    fn infer(&mut self, image: &Frame) -> Result<InferenceOutput, Box<dyn std::error::Error>>;
}
