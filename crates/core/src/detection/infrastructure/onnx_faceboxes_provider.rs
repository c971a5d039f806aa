//! FaceBoxes network executed through ONNX Runtime via `ort`.
//!
//! The model takes a mean-subtracted BGR image of any size and returns
//! per-anchor box regressions plus softmaxed `[background, face]` scores.
use std::path::Path;

use crate::detection::domain::anchor::{AnchorConfig, FeatureMapShape, ImageSize};
use crate::detection::domain::inference_provider::{InferenceOutput, InferenceProvider};
use crate::shared::frame::Frame;

/// Per-channel means in B, G, R order, subtracted from raw 0-255 pixels.
pub const BGR_MEAN: [f32; 3] = [104.0, 117.0, 123.0];

/// FaceBoxes inference provider backed by an ONNX Runtime session.
pub struct OnnxFaceBoxesProvider {
    session: ort::session::Session,
    anchors: AnchorConfig,
}

impl OnnxFaceBoxesProvider {
    /// Load a FaceBoxes ONNX export.
    ///
    /// `anchors` is only used to derive feature-map shapes when the export
    /// does not emit them as a third output.
    pub fn new(
        model_path: &Path,
        anchors: AnchorConfig,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?.commit_from_file(model_path)?;
        log::info!(
            "Loaded FaceBoxes model from {} ({} outputs)",
            model_path.display(),
            session.outputs().len()
        );
        Ok(Self { session, anchors })
    }
}

impl InferenceProvider for OnnxFaceBoxesProvider {
    fn infer(&mut self, image: &Frame) -> Result<InferenceOutput, Box<dyn std::error::Error>> {
        let input_tensor = preprocess(image);
        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;

        // FaceBoxes outputs:
        // - loc:  [1, N, 4]
        // - conf: [N, 2] or [1, N, 2]
        // - (optional) feature-map shapes: [levels, 2]
        if outputs.len() < 2 {
            return Err(
                format!("FaceBoxes model expected at least 2 outputs, got {}", outputs.len())
                    .into(),
            );
        }

        let loc = outputs[0].try_extract_array::<f32>()?;
        let conf = outputs[1].try_extract_array::<f32>()?;
        let loc_data = loc.as_slice().ok_or("Cannot get location slice")?;
        let conf_data = conf.as_slice().ok_or("Cannot get score slice")?;

        let size = ImageSize::new(image.height(), image.width());
        let feature_maps = if outputs.len() >= 3 {
            match outputs[2].try_extract_array::<i64>() {
                Ok(shapes) => {
                    let data = shapes.as_slice().ok_or("Cannot get feature-map slice")?;
                    parse_feature_maps(data)?
                }
                Err(_) => self.anchors.feature_maps_for(size),
            }
        } else {
            self.anchors.feature_maps_for(size)
        };

        parse_outputs(loc_data, conf_data, feature_maps)
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// RGB frame → `[1, 3, H, W]` BGR tensor with [`BGR_MEAN`] subtracted.
///
/// No resizing and no scaling to [0, 1]; the network was trained on raw
/// mean-centred pixels.
fn preprocess(frame: &Frame) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let h = frame.height() as usize;
    let w = frame.width() as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, h, w));
    for y in 0..h {
        for x in 0..w {
            for (c, mean) in BGR_MEAN.iter().enumerate() {
                // Tensor channel 0 is blue, the frame's channel 2
                tensor[[0, c, y, x]] = src[[y, x, 2 - c]] as f32 - mean;
            }
        }
    }
    tensor
}

// ---------------------------------------------------------------------------
// Output parsing
// ---------------------------------------------------------------------------

fn parse_outputs(
    loc: &[f32],
    conf: &[f32],
    feature_maps: Vec<FeatureMapShape>,
) -> Result<InferenceOutput, Box<dyn std::error::Error>> {
    if loc.len() % 4 != 0 || conf.len() % 2 != 0 {
        return Err(format!(
            "Unexpected FaceBoxes output sizes: loc={}, conf={}",
            loc.len(),
            conf.len()
        )
        .into());
    }
    if loc.len() / 4 != conf.len() / 2 {
        return Err(format!(
            "FaceBoxes outputs disagree on anchor count: loc has {}, conf has {}",
            loc.len() / 4,
            conf.len() / 2
        )
        .into());
    }

    Ok(InferenceOutput {
        loc: loc
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect(),
        conf: conf.chunks_exact(2).map(|c| [c[0], c[1]]).collect(),
        feature_maps,
    })
}

fn parse_feature_maps(data: &[i64]) -> Result<Vec<FeatureMapShape>, Box<dyn std::error::Error>> {
    if data.len() % 2 != 0 || data.iter().any(|&d| d <= 0) {
        return Err(format!("Invalid feature-map shape output: {data:?}").into());
    }
    Ok(data
        .chunks_exact(2)
        .map(|c| FeatureMapShape::new(c[0] as usize, c[1] as usize))
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
