use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::anchor::AnchorConfig;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.05;
pub const DEFAULT_TOP_K: usize = 5000;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.3;
pub const DEFAULT_KEEP_TOP_K: usize = 750;
pub const DEFAULT_FACEBOX_THRESHOLD: f32 = 0.9;
pub const DEFAULT_RESIZE: f32 = 1.0;
/// Largest accepted `resize`; a 1280x720 capture becomes 5120x2880.
pub const MAX_RESIZE: f32 = 4.0;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} must be a finite, non-negative number, got {value}")]
    Negative { name: &'static str, value: f32 },
    #[error("{name} must be between 0.0 and 1.0, got {value}")]
    OutOfUnitRange { name: &'static str, value: f32 },
    #[error("resize must be greater than 0 and at most {max}, got {0}", max = MAX_RESIZE)]
    Resize(f32),
    #[error("anchor configuration has no feature levels")]
    NoAnchorLevels,
    #[error("anchor level {level}: {reason}")]
    AnchorLevel { level: usize, reason: String },
    #[error("anchor variance must be finite and non-negative, got {0:?}")]
    Variance([f32; 2]),
    #[error("failed to read anchor configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse anchor configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Every tunable of the post-processing pass.
///
/// Built once at startup, validated, then handed to the pipeline; nothing
/// reads configuration from ambient state afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionConfig {
    /// Coarse pre-filter: candidates must score strictly above this.
    pub confidence_threshold: f32,
    /// Cap on candidates entering NMS.
    pub top_k: usize,
    /// IoU above which a lower-scoring box is suppressed.
    pub nms_threshold: f32,
    /// Cap on boxes leaving NMS.
    pub keep_top_k: usize,
    /// Display cutoff: boxes at or above this are reported as faces.
    pub facebox_threshold: f32,
    /// Factor the frame is scaled by before inference.
    pub resize: f32,
    pub anchors: AnchorConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            top_k: DEFAULT_TOP_K,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
            keep_top_k: DEFAULT_KEEP_TOP_K,
            facebox_threshold: DEFAULT_FACEBOX_THRESHOLD,
            resize: DEFAULT_RESIZE,
            anchors: AnchorConfig::default(),
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("confidence_threshold", self.confidence_threshold)?;
        unit_range("nms_threshold", self.nms_threshold)?;
        unit_range("facebox_threshold", self.facebox_threshold)?;
        if !(self.resize > 0.0 && self.resize <= MAX_RESIZE) {
            return Err(ConfigError::Resize(self.resize));
        }
        self.anchors.validate()
    }
}

impl AnchorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.levels.is_empty() {
            return Err(ConfigError::NoAnchorLevels);
        }
        for (level, feature_level) in self.levels.iter().enumerate() {
            let invalid = |reason: String| ConfigError::AnchorLevel { level, reason };
            if feature_level.step == 0 {
                return Err(invalid("step must be positive".to_string()));
            }
            if feature_level.sizes.is_empty() {
                return Err(invalid("no anchor sizes".to_string()));
            }
            for size in &feature_level.sizes {
                if size.size == 0 {
                    return Err(invalid("anchor size must be positive".to_string()));
                }
                if size.offsets.is_empty() {
                    return Err(invalid(format!("size {} has no offsets", size.size)));
                }
                if let Some(offset) = size
                    .offsets
                    .iter()
                    .find(|o| !(0.0..1.0).contains(*o))
                {
                    return Err(invalid(format!(
                        "size {} offset {offset} outside [0, 1)",
                        size.size
                    )));
                }
            }
        }
        if self
            .variance
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(ConfigError::Variance(self.variance));
        }
        Ok(())
    }

    /// Loads and validates an anchor table from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: AnchorConfig = serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }
}

fn non_negative(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Negative { name, value })
    }
}

fn unit_range(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfUnitRange { name, value })
    }
}
