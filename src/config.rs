use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Thresholds and normalization used around the detection network.
///
/// Defaults match the WIDER FACE 640 test configuration of DSFD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Candidate threshold: per-class rows are read while their score is at least this
    #[serde(default = "default_conf_thresh")]
    pub conf_thresh: f32,

    /// Final threshold: only boxes scoring strictly above this are cached
    #[serde(default = "default_score_thresh")]
    pub score_thresh: f32,

    /// Per-channel mean subtracted from the input, in B, G, R order
    #[serde(default = "default_mean_bgr")]
    pub mean_bgr: [f32; 3],
}

fn default_conf_thresh() -> f32 {
    0.05
}

fn default_score_thresh() -> f32 {
    0.5
}

fn default_mean_bgr() -> [f32; 3] {
    [104.0, 117.0, 123.0]
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            conf_thresh: default_conf_thresh(),
            score_thresh: default_score_thresh(),
            mean_bgr: default_mean_bgr(),
        }
    }
}

impl DetectionConfig {
    /// Load a config from a TOML file. Missing keys fall back to the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| CacheError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply command line overrides on top of this config
    pub fn with_overrides(mut self, conf_thresh: Option<f32>, score_thresh: Option<f32>) -> Result<Self> {
        if let Some(t) = conf_thresh {
            self.conf_thresh = t;
        }
        if let Some(t) = score_thresh {
            self.score_thresh = t;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [("conf_thresh", self.conf_thresh), ("score_thresh", self.score_thresh)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CacheError::Config(format!("{} must be within 0.0-1.0, got {}", name, value)));
            }
        }
        Ok(())
    }
}
