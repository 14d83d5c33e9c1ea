//! Pipeline configuration
//!
//! Thresholds and region banding are explicit configuration passed to the
//! classifier and pipeline constructors. Every field has a default so partial
//! JSON documents are accepted.

use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};

/// Default change threshold, as a fraction of face scale
pub const DEFAULT_THRESHOLD: f64 = 0.05;

/// Default mouth proportion for the strong happy rule
pub const DEFAULT_MOUTH_THRESH: f64 = 0.18;

/// Default maximum eye proportion for the strong happy rule
pub const DEFAULT_EYES_THRESH: f64 = 0.20;

/// Default brow proportion for the sad rule
pub const DEFAULT_BROWS_THRESH: f64 = 0.12;

/// Region-rule classifier thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub mouth_thresh: f64,
    pub eyes_thresh: f64,
    pub brows_thresh: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            mouth_thresh: DEFAULT_MOUTH_THRESH,
            eyes_thresh: DEFAULT_EYES_THRESH,
            brows_thresh: DEFAULT_BROWS_THRESH,
        }
    }
}

impl ClassifierConfig {
    pub fn with_mouth_thresh(mut self, value: f64) -> Self {
        self.mouth_thresh = value;
        self
    }

    pub fn with_eyes_thresh(mut self, value: f64) -> Self {
        self.eyes_thresh = value;
        self
    }

    pub fn with_brows_thresh(mut self, value: f64) -> Self {
        self.brows_thresh = value;
        self
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        for (name, value) in [
            ("mouth_thresh", self.mouth_thresh),
            ("eyes_thresh", self.eyes_thresh),
            ("brows_thresh", self.brows_thresh),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(AnalysisError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Vertical banding used to assign regions when the landmark count has no
/// fixed index table.
///
/// Band edges are fractions of bounding-box height measured from the top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandingScheme {
    /// brows below 33%, eyes 33% to 66%, mouth from 66%
    Thirds,
    /// brows below 33%, eyes 33% to 60%, mouth from 60%
    #[default]
    LowerFace,
}

impl BandingScheme {
    /// `(brow_edge, mouth_edge)` as fractions of height
    pub fn edges(&self) -> (f64, f64) {
        match self {
            BandingScheme::Thirds => (0.33, 0.66),
            BandingScheme::LowerFace => (0.33, 0.60),
        }
    }
}

/// Full pipeline configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Change threshold: a fraction of face scale when <= 1.0, pixels otherwise
    pub threshold: f64,
    pub banding: BandingScheme,
    pub classifier: ClassifierConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            banding: BandingScheme::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_banding(mut self, banding: BandingScheme) -> Self {
        self.banding = banding;
        self
    }

    pub fn with_classifier(mut self, classifier: ClassifierConfig) -> Self {
        self.classifier = classifier;
        self
    }

    /// Parse and validate a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self, AnalysisError> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, AnalysisError> {
        serde_json::to_string_pretty(self).map_err(AnalysisError::JsonError)
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(AnalysisError::InvalidConfig(format!(
                "threshold must be positive, got {}",
                self.threshold
            )));
        }
        self.classifier.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = PipelineConfig::from_json(r#"{"classifier": {"mouth_thresh": 0.3}}"#).unwrap();
        assert_eq!(config.threshold, DEFAULT_THRESHOLD);
        assert_eq!(config.banding, BandingScheme::LowerFace);
        assert_eq!(config.classifier.mouth_thresh, 0.3);
        assert_eq!(config.classifier.eyes_thresh, DEFAULT_EYES_THRESH);
    }

    #[test]
    fn test_config_round_trip() {
        let config = PipelineConfig::default()
            .with_threshold(2.0)
            .with_banding(BandingScheme::Thirds);
        let json = config.to_json().unwrap();
        assert_eq!(PipelineConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_rejects_non_positive_threshold() {
        assert!(PipelineConfig::from_json(r#"{"threshold": 0.0}"#).is_err());
        assert!(PipelineConfig::default().with_threshold(-1.0).validate().is_err());
    }

    #[test]
    fn test_rejects_negative_region_threshold() {
        let config = ClassifierConfig::default().with_brows_thresh(-0.1);
        assert!(matches!(
            config.validate(),
            Err(AnalysisError::InvalidConfig(_))
        ));
    }
}
