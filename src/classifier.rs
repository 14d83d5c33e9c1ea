//! Region-rule classifier
//!
//! Maps per-region change statistics to a coarse emotion label with an
//! ordered list of heuristic rules. The first matching rule wins:
//!
//! 1. Strong happy: mouth changed a lot, eyes mostly still
//! 2. Concentrated happy: the largest displacements sit in the mouth
//! 3. Sad: brows moved while the mouth stayed still
//! 4. Neutral: nothing changed in any region
//! 5. Reject: too much of the whole face changed to trust a localized read
//! 6. Neutral otherwise

use crate::config::ClassifierConfig;
use crate::difference::top_k_indices;
use crate::types::{ClassifierInput, Label, Region};

/// Number of largest displacements inspected by the concentration rule
pub const TOP_K: usize = 10;

/// Share of the top-K that must lie in the mouth
pub const TOP_K_MOUTH_SHARE: f64 = 0.6;

/// Minimum mouth proportion for the concentration rule
pub const TOP_K_MIN_MOUTH: f64 = 0.08;

/// Maximum mouth proportion for the sad rule
pub const SAD_MAX_MOUTH: f64 = 0.1;

/// Absolute floor of the noise rule
pub const NOISE_MIN_ONES: f64 = 50.0;

/// Fraction of the vector length above which changes count as noise
pub const NOISE_FRACTION: f64 = 0.5;

/// Rule-based classifier over region statistics
#[derive(Debug, Clone, Default)]
pub struct RegionClassifier {
    config: ClassifierConfig,
}

impl RegionClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify region statistics into a label
    pub fn classify(&self, input: &ClassifierInput) -> Label {
        let stats = &input.stats;
        let mouth = stats.proportion(Region::Mouth);
        let eyes = stats.proportion(Region::Eyes);
        let brows = stats.proportion(Region::Brows);

        if mouth >= self.config.mouth_thresh && eyes <= self.config.eyes_thresh {
            return Label::Happy;
        }

        if let Some(share) = mouth_top_k_share(input) {
            if share >= TOP_K_MOUTH_SHARE && mouth >= TOP_K_MIN_MOUTH {
                return Label::Happy;
            }
        }

        if brows >= self.config.brows_thresh && mouth <= SAD_MAX_MOUTH {
            return Label::Sad;
        }

        let total_changed = stats.total_changed();
        if total_changed == 0 {
            return Label::Neutral;
        }

        let (total_ones, length) = match &input.binary {
            Some(binary) => (binary.iter().filter(|&&b| b == 1).count(), binary.len()),
            None => (total_changed, stats.total_size()),
        };
        if total_ones as f64 > NOISE_MIN_ONES.max(NOISE_FRACTION * length as f64) {
            tracing::debug!(total_ones, length, "change noise floor exceeded");
            return Label::Reject;
        }

        Label::Neutral
    }
}

/// Fraction of the top-K displaced landmarks inside the mouth, when
/// magnitudes and mouth indices are available and K > 0
fn mouth_top_k_share(input: &ClassifierInput) -> Option<f64> {
    let displacements = input.displacements.as_ref()?;
    let mouth = input.mouth_indices.as_ref()?;

    let k = TOP_K.min(displacements.len());
    if k == 0 {
        return None;
    }

    let in_mouth = top_k_indices(displacements, k)
        .into_iter()
        .filter(|i| mouth.contains(i))
        .count();
    Some(in_mouth as f64 / k as f64)
}
