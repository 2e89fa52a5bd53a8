use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Region of interest around the detected subject, in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// The most recent classifier output.
///
/// An empty score map means no subject was detected on the last sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionSnapshot {
    #[serde(default)]
    pub label_scores: HashMap<String, f64>,
    #[serde(default)]
    pub region: Option<Region>,
}

impl DetectionSnapshot {
    pub fn new(label_scores: HashMap<String, f64>, region: Option<Region>) -> Self {
        Self {
            label_scores,
            region,
        }
    }

    /// Confidence for `label` in `0.0..=1.0`; absent labels score zero.
    pub fn score(&self, label: &str) -> f64 {
        self.label_scores
            .get(label)
            .copied()
            .unwrap_or(0.0)
            .clamp(0.0, 1.0)
    }

    pub fn subject_present(&self) -> bool {
        !self.label_scores.is_empty()
    }

    /// Highest-scoring label, ties broken by name so the result is stable.
    pub fn dominant_label(&self) -> Option<(&str, f64)> {
        self.label_scores
            .iter()
            .max_by(|(a_label, a), (b_label, b)| {
                a.total_cmp(b).then_with(|| b_label.cmp(a_label))
            })
            .map(|(label, score)| (label.as_str(), *score))
    }
}
