//! Tunables for scoring, recommendations and minimum requirements.
//!
//! All sections deserialize with `#[serde(default)]`, so a config file only
//! needs the keys it overrides.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub image_quality: f64,
    pub annotation_quality: f64,
    pub completeness: f64,
    pub diversity: f64,
    pub consistency: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            image_quality: 0.25,
            annotation_quality: 0.25,
            completeness: 0.20,
            diversity: 0.15,
            consistency: 0.15,
        }
    }
}

impl QualityWeights {
    pub fn sum(&self) -> f64 {
        self.image_quality
            + self.annotation_quality
            + self.completeness
            + self.diversity
            + self.consistency
    }

    /// Rescale so the weights sum to 1. Negative or non-finite weights count
    /// as zero; if nothing positive is left the defaults are used.
    pub fn normalized(&self) -> Self {
        let clean = |w: f64| if w.is_finite() && w > 0.0 { w } else { 0.0 };
        let w = Self {
            image_quality: clean(self.image_quality),
            annotation_quality: clean(self.annotation_quality),
            completeness: clean(self.completeness),
            diversity: clean(self.diversity),
            consistency: clean(self.consistency),
        };
        let total = w.sum();
        if total <= 0.0 {
            return Self::default().normalized();
        }
        Self {
            image_quality: w.image_quality / total,
            annotation_quality: w.annotation_quality / total,
            completeness: w.completeness / total,
            diversity: w.diversity / total,
            consistency: w.consistency / total,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub excellent: f64,
    pub good: f64,
    pub fair: f64,
    pub poor: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            excellent: 90.0,
            good: 75.0,
            fair: 60.0,
            poor: 40.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Penalties {
    pub missing_files: f64,
    pub corrupted_files: f64,
    pub low_resolution: f64,
    pub class_imbalance: f64,
    pub inconsistent_annotations: f64,
}

impl Default for Penalties {
    fn default() -> Self {
        Self {
            missing_files: 30.0,
            corrupted_files: 20.0,
            low_resolution: 15.0,
            class_imbalance: 25.0,
            inconsistent_annotations: 20.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bonuses {
    pub high_diversity: f64,
    pub consistent_quality: f64,
    pub rich_annotations: f64,
}

impl Default for Bonuses {
    fn default() -> Self {
        Self {
            high_diversity: 10.0,
            consistent_quality: 5.0,
            rich_annotations: 8.0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: QualityWeights,
    pub thresholds: QualityThresholds,
    pub penalties: Penalties,
    pub bonuses: Bonuses,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityThresholds {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for PriorityThresholds {
    fn default() -> Self {
        Self {
            high: 50.0,
            medium: 70.0,
            low: 85.0,
        }
    }
}

/// Multiplier applied to a component score before it is compared against
/// the priority thresholds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryWeights {
    pub completeness: f64,
    pub image_quality: f64,
    pub annotation_quality: f64,
    pub diversity: f64,
    pub consistency: f64,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            completeness: 1.2,
            image_quality: 1.1,
            annotation_quality: 1.1,
            diversity: 1.0,
            consistency: 0.9,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    pub priority_thresholds: PriorityThresholds,
    pub category_weights: CategoryWeights,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinimumRequirements {
    pub min_images_per_class: u64,
    pub min_total_images: u64,
    pub min_resolution: f64,
    pub max_class_imbalance: f64,
}

impl Default for MinimumRequirements {
    fn default() -> Self {
        Self {
            min_images_per_class: 50,
            min_total_images: 500,
            min_resolution: 224.0,
            max_class_imbalance: 0.8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_normalize_sums_to_one() {
        for w in [
            QualityWeights::default(),
            QualityWeights {
                image_quality: 2.0,
                annotation_quality: 2.0,
                completeness: 1.0,
                diversity: 3.0,
                consistency: 2.0,
            },
            QualityWeights {
                image_quality: 0.01,
                annotation_quality: 0.0,
                completeness: 0.0,
                diversity: 0.0,
                consistency: 0.0,
            },
        ] {
            assert_relative_eq!(w.normalized().sum(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_normalize_keeps_proportions() {
        let w = QualityWeights {
            image_quality: 5.0,
            annotation_quality: 5.0,
            completeness: 0.0,
            diversity: 0.0,
            consistency: 0.0,
        }
        .normalized();
        assert_relative_eq!(w.image_quality, 0.5);
        assert_relative_eq!(w.annotation_quality, 0.5);
        assert_eq!(w.completeness, 0.0);
    }

    #[test]
    fn test_degenerate_weights_fall_back_to_defaults() {
        let w = QualityWeights {
            image_quality: -1.0,
            annotation_quality: 0.0,
            completeness: f64::NAN,
            diversity: 0.0,
            consistency: 0.0,
        }
        .normalized();
        assert_eq!(w, QualityWeights::default().normalized());
        assert_relative_eq!(w.sum(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let cfg: ScoringConfig =
            serde_json::from_str(r#"{ "weights": { "diversity": 0.5 }, "bonuses": {} }"#).unwrap();
        assert_eq!(cfg.weights.diversity, 0.5);
        assert_eq!(cfg.weights.image_quality, 0.25);
        assert_eq!(cfg.penalties, Penalties::default());
    }
}
