//! Component scores, overall score and grade.
//!
//! Every function here is total: absent inputs take their defaults, results
//! are clamped to [0, 100], and nothing returns an error.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{QualityThresholds, QualityWeights, ScoringConfig};
use crate::recommend::Priority;
use crate::stats::{AnalysisResults, AnnotationStats, CompletenessStats, ImageStats};

// defaults for absent statistics
const DEFAULT_RESOLUTION_SCORE: f64 = 80.0;
const DEFAULT_SHARPNESS: f64 = 50.0;
const DEFAULT_BRIGHTNESS: f64 = 128.0;
const DEFAULT_CONTRAST: f64 = 50.0;
const DEFAULT_CLASS_BALANCE: f64 = 70.0;
const DEFAULT_BBOX_QUALITY: f64 = 80.0;
const DEFAULT_ANNOTATION_CONSISTENCY: f64 = 85.0;
const DEFAULT_COMPLETENESS: f64 = 80.0;
const DEFAULT_RESOLUTION_DIVERSITY: f64 = 70.0;
const DEFAULT_COLOR_DIVERSITY: f64 = 80.0;
const DEFAULT_NUM_CLASSES: u64 = 1;
const DEFAULT_BBOX_SIZE_DIVERSITY: f64 = 75.0;
const DEFAULT_BBOX_CONSISTENCY: f64 = 80.0;

const IDEAL_BRIGHTNESS: f64 = 128.0;
const LOW_QUALITY_TOLERANCE: f64 = 0.1;
const CORRUPTION_PENALTY: f64 = 30.0;
const IMPROVEMENT_THRESHOLD: f64 = 70.0;
const REALISTIC_GAIN: f64 = 0.7;

/// NaN counts as 0 so that a clamped score is always a real number.
pub fn clamp_score(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 100.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    #[default]
    D,
}

impl Grade {
    /// Fixed tiers, lower bound inclusive: 90 A, 75 B, 60 C.
    pub fn from_score(score: f64) -> Self {
        Self::with_thresholds(score, &QualityThresholds::default())
    }

    pub fn with_thresholds(score: f64, t: &QualityThresholds) -> Self {
        if score >= t.excellent {
            Grade::A
        } else if score >= t.good {
            Grade::B
        } else if score >= t.fair {
            Grade::C
        } else {
            Grade::D
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityLevel {
    Excellent,
    Good,
    Fair,
    Poor,
    #[serde(rename = "Very Poor")]
    VeryPoor,
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QualityLevel::Excellent => "Excellent",
            QualityLevel::Good => "Good",
            QualityLevel::Fair => "Fair",
            QualityLevel::Poor => "Poor",
            QualityLevel::VeryPoor => "Very Poor",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    ImageQuality,
    AnnotationQuality,
    Completeness,
    Diversity,
    Consistency,
}

impl Component {
    pub const ALL: [Component; 5] = [
        Component::ImageQuality,
        Component::AnnotationQuality,
        Component::Completeness,
        Component::Diversity,
        Component::Consistency,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Component::ImageQuality => "Image Quality",
            Component::AnnotationQuality => "Annotation Quality",
            Component::Completeness => "Completeness",
            Component::Diversity => "Diversity",
            Component::Consistency => "Consistency",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub image_quality: f64,
    pub annotation_quality: f64,
    pub completeness: f64,
    pub diversity: f64,
    pub consistency: f64,
}

impl ComponentScores {
    pub fn get(&self, c: Component) -> f64 {
        match c {
            Component::ImageQuality => self.image_quality,
            Component::AnnotationQuality => self.annotation_quality,
            Component::Completeness => self.completeness,
            Component::Diversity => self.diversity,
            Component::Consistency => self.consistency,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Component, f64)> + '_ {
        Component::ALL.into_iter().map(|c| (c, self.get(c)))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailedScores {
    pub image_resolution: f64,
    pub image_sharpness: f64,
    pub image_brightness: f64,
    pub image_contrast: f64,
    pub class_balance: f64,
    pub bbox_quality: f64,
    pub annotation_accuracy: f64,
    pub file_matching: f64,
    pub file_integrity: f64,
    pub directory_structure: f64,
    pub naming_convention: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityScores {
    pub components: ComponentScores,
    pub overall_score: f64,
    pub grade: Grade,
    pub detailed: DetailedScores,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImprovementArea {
    pub component: Component,
    pub score: f64,
    pub priority: Priority,
}

#[derive(Clone, Debug)]
pub struct QualityScorer {
    config: ScoringConfig,
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

impl QualityScorer {
    /// Weights are normalized here, once.
    pub fn new(mut config: ScoringConfig) -> Self {
        config.weights = config.weights.normalized();
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn weights(&self) -> &QualityWeights {
        &self.config.weights
    }

    pub fn calculate_quality_score(&self, analysis: &AnalysisResults) -> QualityScores {
        let components = ComponentScores {
            image_quality: self.score_image_quality(&analysis.image),
            annotation_quality: self.score_annotation_quality(&analysis.annotation),
            completeness: self.score_completeness(&analysis.completeness),
            diversity: self.score_diversity(&analysis.image, &analysis.annotation),
            consistency: self.score_consistency(&analysis.image, &analysis.annotation),
        };
        let overall_score = self.combine(&components);
        let grade = self.calculate_grade(overall_score);
        debug!(overall = overall_score, %grade, "scored dataset");

        QualityScores {
            components,
            overall_score,
            grade,
            detailed: self.detailed_scores(analysis),
        }
    }

    pub fn score_image_quality(&self, s: &ImageStats) -> f64 {
        let resolution = s.resolution_score.unwrap_or(DEFAULT_RESOLUTION_SCORE);
        let sharpness = normalize_positive(s.average_sharpness.unwrap_or(DEFAULT_SHARPNESS));
        let brightness = normalize_brightness(s.average_brightness.unwrap_or(DEFAULT_BRIGHTNESS));
        let contrast = normalize_positive(s.average_contrast.unwrap_or(DEFAULT_CONTRAST));

        let mut score = resolution * 0.3 + sharpness * 0.25 + brightness * 0.25 + contrast * 0.2;

        let corrupted = s.corrupted_images_ratio.unwrap_or(0.0);
        if corrupted > 0.0 {
            score -= corrupted * self.config.penalties.corrupted_files;
        }
        let low_quality = s.low_quality_ratio.unwrap_or(0.0);
        if low_quality > LOW_QUALITY_TOLERANCE {
            score -= (low_quality - LOW_QUALITY_TOLERANCE) * 50.0;
        }
        clamp_score(score)
    }

    pub fn score_annotation_quality(&self, s: &AnnotationStats) -> f64 {
        let balance = s.class_balance_score.unwrap_or(DEFAULT_CLASS_BALANCE);
        let bbox = s.bbox_quality_score.unwrap_or(DEFAULT_BBOX_QUALITY);
        let consistency = s
            .annotation_consistency_score
            .unwrap_or(DEFAULT_ANNOTATION_CONSISTENCY);

        let mut score = balance * 0.4 + bbox * 0.35 + consistency * 0.25;

        let missing = s.missing_annotations_ratio.unwrap_or(0.0);
        if missing > 0.0 {
            score -= missing * self.config.penalties.missing_files;
        }
        let invalid = s.invalid_annotations_ratio.unwrap_or(0.0);
        if invalid > 0.0 {
            score -= invalid * self.config.penalties.inconsistent_annotations;
        }
        if s.has_rich_annotations.unwrap_or(false) {
            score += self.config.bonuses.rich_annotations;
        }
        clamp_score(score)
    }

    pub fn score_completeness(&self, s: &CompletenessStats) -> f64 {
        let mut score = s.completeness_score.unwrap_or(DEFAULT_COMPLETENESS);

        let matching = s.matching_ratio.unwrap_or(1.0);
        if matching < 1.0 {
            score *= matching;
        }

        let total = s.total_files();
        if total > 0 {
            score -= s.corrupted_files() as f64 / total as f64 * CORRUPTION_PENALTY;
        }
        clamp_score(score)
    }

    pub fn score_diversity(&self, img: &ImageStats, ann: &AnnotationStats) -> f64 {
        let resolution = img
            .resolution_diversity_score
            .unwrap_or(DEFAULT_RESOLUTION_DIVERSITY);
        let color = img.color_diversity_score.unwrap_or(DEFAULT_COLOR_DIVERSITY);
        let classes = ann.num_classes.unwrap_or(DEFAULT_NUM_CLASSES);
        let class_diversity = (classes as f64 / 10.0 * 100.0).min(100.0);
        let bbox_size = ann
            .bbox_size_diversity_score
            .unwrap_or(DEFAULT_BBOX_SIZE_DIVERSITY);

        let mut score = resolution * 0.25 + color * 0.25 + class_diversity * 0.3 + bbox_size * 0.2;

        if classes < 3 {
            score -= (3 - classes) as f64 * 15.0;
        }
        if score > 85.0 {
            score += self.config.bonuses.high_diversity;
        }
        clamp_score(score)
    }

    pub fn score_consistency(&self, img: &ImageStats, ann: &AnnotationStats) -> f64 {
        let quality_std = img.quality_standard_deviation.unwrap_or(0.0);
        let quality = if quality_std > 0.0 {
            (100.0 - quality_std * 2.0).max(0.0)
        } else {
            80.0
        };

        let resolution_std = img.resolution_standard_deviation.unwrap_or(0.0);
        let resolution = if resolution_std > 0.0 {
            (100.0 - resolution_std / 100.0).max(0.0)
        } else {
            80.0
        };

        let annotation = ann
            .annotation_consistency_score
            .unwrap_or(DEFAULT_ANNOTATION_CONSISTENCY);
        let bbox = ann.bbox_consistency_score.unwrap_or(DEFAULT_BBOX_CONSISTENCY);

        let mut score = quality * 0.3 + resolution * 0.25 + annotation * 0.25 + bbox * 0.2;
        if score > 90.0 {
            score += self.config.bonuses.consistent_quality;
        }
        clamp_score(score)
    }

    /// Weighted sum over clamped components.
    pub fn combine(&self, c: &ComponentScores) -> f64 {
        let w = &self.config.weights;
        clamp_score(
            clamp_score(c.image_quality) * w.image_quality
                + clamp_score(c.annotation_quality) * w.annotation_quality
                + clamp_score(c.completeness) * w.completeness
                + clamp_score(c.diversity) * w.diversity
                + clamp_score(c.consistency) * w.consistency,
        )
    }

    pub fn calculate_grade(&self, score: f64) -> Grade {
        Grade::with_thresholds(score, &self.config.thresholds)
    }

    pub fn quality_level(&self, score: f64) -> QualityLevel {
        let t = &self.config.thresholds;
        if score >= t.excellent {
            QualityLevel::Excellent
        } else if score >= t.good {
            QualityLevel::Good
        } else if score >= t.fair {
            QualityLevel::Fair
        } else if score >= t.poor {
            QualityLevel::Poor
        } else {
            QualityLevel::VeryPoor
        }
    }

    pub fn detailed_scores(&self, analysis: &AnalysisResults) -> DetailedScores {
        let img = &analysis.image;
        let ann = &analysis.annotation;
        let comp = &analysis.completeness;

        DetailedScores {
            image_resolution: img.resolution_score.unwrap_or(DEFAULT_RESOLUTION_SCORE),
            image_sharpness: clamp_score(img.average_sharpness.unwrap_or(DEFAULT_SHARPNESS)),
            image_brightness: normalize_brightness(
                img.average_brightness.unwrap_or(DEFAULT_BRIGHTNESS),
            ),
            image_contrast: clamp_score(img.average_contrast.unwrap_or(DEFAULT_CONTRAST)),
            class_balance: ann.class_balance_score.unwrap_or(DEFAULT_CLASS_BALANCE),
            bbox_quality: ann.bbox_quality_score.unwrap_or(DEFAULT_BBOX_QUALITY),
            annotation_accuracy: ann
                .annotation_consistency_score
                .unwrap_or(DEFAULT_ANNOTATION_CONSISTENCY),
            file_matching: comp.matching_ratio.unwrap_or(1.0) * 100.0,
            file_integrity: file_integrity(comp),
            directory_structure: comp.directory_structure_score.unwrap_or(100.0),
            naming_convention: comp.naming_score.unwrap_or(100.0),
        }
    }

    /// Components below 70, lowest first.
    pub fn identify_improvement_areas(&self, c: &ComponentScores) -> Vec<ImprovementArea> {
        let mut areas: Vec<ImprovementArea> = c
            .iter()
            .filter(|(_, score)| *score < IMPROVEMENT_THRESHOLD)
            .map(|(component, score)| ImprovementArea {
                component,
                score,
                priority: if score < 50.0 {
                    Priority::High
                } else if score < 60.0 {
                    Priority::Medium
                } else {
                    Priority::Low
                },
            })
            .collect();
        areas.sort_by(|a, b| a.score.total_cmp(&b.score));
        areas
    }

    /// Realistic headroom per component: 70% of the distance to 100.
    pub fn improvement_potential(&self, c: &ComponentScores) -> Vec<(Component, f64)> {
        c.iter()
            .map(|(component, score)| (component, (100.0 - score) * REALISTIC_GAIN))
            .collect()
    }

    pub fn score_summary(&self, scores: &QualityScores) -> String {
        let c = &scores.components;
        let mut out = vec![
            format!(
                "OVERALL QUALITY SCORE: {:.1}/100 (Grade: {})",
                scores.overall_score, scores.grade
            ),
            format!("QUALITY LEVEL: {}", self.quality_level(scores.overall_score)),
            String::new(),
            "COMPONENT BREAKDOWN:".to_string(),
        ];
        for (component, score) in c.iter() {
            out.push(format!("   {:<20}{:>5.1}/100", format!("{component}:"), score));
        }

        let areas = self.identify_improvement_areas(c);
        if !areas.is_empty() {
            out.push(String::new());
            out.push("AREAS FOR IMPROVEMENT:".to_string());
            for a in areas.iter().take(3) {
                out.push(format!(
                    "   - {}: {:.1}/100 (Priority: {})",
                    a.component, a.score, a.priority
                ));
            }
        }
        out.join("\n")
    }
}

/// Values on a 0..100 scale; non-positive means "not measured".
fn normalize_positive(v: f64) -> f64 {
    if v > 0.0 {
        v.min(100.0)
    } else {
        50.0
    }
}

fn normalize_brightness(b: f64) -> f64 {
    (100.0 - (b - IDEAL_BRIGHTNESS).abs() / IDEAL_BRIGHTNESS * 100.0).max(0.0)
}

fn file_integrity(c: &CompletenessStats) -> f64 {
    let total = c.total_files();
    if total == 0 {
        return 100.0;
    }
    clamp_score((1.0 - c.corrupted_files() as f64 / total as f64) * 100.0)
}
