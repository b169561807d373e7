//! Comparing assessments over time, plus the metadata-only quick score.

use serde::{Deserialize, Serialize};

use crate::assessor::QualityMetrics;
use crate::scorer::clamp_score;

/// Threshold, in score points, for reporting a change.
const NOTABLE_CHANGE: f64 = 5.0;
const TREND_SLOPE: f64 = 1.0;

/// `current - baseline` for every metric.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssessmentDiff {
    pub overall_score_diff: f64,
    pub image_quality_diff: f64,
    pub annotation_quality_diff: f64,
    pub completeness_diff: f64,
    pub diversity_diff: f64,
    pub consistency_diff: f64,
    pub images_diff: i64,
    pub annotations_diff: i64,
    pub classes_diff: i64,
}

impl AssessmentDiff {
    fn score_diffs(&self) -> [(&'static str, f64); 6] {
        [
            ("Overall Score", self.overall_score_diff),
            ("Image Quality", self.image_quality_diff),
            ("Annotation Quality", self.annotation_quality_diff),
            ("Completeness", self.completeness_diff),
            ("Diversity", self.diversity_diff),
            ("Consistency", self.consistency_diff),
        ]
    }
}

pub fn compare_assessments(baseline: &QualityMetrics, current: &QualityMetrics) -> AssessmentDiff {
    let count = |a: u64, b: u64| b as i64 - a as i64;
    AssessmentDiff {
        overall_score_diff: current.overall_score - baseline.overall_score,
        image_quality_diff: current.image_quality_score - baseline.image_quality_score,
        annotation_quality_diff: current.annotation_quality_score
            - baseline.annotation_quality_score,
        completeness_diff: current.completeness_score - baseline.completeness_score,
        diversity_diff: current.diversity_score - baseline.diversity_score,
        consistency_diff: current.consistency_score - baseline.consistency_score,
        images_diff: count(baseline.total_images, current.total_images),
        annotations_diff: count(baseline.total_annotations, current.total_annotations),
        classes_diff: count(baseline.num_classes, current.num_classes),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselineComparison {
    pub diff: AssessmentDiff,
    pub improvements: Vec<String>,
    pub deteriorations: Vec<String>,
    pub notes: Vec<String>,
}

pub fn compare_with_baseline(
    baseline: &QualityMetrics,
    current: &QualityMetrics,
) -> BaselineComparison {
    let diff = compare_assessments(baseline, current);
    let mut out = BaselineComparison::default();

    for (name, d) in diff.score_diffs() {
        if d > NOTABLE_CHANGE {
            out.improvements.push(format!("{name}: +{d:.1} points"));
        } else if d < -NOTABLE_CHANGE {
            out.deteriorations.push(format!("{name}: {d:.1} points"));
        }
    }

    if diff.overall_score_diff < 0.0 {
        out.notes
            .push("Overall quality dropped, review the deteriorated components".to_string());
    }
    if diff.images_diff > 0 {
        out.notes
            .push(format!("{} new image(s) added, run a quality check on them", diff.images_diff));
    }

    out.diff = diff;
    out
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QualityTrend {
    pub direction: TrendDirection,
    pub slope: f64,
    pub score_history: Vec<f64>,
    pub best_score: f64,
    pub worst_score: f64,
    pub average_score: f64,
    pub score_variance: f64, // population
}

/// Trend over assessments in chronological order. `None` for no history.
pub fn quality_trend(history: &[QualityMetrics]) -> Option<QualityTrend> {
    if history.is_empty() {
        return None;
    }
    let scores: Vec<f64> = history.iter().map(|m| m.overall_score).collect();
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;

    let (direction, slope) = if scores.len() < 2 {
        (TrendDirection::InsufficientData, 0.0)
    } else {
        let slope = least_squares_slope(&scores);
        let direction = if slope > TREND_SLOPE {
            TrendDirection::Improving
        } else if slope < -TREND_SLOPE {
            TrendDirection::Declining
        } else {
            TrendDirection::Stable
        };
        (direction, slope)
    };

    Some(QualityTrend {
        direction,
        slope,
        best_score: scores.iter().copied().fold(f64::MIN, f64::max),
        worst_score: scores.iter().copied().fold(f64::MAX, f64::min),
        average_score: mean,
        score_variance: variance,
        score_history: scores,
    })
}

/// Slope of y against x = 0, 1, 2, ...
fn least_squares_slope(ys: &[f64]) -> f64 {
    let n = ys.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = ys.iter().sum::<f64>() / n;
    let (mut num, mut den) = (0.0, 0.0);
    for (i, y) in ys.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Score from dataset size alone, without looking at any pixels.
pub fn quick_score(total_images: u64, total_annotations: u64, num_classes: u64) -> f64 {
    let mut score = 50.0;

    score += match total_images {
        n if n >= 1000 => 20.0,
        n if n >= 500 => 15.0,
        n if n >= 100 => 10.0,
        n if n >= 50 => 5.0,
        _ => 0.0,
    };

    if total_images > 0 {
        score += total_annotations.min(total_images) as f64 / total_images as f64 * 15.0;
    }

    score += match num_classes {
        n if n >= 10 => 10.0,
        n if n >= 5 => 8.0,
        n if n >= 3 => 5.0,
        n if n >= 2 => 3.0,
        _ => 0.0,
    };

    if total_images < 10 {
        score -= 30.0;
    } else if total_images < 50 {
        score -= 15.0;
    }

    clamp_score(score)
}
