//! Full assessment: scores, issues and recommendations in one record.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{MinimumRequirements, RecommendationConfig, ScoringConfig};
use crate::recommend::{RecommendationEngine, RecommendationSet};
use crate::scorer::{Grade, QualityScorer, QualityScores};
use crate::stats::AnalysisResults;

/// Snapshot of one assessment. Serializable for later comparison.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub overall_score: f64,
    pub image_quality_score: f64,
    pub annotation_quality_score: f64,
    pub completeness_score: f64,
    pub diversity_score: f64,
    pub consistency_score: f64,

    pub total_images: u64,
    pub total_annotations: u64,
    pub num_classes: u64,
    pub class_balance_score: f64,
    pub image_resolution_score: f64,
    pub annotation_accuracy_score: f64,

    pub issues_found: Vec<String>,
    pub recommendations: Vec<String>,
    pub dataset_grade: Grade,
}

/// What `QualityAssessor::evaluate` produces; `metrics` is the persisted part.
#[derive(Clone, Debug)]
pub struct Assessment {
    pub scores: QualityScores,
    pub recommendations: RecommendationSet,
    pub metrics: QualityMetrics,
}

#[derive(Clone, Debug, Default)]
pub struct QualityAssessor {
    scorer: QualityScorer,
    engine: RecommendationEngine,
    requirements: MinimumRequirements,
}

impl QualityAssessor {
    pub fn new(
        scoring: ScoringConfig,
        recommendations: RecommendationConfig,
        requirements: MinimumRequirements,
    ) -> Self {
        Self {
            scorer: QualityScorer::new(scoring),
            engine: RecommendationEngine::new(recommendations),
            requirements,
        }
    }

    pub fn scorer(&self) -> &QualityScorer {
        &self.scorer
    }

    pub fn engine(&self) -> &RecommendationEngine {
        &self.engine
    }

    pub fn assess(&self, analysis: &AnalysisResults) -> QualityMetrics {
        self.evaluate(analysis).metrics
    }

    pub fn evaluate(&self, analysis: &AnalysisResults) -> Assessment {
        let scores = self.scorer.calculate_quality_score(analysis);
        let issues = self.identify_issues(analysis);
        let recommendations = self.engine.generate(analysis, &scores, &issues);

        let c = &scores.components;
        let metrics = QualityMetrics {
            overall_score: scores.overall_score,
            image_quality_score: c.image_quality,
            annotation_quality_score: c.annotation_quality,
            completeness_score: c.completeness,
            diversity_score: c.diversity,
            consistency_score: c.consistency,
            total_images: analysis.completeness.total_images,
            total_annotations: analysis.completeness.total_annotations,
            num_classes: analysis.annotation.num_classes.unwrap_or(0),
            class_balance_score: scores.detailed.class_balance,
            image_resolution_score: scores.detailed.image_resolution,
            annotation_accuracy_score: scores.detailed.annotation_accuracy,
            issues_found: issues,
            recommendations: recommendations.formatted(),
            dataset_grade: scores.grade,
        };

        info!(
            overall = metrics.overall_score,
            grade = %metrics.dataset_grade,
            issues = metrics.issues_found.len(),
            "quality assessment complete"
        );

        Assessment {
            scores,
            recommendations,
            metrics,
        }
    }

    pub fn identify_issues(&self, analysis: &AnalysisResults) -> Vec<String> {
        let comp = &analysis.completeness;
        let img = &analysis.image;
        let ann = &analysis.annotation;
        let mut issues = Vec::new();

        if !comp.missing_images.is_empty() {
            issues.push(format!("{} missing image(s) detected", comp.missing_images.len()));
        }
        if !comp.missing_annotations.is_empty() {
            issues.push(format!(
                "{} missing annotation(s) detected",
                comp.missing_annotations.len()
            ));
        }
        if !comp.corrupted_images.is_empty() {
            issues.push(format!(
                "{} corrupted image(s) detected",
                comp.corrupted_images.len()
            ));
        }
        if !comp.corrupted_annotations.is_empty() {
            issues.push(format!(
                "{} corrupted annotation(s) detected",
                comp.corrupted_annotations.len()
            ));
        }

        let low_res = img.low_resolution_ratio.unwrap_or(0.0);
        if low_res > 0.1 {
            issues.push(format!("{:.1}% of images are low resolution", low_res * 100.0));
        }
        let low_quality = img.low_quality_ratio.unwrap_or(0.0);
        if low_quality > 0.1 {
            issues.push(format!("{:.1}% of images are low quality", low_quality * 100.0));
        }

        let imbalance = ann.class_imbalance_ratio.unwrap_or(0.0);
        if imbalance > 0.8 {
            issues.push(format!("high class imbalance: {:.1}%", imbalance * 100.0));
        }
        let invalid = ann.invalid_bbox_ratio.unwrap_or(0.0);
        if invalid > 0.05 {
            issues.push(format!("invalid bounding box ratio: {:.1}%", invalid * 100.0));
        }

        issues.extend(self.validate_minimum_requirements(analysis));
        issues
    }

    /// Unmet requirements; empty when the dataset passes.
    pub fn validate_minimum_requirements(&self, analysis: &AnalysisResults) -> Vec<String> {
        let req = &self.requirements;
        let mut unmet = Vec::new();

        let total = analysis.completeness.total_images;
        if total < req.min_total_images {
            unmet.push(format!(
                "not enough images: {total} < {}",
                req.min_total_images
            ));
        }

        for (class, count) in &analysis.annotation.class_counts {
            if *count < req.min_images_per_class {
                unmet.push(format!(
                    "not enough samples for class '{class}': {count} < {}",
                    req.min_images_per_class
                ));
            }
        }

        if let Some(res) = analysis.image.average_resolution {
            if res < req.min_resolution {
                unmet.push(format!(
                    "average resolution too low: {res:.0} < {:.0}",
                    req.min_resolution
                ));
            }
        }

        let imbalance = analysis.annotation.class_imbalance_ratio.unwrap_or(0.0);
        if imbalance > req.max_class_imbalance {
            unmet.push(format!(
                "class imbalance too high: {imbalance:.2} > {:.2}",
                req.max_class_imbalance
            ));
        }
        unmet
    }

    pub fn meets_minimum_requirements(&self, analysis: &AnalysisResults) -> bool {
        self.validate_minimum_requirements(analysis).is_empty()
    }
}
