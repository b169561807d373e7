//! Dataset quality scoring.
//!
//! Turns image, annotation and completeness statistics into five component
//! scores, a weighted overall score and a letter grade, then derives issues
//! and prioritized recommendations from the same inputs. Nothing in this
//! crate performs I/O or returns an error.

pub mod assessor;
pub mod compare;
pub mod config;
pub mod recommend;
pub mod scorer;
pub mod stats;

pub use assessor::{Assessment, QualityAssessor, QualityMetrics};
pub use compare::{
    compare_assessments, compare_with_baseline, quality_trend, quick_score, AssessmentDiff,
    BaselineComparison, QualityTrend, TrendDirection,
};
pub use config::{
    Bonuses, CategoryWeights, MinimumRequirements, Penalties, PriorityThresholds,
    QualityThresholds, QualityWeights, RecommendationConfig, ScoringConfig,
};
pub use recommend::{
    Category, Difficulty, Effort, Priority, Recommendation, RecommendationEngine,
    RecommendationExport, RecommendationSet, Roadmap,
};
pub use scorer::{
    clamp_score, Component, ComponentScores, DetailedScores, Grade, ImprovementArea, QualityLevel,
    QualityScorer, QualityScores,
};
pub use stats::{AnalysisResults, AnnotationStats, CompletenessStats, ImageStats};
