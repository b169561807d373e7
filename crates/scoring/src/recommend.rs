//! Rule-based improvement suggestions.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RecommendationConfig;
use crate::scorer::QualityScores;
use crate::stats::{AnalysisResults, AnnotationStats, CompletenessStats, ImageStats};

const MIN_RESOLUTION: f64 = 224.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Higher is more urgent.
    pub fn severity(self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effort {
    Low,
    Medium,
    High,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Completeness,
    #[serde(rename = "Image Quality")]
    ImageQuality,
    #[serde(rename = "Annotation Quality")]
    AnnotationQuality,
    General,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::Completeness => "Completeness",
            Category::ImageQuality => "Image Quality",
            Category::AnnotationQuality => "Annotation Quality",
            Category::General => "General",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: Category,
    pub priority: Priority,
    pub issue: String,
    pub suggestion: String,
    pub expected_improvement: f64, // score points
    pub difficulty: Difficulty,
    pub estimated_effort: Effort,
}

impl Recommendation {
    /// `[Priority] Category: suggestion (+X.Y points)`; the suffix is
    /// dropped when no improvement is expected.
    pub fn formatted(&self) -> String {
        let suffix = if self.expected_improvement > 0.0 {
            format!(" (+{:.1} points)", self.expected_improvement)
        } else {
            String::new()
        };
        format!("[{}] {}: {}{}", self.priority, self.category, self.suggestion, suffix)
    }
}

fn by_urgency(a: &Recommendation, b: &Recommendation) -> Ordering {
    b.priority
        .severity()
        .cmp(&a.priority.severity())
        .then_with(|| b.expected_improvement.total_cmp(&a.expected_improvement))
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Roadmap {
    pub immediate_actions: Vec<String>,
    pub short_term_goals: Vec<String>,
    pub long_term_planning: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecommendationExport {
    pub structured_recommendations: Vec<Recommendation>,
    pub formatted_recommendations: Vec<String>,
    pub improvement_roadmap: Roadmap,
    pub total_recommendations: usize,
    pub high_priority_count: usize,
    pub medium_priority_count: usize,
    pub low_priority_count: usize,
}

/// Recommendations of one assessment, most urgent first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSet {
    items: Vec<Recommendation>,
}

impl RecommendationSet {
    pub fn new(mut items: Vec<Recommendation>) -> Self {
        // stable: equal keys keep rule order
        items.sort_by(by_urgency);
        Self { items }
    }

    pub fn items(&self) -> &[Recommendation] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn formatted(&self) -> Vec<String> {
        self.items.iter().map(Recommendation::formatted).collect()
    }

    pub fn roadmap(&self) -> Roadmap {
        let mut roadmap = Roadmap::default();
        for r in &self.items {
            let bucket = match (r.priority, r.difficulty) {
                (Priority::High, Difficulty::Easy) => &mut roadmap.immediate_actions,
                (Priority::High | Priority::Medium, _) | (_, Difficulty::Medium) => {
                    &mut roadmap.short_term_goals
                }
                _ => &mut roadmap.long_term_planning,
            };
            bucket.push(r.suggestion.clone());
        }
        roadmap
    }

    pub fn count(&self, priority: Priority) -> usize {
        self.items.iter().filter(|r| r.priority == priority).count()
    }

    pub fn export(&self) -> RecommendationExport {
        RecommendationExport {
            structured_recommendations: self.items.clone(),
            formatted_recommendations: self.formatted(),
            improvement_roadmap: self.roadmap(),
            total_recommendations: self.items.len(),
            high_priority_count: self.count(Priority::High),
            medium_priority_count: self.count(Priority::Medium),
            low_priority_count: self.count(Priority::Low),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RecommendationEngine {
    config: RecommendationConfig,
}

impl RecommendationEngine {
    pub fn new(config: RecommendationConfig) -> Self {
        Self { config }
    }

    /// `issues` are the findings of `QualityAssessor::identify_issues`; the
    /// ones no statistics rule covers (corrupted files, too few samples) get
    /// their own recommendations.
    pub fn generate(
        &self,
        analysis: &AnalysisResults,
        scores: &QualityScores,
        issues: &[String],
    ) -> RecommendationSet {
        let c = &scores.components;
        let mut out = Vec::new();
        self.completeness_rules(&analysis.completeness, c.completeness, &mut out);
        self.image_rules(&analysis.image, c.image_quality, &mut out);
        self.annotation_rules(&analysis.annotation, c.annotation_quality, &mut out);
        self.issue_rules(issues, c.completeness, &mut out);
        general_rules(scores.overall_score, &mut out);

        debug!(
            issues = issues.len(),
            recommendations = out.len(),
            "generated recommendations"
        );
        RecommendationSet::new(out)
    }

    /// Scale the component score by its category weight, then bucket it.
    pub fn determine_priority(&self, score: f64, category: Category) -> Priority {
        let w = &self.config.category_weights;
        let weight = match category {
            Category::Completeness => w.completeness,
            Category::ImageQuality => w.image_quality,
            Category::AnnotationQuality => w.annotation_quality,
            Category::General => 1.0,
        };
        let adjusted = score * weight;
        let t = &self.config.priority_thresholds;
        if adjusted < t.high {
            Priority::High
        } else if adjusted < t.medium {
            Priority::Medium
        } else {
            Priority::Low
        }
    }

    fn completeness_rules(&self, s: &CompletenessStats, score: f64, out: &mut Vec<Recommendation>) {
        if !s.missing_images.is_empty() {
            let n = s.missing_images.len();
            out.push(Recommendation {
                category: Category::Completeness,
                priority: self.determine_priority(score, Category::Completeness),
                issue: format!("{n} annotation file(s) without an image"),
                suggestion: "Restore the missing images or remove their orphaned annotation files"
                    .to_string(),
                expected_improvement: (n as f64 * 0.5).min(20.0),
                difficulty: Difficulty::Easy,
                estimated_effort: Effort::Low,
            });
        }
        if !s.missing_annotations.is_empty() {
            let n = s.missing_annotations.len();
            out.push(Recommendation {
                category: Category::Completeness,
                priority: self.determine_priority(score, Category::Completeness),
                issue: format!("{n} image(s) without an annotation file"),
                suggestion: "Create annotation files for the unlabelled images".to_string(),
                expected_improvement: (n as f64 * 0.3).min(15.0),
                difficulty: Difficulty::Medium,
                estimated_effort: Effort::Medium,
            });
        }
    }

    fn image_rules(&self, s: &ImageStats, score: f64, out: &mut Vec<Recommendation>) {
        if let Some(res) = s.average_resolution {
            if res < MIN_RESOLUTION {
                out.push(Recommendation {
                    category: Category::ImageQuality,
                    priority: self.determine_priority(score, Category::ImageQuality),
                    issue: format!("average resolution {res:.0}px is below {MIN_RESOLUTION:.0}px"),
                    suggestion: "Upscale or recapture images to at least 224x224 pixels"
                        .to_string(),
                    expected_improvement: 15.0,
                    difficulty: Difficulty::Medium,
                    estimated_effort: Effort::Medium,
                });
            }
        }

        let low_quality = s.low_quality_ratio.unwrap_or(0.0);
        if low_quality > 0.1 {
            out.push(Recommendation {
                category: Category::ImageQuality,
                priority: Priority::High,
                issue: format!("{:.1}% of images are low quality", low_quality * 100.0),
                suggestion: "Filter out blurry and damaged images".to_string(),
                expected_improvement: 20.0,
                difficulty: Difficulty::Medium,
                estimated_effort: Effort::High,
            });
        }
    }

    fn annotation_rules(&self, s: &AnnotationStats, score: f64, out: &mut Vec<Recommendation>) {
        let imbalance = s.class_imbalance_ratio.unwrap_or(0.0);
        if imbalance > 0.7 {
            out.push(Recommendation {
                category: Category::AnnotationQuality,
                priority: self.determine_priority(score, Category::AnnotationQuality),
                issue: format!("class imbalance is high ({:.1}%)", imbalance * 100.0),
                suggestion: "Collect more samples for under-represented classes".to_string(),
                expected_improvement: 25.0,
                difficulty: Difficulty::Hard,
                estimated_effort: Effort::High,
            });
        }

        let invalid = s.invalid_bbox_ratio.unwrap_or(0.0);
        if invalid > 0.05 {
            out.push(Recommendation {
                category: Category::AnnotationQuality,
                priority: Priority::High,
                issue: format!("{:.1}% of bounding boxes are invalid", invalid * 100.0),
                suggestion: "Review and fix the annotation files with invalid boxes".to_string(),
                expected_improvement: 18.0,
                difficulty: Difficulty::Medium,
                estimated_effort: Effort::Medium,
            });
        }
    }
}

impl RecommendationEngine {
    fn issue_rules(&self, issues: &[String], completeness: f64, out: &mut Vec<Recommendation>) {
        let corrupted = issues.iter().filter(|i| i.contains("corrupted")).count();
        if corrupted > 0 {
            out.push(Recommendation {
                category: Category::Completeness,
                priority: self.determine_priority(completeness, Category::Completeness),
                issue: format!("{corrupted} kind(s) of corrupted files found"),
                suggestion: "Repair or remove the corrupted images and annotation files"
                    .to_string(),
                expected_improvement: 10.0,
                difficulty: Difficulty::Easy,
                estimated_effort: Effort::Low,
            });
        }

        let short: Vec<&str> = issues
            .iter()
            .filter(|i| i.starts_with("not enough"))
            .map(String::as_str)
            .collect();
        if !short.is_empty() {
            out.push(Recommendation {
                category: Category::General,
                priority: Priority::Medium,
                issue: short.join("; "),
                suggestion: "Collect more images until the minimum sample counts are met"
                    .to_string(),
                expected_improvement: 10.0,
                difficulty: Difficulty::Hard,
                estimated_effort: Effort::High,
            });
        }
    }
}

fn general_rules(overall: f64, out: &mut Vec<Recommendation>) {
    if overall < 50.0 {
        out.push(Recommendation {
            category: Category::General,
            priority: Priority::High,
            issue: "overall dataset quality is very low".to_string(),
            suggestion: "Plan a comprehensive overhaul of the dataset".to_string(),
            expected_improvement: 30.0,
            difficulty: Difficulty::Hard,
            estimated_effort: Effort::High,
        });
    } else if overall < 70.0 {
        out.push(Recommendation {
            category: Category::General,
            priority: Priority::Medium,
            issue: "dataset quality needs work".to_string(),
            suggestion: "Focus on the priority improvement areas first".to_string(),
            expected_improvement: 20.0,
            difficulty: Difficulty::Medium,
            estimated_effort: Effort::Medium,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(
        priority: Priority,
        improvement: f64,
        difficulty: Difficulty,
        tag: &str,
    ) -> Recommendation {
        Recommendation {
            category: Category::General,
            priority,
            issue: String::new(),
            suggestion: tag.to_string(),
            expected_improvement: improvement,
            difficulty,
            estimated_effort: Effort::Low,
        }
    }

    #[test]
    fn test_high_sorts_before_medium_regardless_of_insertion() {
        let set = RecommendationSet::new(vec![
            rec(Priority::Medium, 99.0, Difficulty::Easy, "m"),
            rec(Priority::High, 1.0, Difficulty::Easy, "h"),
        ]);
        assert_eq!(set.items()[0].suggestion, "h");
    }

    #[test]
    fn test_larger_improvement_first_within_priority() {
        let set = RecommendationSet::new(vec![
            rec(Priority::High, 10.0, Difficulty::Easy, "small"),
            rec(Priority::High, 25.0, Difficulty::Easy, "big"),
            rec(Priority::Low, 50.0, Difficulty::Easy, "low"),
        ]);
        let order: Vec<&str> = set.items().iter().map(|r| r.suggestion.as_str()).collect();
        assert_eq!(order, vec!["big", "small", "low"]);
    }

    #[test]
    fn test_formatting() {
        let r = Recommendation {
            category: Category::ImageQuality,
            priority: Priority::High,
            issue: String::new(),
            suggestion: "Do it".into(),
            expected_improvement: 15.0,
            difficulty: Difficulty::Easy,
            estimated_effort: Effort::Low,
        };
        assert_eq!(r.formatted(), "[High] Image Quality: Do it (+15.0 points)");

        let none = Recommendation {
            expected_improvement: 0.0,
            ..r
        };
        assert_eq!(none.formatted(), "[High] Image Quality: Do it");
    }

    #[test]
    fn test_priority_uses_category_weight() {
        let engine = RecommendationEngine::default();
        // 45 * 1.2 = 54 -> Medium, 45 * 1.0 = 45 -> High
        assert_eq!(engine.determine_priority(45.0, Category::Completeness), Priority::Medium);
        assert_eq!(engine.determine_priority(45.0, Category::General), Priority::High);
        // 60 * 1.2 = 72 -> Low
        assert_eq!(engine.determine_priority(60.0, Category::Completeness), Priority::Low);
    }

    #[test]
    fn test_roadmap_buckets() {
        let set = RecommendationSet::new(vec![
            rec(Priority::High, 1.0, Difficulty::Easy, "now"),
            rec(Priority::High, 1.0, Difficulty::Hard, "soon-high"),
            rec(Priority::Low, 1.0, Difficulty::Medium, "soon-medium"),
            rec(Priority::Low, 1.0, Difficulty::Hard, "later"),
            rec(Priority::Low, 1.0, Difficulty::Easy, "later-easy"),
        ]);
        let r = set.roadmap();
        assert_eq!(r.immediate_actions, vec!["now"]);
        assert_eq!(r.short_term_goals, vec!["soon-high", "soon-medium"]);
        assert_eq!(r.long_term_planning, vec!["later", "later-easy"]);
    }

    #[test]
    fn test_export_counts() {
        let set = RecommendationSet::new(vec![
            rec(Priority::High, 1.0, Difficulty::Easy, "a"),
            rec(Priority::High, 2.0, Difficulty::Easy, "b"),
            rec(Priority::Low, 1.0, Difficulty::Easy, "c"),
        ]);
        let e = set.export();
        assert_eq!(e.total_recommendations, 3);
        assert_eq!(e.high_priority_count, 2);
        assert_eq!(e.medium_priority_count, 0);
        assert_eq!(e.low_priority_count, 1);
        assert_eq!(e.formatted_recommendations.len(), 3);
    }

    #[test]
    fn test_missing_file_improvements_are_capped() {
        let engine = RecommendationEngine::default();
        let mut analysis = AnalysisResults::default();
        analysis.completeness.missing_images = (0..100).map(|i| format!("{i}.txt")).collect();
        analysis.completeness.missing_annotations = vec!["a.jpg".into(); 10];
        let scores = QualityScores {
            overall_score: 95.0,
            ..Default::default()
        };
        let set = engine.generate(&analysis, &scores, &[]);
        let improvements: Vec<f64> = set.items().iter().map(|r| r.expected_improvement).collect();
        assert_eq!(improvements.len(), 2);
        assert!(improvements.contains(&20.0));
        assert!(improvements.iter().any(|v| (v - 3.0).abs() < 1e-9));
    }

    #[test]
    fn test_issues_without_a_statistics_rule_get_recommendations() {
        let engine = RecommendationEngine::default();
        let analysis = AnalysisResults::default();
        let scores = QualityScores {
            overall_score: 95.0,
            ..Default::default()
        };
        assert!(engine.generate(&analysis, &scores, &[]).is_empty());

        let issues = vec![
            "2 corrupted image(s) detected".to_string(),
            "not enough images: 40 < 500".to_string(),
            "not enough samples for class 'car': 3 < 50".to_string(),
        ];
        let set = engine.generate(&analysis, &scores, &issues);
        assert_eq!(set.len(), 2);
        let general = set.items().iter().find(|r| r.category == Category::General).unwrap();
        assert!(general.issue.contains("class 'car'"));
        assert!(set.items().iter().any(|r| r.suggestion.contains("corrupted")));
    }
}
