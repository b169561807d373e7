//! Report writers. Every file of one run shares the same timestamp suffix.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use datasets::BasicStatistics;
use scoring::{
    compare_with_baseline, AnalysisResults, Assessment, BaselineComparison, ComponentScores,
    DetailedScores, Grade, ImprovementArea, QualityLevel, QualityMetrics, QualityScorer,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, OutputConfig};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// File name prefixes, one per report kind.
pub const DETAILED: &str = "detailed_quality_report";
pub const SUMMARY: &str = "quality_summary";
pub const CSV: &str = "quality_metrics";
pub const RECOMMENDATIONS: &str = "recommendations";
pub const METADATA: &str = "analysis_metadata";
pub const EXECUTIVE: &str = "executive_summary";
pub const COMPARISON: &str = "comparison_report";

const KINDS: &[(&str, &str)] = &[
    (DETAILED, "json"),
    (SUMMARY, "txt"),
    (CSV, "csv"),
    (RECOMMENDATIONS, "json"),
    (METADATA, "json"),
    (EXECUTIVE, "txt"),
    (COMPARISON, "json"),
];

/// Everything the writers read for one run.
pub struct ReportInput<'a> {
    pub dataset_path: &'a Path,
    pub run_id: Uuid,
    pub duration_seconds: f64,
    pub analysis: &'a AnalysisResults,
    pub assessment: &'a Assessment,
    pub scorer: &'a QualityScorer,
    pub basic: Option<&'a BasicStatistics>,
    pub config: &'a AppConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DetailedReport {
    pub metadata: DetailedMetadata,
    pub summary: DetailedSummary,
    pub detailed_scores: QualityMetrics,
    pub component_scores: ComponentScores,
    pub sub_scores: DetailedScores,
    pub analysis_results: AnalysisResults,
    pub improvement_areas: Vec<ImprovementArea>,
    pub recommendations: DetailedRecommendations,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DetailedMetadata {
    pub assessment_date: String,
    pub dataset_path: PathBuf,
    pub run_id: Uuid,
    pub assessor_version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DetailedSummary {
    pub overall_score: f64,
    pub dataset_grade: Grade,
    pub quality_level: QualityLevel,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DetailedRecommendations {
    pub high_priority: Vec<String>,
    pub all_recommendations: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub analysis_timestamp: String,
    pub run_id: Uuid,
    pub analysis_duration_seconds: f64,
    pub dataset_path: PathBuf,
    pub dataset_stats: Option<BasicStatistics>,
    pub class_distribution: BTreeMap<String, u64>,
    pub analyzer_version: String,
    pub config_used: AppConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub comparison_timestamp: String,
    pub current_metrics: QualityMetrics,
    pub baseline_metrics: QualityMetrics,
    pub comparison_results: BaselineComparison,
    pub overall_change: f64,
    pub grade_change: String,
}

/// Existing reports by kind, newest first.
pub type ReportIndex = BTreeMap<String, Vec<PathBuf>>;

pub struct ReportManager {
    reports_dir: PathBuf,
    output: OutputConfig,
    timestamp: String,
}

impl ReportManager {
    pub fn new(output: &OutputConfig) -> Result<Self> {
        let timestamp = format_timestamp(&output.timestamp_format);
        Self::with_timestamp(output, timestamp)
    }

    pub fn with_timestamp(output: &OutputConfig, timestamp: impl Into<String>) -> Result<Self> {
        std::fs::create_dir_all(&output.reports_dir).with_context(|| {
            format!("cannot create reports directory {}", output.reports_dir.display())
        })?;
        Ok(Self {
            reports_dir: output.reports_dir.clone(),
            output: output.clone(),
            timestamp: timestamp.into(),
        })
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    fn path_for(&self, kind: &str, ext: &str) -> PathBuf {
        self.reports_dir.join(format!("{kind}_{}.{ext}", self.timestamp))
    }

    fn write_json<T: Serialize>(&self, kind: &str, value: &T) -> Result<PathBuf> {
        let path = self.path_for(kind, "json");
        let bytes = serde_json::to_vec_pretty(value)
            .with_context(|| format!("cannot serialize {kind}"))?;
        std::fs::write(&path, bytes).with_context(|| format!("cannot write {}", path.display()))?;
        Ok(path)
    }

    fn write_text(&self, kind: &str, ext: &str, text: &str) -> Result<PathBuf> {
        let path = self.path_for(kind, ext);
        std::fs::write(&path, text).with_context(|| format!("cannot write {}", path.display()))?;
        Ok(path)
    }

    /// Writes every enabled report. A writer that fails is logged and
    /// skipped; the others still run.
    pub fn generate_all(&self, input: &ReportInput<'_>) -> BTreeMap<String, PathBuf> {
        let mut written = BTreeMap::new();
        let mut attempt = |kind: &str, enabled: bool, res: &dyn Fn() -> Result<PathBuf>| {
            if !enabled {
                return;
            }
            match res() {
                Ok(path) => {
                    written.insert(kind.to_string(), path);
                }
                Err(e) => warn!(report = kind, "report not written: {e:#}"),
            }
        };

        attempt(DETAILED, self.output.save_detailed_report, &|| self.write_detailed(input));
        attempt(SUMMARY, self.output.save_summary_report, &|| {
            self.write_text(SUMMARY, "txt", &input.scorer.score_summary(&input.assessment.scores))
        });
        attempt(CSV, self.output.save_csv_report, &|| {
            self.write_text(CSV, "csv", &metrics_csv(&input.assessment.metrics))
        });
        attempt(RECOMMENDATIONS, self.output.save_recommendations, &|| {
            self.write_json(RECOMMENDATIONS, &input.assessment.recommendations.export())
        });
        attempt(METADATA, true, &|| self.write_metadata(input));

        info!(count = written.len(), dir = %self.reports_dir.display(), "reports written");
        written
    }

    pub fn write_detailed(&self, input: &ReportInput<'_>) -> Result<PathBuf> {
        let a = input.assessment;
        let all = a.metrics.recommendations.clone();
        let report = DetailedReport {
            metadata: DetailedMetadata {
                assessment_date: Utc::now().to_rfc3339(),
                dataset_path: input.dataset_path.to_path_buf(),
                run_id: input.run_id,
                assessor_version: VERSION.to_string(),
            },
            summary: DetailedSummary {
                overall_score: a.metrics.overall_score,
                dataset_grade: a.metrics.dataset_grade,
                quality_level: input.scorer.quality_level(a.metrics.overall_score),
            },
            detailed_scores: a.metrics.clone(),
            component_scores: a.scores.components.clone(),
            sub_scores: a.scores.detailed.clone(),
            analysis_results: input.analysis.clone(),
            improvement_areas: input.scorer.identify_improvement_areas(&a.scores.components),
            recommendations: DetailedRecommendations {
                high_priority: all.iter().take(5).cloned().collect(),
                all_recommendations: all,
            },
        };
        self.write_json(DETAILED, &report)
    }

    pub fn write_metadata(&self, input: &ReportInput<'_>) -> Result<PathBuf> {
        let meta = AnalysisMetadata {
            analysis_timestamp: Utc::now().to_rfc3339(),
            run_id: input.run_id,
            analysis_duration_seconds: input.duration_seconds,
            dataset_path: input.dataset_path.to_path_buf(),
            dataset_stats: input.basic.cloned(),
            class_distribution: input.analysis.annotation.class_counts.clone(),
            analyzer_version: VERSION.to_string(),
            config_used: input.config.clone(),
        };
        self.write_json(METADATA, &meta)
    }

    pub fn save_executive_summary(&self, metrics: &QualityMetrics) -> Result<PathBuf> {
        let path = self.write_text(EXECUTIVE, "txt", &executive_summary(metrics))?;
        info!(path = %path.display(), "executive summary saved");
        Ok(path)
    }

    pub fn write_comparison(
        &self,
        current: &QualityMetrics,
        baseline: &QualityMetrics,
    ) -> Result<PathBuf> {
        let report = ComparisonReport {
            comparison_timestamp: Utc::now().to_rfc3339(),
            current_metrics: current.clone(),
            baseline_metrics: baseline.clone(),
            comparison_results: compare_with_baseline(baseline, current),
            overall_change: current.overall_score - baseline.overall_score,
            grade_change: format!("{} -> {}", baseline.dataset_grade, current.dataset_grade),
        };
        let path = self.write_json(COMPARISON, &report)?;
        info!(path = %path.display(), "comparison report saved");
        Ok(path)
    }

    /// Reports in the directory grouped by kind, newest first. Kinds with no
    /// files are still listed.
    pub fn index(&self) -> Result<ReportIndex> {
        let mut index: ReportIndex =
            KINDS.iter().map(|(k, _)| (k.to_string(), Vec::new())).collect();
        let entries = std::fs::read_dir(&self.reports_dir)
            .with_context(|| format!("cannot list {}", self.reports_dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            let kind = KINDS
                .iter()
                .find(|(prefix, ext)| {
                    name.starts_with(&format!("{prefix}_")) && name.ends_with(&format!(".{ext}"))
                });
            if let Some((prefix, _)) = kind {
                if let Some(list) = index.get_mut(*prefix) {
                    list.push(path.clone());
                }
            }
        }
        for list in index.values_mut() {
            list.sort_by(|a, b| b.cmp(a));
        }
        Ok(index)
    }

    /// Keep the newest `keep_last_n` files of each kind; returns how many
    /// were deleted.
    pub fn cleanup(&self, keep_last_n: usize) -> Result<usize> {
        let mut deleted = 0;
        for (kind, files) in self.index()? {
            for path in files.iter().skip(keep_last_n) {
                match std::fs::remove_file(path) {
                    Ok(()) => deleted += 1,
                    Err(e) => warn!(report = %kind, "cannot delete {}: {e}", path.display()),
                }
            }
        }
        if deleted > 0 {
            info!(deleted, "old reports removed");
        }
        Ok(deleted)
    }
}

/// Falls back to the default pattern when `format` has bad specifiers.
pub fn format_timestamp(format: &str) -> String {
    let now = Local::now();
    let mut out = String::new();
    if write!(out, "{}", now.format(format)).is_err() || out.is_empty() {
        out.clear();
        let _ = write!(out, "{}", now.format(DEFAULT_TIMESTAMP_FORMAT));
    }
    out
}

fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Header plus one row. List fields are joined with `; `.
pub fn metrics_csv(m: &QualityMetrics) -> String {
    let header = [
        "overall_score",
        "image_quality_score",
        "annotation_quality_score",
        "completeness_score",
        "diversity_score",
        "consistency_score",
        "total_images",
        "total_annotations",
        "num_classes",
        "class_balance_score",
        "image_resolution_score",
        "annotation_accuracy_score",
        "dataset_grade",
        "issues_found",
        "recommendations",
    ];
    let row = [
        format!("{:.2}", m.overall_score),
        format!("{:.2}", m.image_quality_score),
        format!("{:.2}", m.annotation_quality_score),
        format!("{:.2}", m.completeness_score),
        format!("{:.2}", m.diversity_score),
        format!("{:.2}", m.consistency_score),
        m.total_images.to_string(),
        m.total_annotations.to_string(),
        m.num_classes.to_string(),
        format!("{:.2}", m.class_balance_score),
        format!("{:.2}", m.image_resolution_score),
        format!("{:.2}", m.annotation_accuracy_score),
        m.dataset_grade.to_string(),
        csv_field(&m.issues_found.join("; ")),
        csv_field(&m.recommendations.join("; ")),
    ];
    format!("{}\n{}\n", header.join(","), row.join(","))
}

pub fn executive_summary(m: &QualityMetrics) -> String {
    let rule = "=".repeat(60);
    let mut out = String::new();
    let _ = writeln!(out, "DATASET QUALITY ASSESSMENT - EXECUTIVE SUMMARY");
    let _ = writeln!(out, "{rule}");

    let _ = writeln!(out, "\nOVERALL");
    let _ = writeln!(out, "   Quality score: {:.1}/100", m.overall_score);
    let _ = writeln!(out, "   Dataset grade: {}", m.dataset_grade);

    let (status, advice) = if m.overall_score >= 90.0 {
        ("READY FOR PRODUCTION", "The dataset can be used in production as is.")
    } else if m.overall_score >= 75.0 {
        ("MINOR IMPROVEMENTS NEEDED", "Small fixes will bring the dataset to an excellent level.")
    } else if m.overall_score >= 60.0 {
        ("MODERATE RISK", "Significant improvements are recommended before use.")
    } else {
        ("HIGH RISK", "Major revisions are required; do not use in production.")
    };
    let _ = writeln!(out, "\nSTATUS: {status}");
    let _ = writeln!(out, "ADVICE: {advice}");

    let _ = writeln!(out, "\nDATASET SIZE");
    let _ = writeln!(out, "   Total images: {}", m.total_images);
    let _ = writeln!(out, "   Classes: {}", m.num_classes);

    if !m.issues_found.is_empty() {
        let _ = writeln!(out, "\nCRITICAL ISSUES ({})", m.issues_found.len());
        for issue in m.issues_found.iter().take(3) {
            let _ = writeln!(out, "   - {issue}");
        }
    }
    if !m.recommendations.is_empty() {
        let _ = writeln!(out, "\nPRIORITY ACTIONS");
        for rec in m.recommendations.iter().take(3) {
            let _ = writeln!(out, "   - {rec}");
        }
    }

    let _ = writeln!(out, "\n{rule}");
    let _ = write!(out, "Report date: {}", Local::now().format("%d.%m.%Y %H:%M"));
    out
}
