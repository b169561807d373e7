//! Dataset quality assessment service: configuration, logging, the standard
//! analysis pipeline, report writers and assessment history.

pub mod config;
pub mod logging;
pub mod reports;
pub mod steps;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use history::{AssessmentRecord, FileBackedStorage, HistoryStore};
use pipeline::PipelineRun;
use scoring::{quick_score, Grade, QualityMetrics, QualityTrend};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::reports::ReportManager;
use crate::steps::{AnalysisContext, RunResults, StepOutput};

#[derive(Clone, Copy, Debug, Default)]
pub struct AnalyzeOptions {
    pub record_history: bool,
}

pub struct AnalysisOutcome {
    pub run: PipelineRun<StepOutput>,
    pub run_id: Uuid,
    pub reports_dir: PathBuf,
    pub executive_summary: Option<PathBuf>,
    /// Previous assessment of the same dataset content, if any.
    pub previous: Option<AssessmentRecord>,
    pub recorded: Option<AssessmentRecord>,
    pub comparison: Option<PathBuf>,
}

impl AnalysisOutcome {
    pub fn metrics(&self) -> Option<&QualityMetrics> {
        self.run.assessment().map(|a| &a.metrics)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct QuickOutcome {
    pub dataset_path: PathBuf,
    pub fingerprint: String,
    pub total_images: u64,
    pub total_annotations: u64,
    pub num_classes: u64,
    pub score: f64,
    pub grade: Grade,
}

#[derive(Clone, Debug)]
pub struct DatasetHistory {
    pub fingerprint: String,
    pub records: Vec<AssessmentRecord>,
    pub trend: Option<QualityTrend>,
}

fn ensure_dataset_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("dataset path does not exist: {}", path.display());
    }
    if !path.is_dir() {
        bail!("dataset path is not a directory: {}", path.display());
    }
    Ok(())
}

pub fn open_history(config: &AppConfig) -> Result<HistoryStore<FileBackedStorage>> {
    let path = config.output.history_path();
    let storage = FileBackedStorage::open(&path)
        .with_context(|| format!("cannot open assessment history {}", path.display()))?;
    Ok(HistoryStore::new(storage))
}

/// Run the full pipeline over `dataset`, save the executive summary and,
/// when asked, record the metrics and compare them with the previous record.
pub fn analyze(
    dataset: &Path,
    config: &AppConfig,
    opts: AnalyzeOptions,
) -> Result<AnalysisOutcome> {
    ensure_dataset_dir(dataset)?;

    let reports = Arc::new(ReportManager::new(&config.output)?);
    let reports_dir = reports.reports_dir().to_path_buf();
    let pipeline = steps::standard_pipeline(config)?;
    let ctx = AnalysisContext::new(dataset.to_path_buf(), config.clone(), reports.clone());
    let run_id = ctx.run_id;

    info!(dataset = %dataset.display(), %run_id, "analysis started");
    let run = pipeline.run(ctx);

    let mut outcome = AnalysisOutcome {
        run,
        run_id,
        reports_dir,
        executive_summary: None,
        previous: None,
        recorded: None,
        comparison: None,
    };

    let Some(assessment) = outcome.run.assessment() else {
        warn!("no assessment produced; skipping summary and history");
        return Ok(outcome);
    };
    let metrics = assessment.metrics.clone();

    match reports.save_executive_summary(&metrics) {
        Ok(path) => outcome.executive_summary = Some(path),
        Err(e) => warn!("executive summary not saved: {e:#}"),
    }

    if opts.record_history {
        let fingerprint = match outcome.run.dataset() {
            Some(ds) => ds.fingerprint.clone(),
            None => bail!("dataset result missing after a successful assessment"),
        };
        let mut store = open_history(config)?;
        outcome.previous = store.latest(&fingerprint)?;
        if let Some(prev) = &outcome.previous {
            match reports.write_comparison(&metrics, &prev.metrics) {
                Ok(path) => outcome.comparison = Some(path),
                Err(e) => warn!("comparison report not saved: {e:#}"),
            }
        }
        let dataset_name = dataset.display().to_string();
        let record = store.record(&fingerprint, &dataset_name, run_id, metrics)?;
        info!(fingerprint = %record.fingerprint, seq = record.seq, "assessment recorded");
        outcome.recorded = Some(record);
    }

    Ok(outcome)
}

/// Load and count only; no image decoding.
pub fn quick(dataset: &Path, config: &AppConfig) -> Result<QuickOutcome> {
    ensure_dataset_dir(dataset)?;

    let reports = Arc::new(ReportManager::new(&config.output)?);
    let pipeline = steps::quick_pipeline(config)?;
    let run = pipeline.run(AnalysisContext::new(dataset.to_path_buf(), config.clone(), reports));

    let Some(basic) = run.basic_statistics() else {
        let reason = run
            .errors
            .values()
            .next()
            .cloned()
            .unwrap_or_else(|| "unknown error".to_string());
        bail!("quick analysis failed: {reason}");
    };

    let (images, objects, classes) = (
        basic.total_images as u64,
        basic.total_objects as u64,
        basic.num_classes as u64,
    );
    let score = quick_score(images, objects, classes);
    Ok(QuickOutcome {
        dataset_path: dataset.to_path_buf(),
        fingerprint: basic.fingerprint.clone(),
        total_images: images,
        total_annotations: objects,
        num_classes: classes,
        score,
        grade: Grade::from_score(score),
    })
}

/// Recorded assessments of the dataset's current content.
pub fn dataset_history(dataset: &Path, config: &AppConfig) -> Result<DatasetHistory> {
    ensure_dataset_dir(dataset)?;
    let layout = datasets::layout::scan(dataset)?;
    let fingerprint = datasets::fingerprint_hex(&layout);

    let store = open_history(config)?;
    Ok(DatasetHistory {
        records: store.list(&fingerprint)?,
        trend: store.trend(&fingerprint)?,
        fingerprint,
    })
}

/// Accepts a bare `QualityMetrics` document or a detailed report, whose
/// metrics live under `detailed_scores`.
pub fn read_metrics(path: &Path) -> Result<QualityMetrics> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let mut value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    if let Some(inner) = value.get_mut("detailed_scores") {
        value = inner.take();
    }
    serde_json::from_value(value)
        .with_context(|| format!("{} holds no quality metrics", path.display()))
}
