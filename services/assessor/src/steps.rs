//! The standard analysis pipeline and the typed results its steps exchange.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use datasets::{BasicStatistics, ImageAnalysis, LoadedDataset};
use pipeline::{Pipeline, PipelineRun, StepInput};
use scoring::{AnalysisResults, AnnotationStats, Assessment, CompletenessStats, QualityAssessor};
use tracing::info;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::reports::{ReportInput, ReportManager};

pub const DATA_LOADING: &str = "data_loading";
pub const BASIC_STATISTICS: &str = "basic_statistics";
pub const IMAGE_ANALYSIS: &str = "image_analysis";
pub const ANNOTATION_ANALYSIS: &str = "annotation_analysis";
pub const COMPLETENESS_CHECK: &str = "completeness_check";
pub const QUALITY_ASSESSMENT: &str = "quality_assessment";
pub const REPORT_GENERATION: &str = "report_generation";

/// Step timeouts at the default `processing.timeout_seconds`; a different
/// setting scales all of them.
const BASE_TIMEOUT_SECONDS: u64 = 300;
const STEP_TIMEOUTS: &[(&str, u64)] = &[
    (DATA_LOADING, 120),
    (BASIC_STATISTICS, 60),
    (IMAGE_ANALYSIS, 300),
    (ANNOTATION_ANALYSIS, 180),
    (QUALITY_ASSESSMENT, 120),
    (REPORT_GENERATION, 90),
];

#[derive(Clone, Debug)]
pub enum StepOutput {
    Dataset(Arc<LoadedDataset>),
    Basic(BasicStatistics),
    Images(Arc<ImageAnalysis>),
    Annotations(AnnotationStats),
    Completeness(CompletenessStats),
    Assessment(Arc<Assessment>),
    Reports(BTreeMap<String, PathBuf>),
}

impl StepOutput {
    fn kind(&self) -> &'static str {
        match self {
            StepOutput::Dataset(_) => "dataset",
            StepOutput::Basic(_) => "basic statistics",
            StepOutput::Images(_) => "image analysis",
            StepOutput::Annotations(_) => "annotation statistics",
            StepOutput::Completeness(_) => "completeness",
            StepOutput::Assessment(_) => "assessment",
            StepOutput::Reports(_) => "reports",
        }
    }
}

/// Shared by every step of one run.
pub struct AnalysisContext {
    pub dataset_path: PathBuf,
    pub config: AppConfig,
    pub assessor: QualityAssessor,
    pub reports: Arc<ReportManager>,
    pub run_id: Uuid,
    pub started: Instant,
}

impl AnalysisContext {
    pub fn new(dataset_path: PathBuf, config: AppConfig, reports: Arc<ReportManager>) -> Self {
        let assessor = QualityAssessor::new(
            config.quality_scoring.clone(),
            config.recommendations.clone(),
            config.requirements(),
        );
        Self {
            dataset_path,
            config,
            assessor,
            reports,
            run_id: Uuid::new_v4(),
            started: Instant::now(),
        }
    }
}

type Input = StepInput<StepOutput, AnalysisContext>;

fn mismatch(step: &str, got: &StepOutput) -> anyhow::Error {
    anyhow::anyhow!("step '{step}' produced {} output", got.kind())
}

fn dataset(input: &Input) -> Result<Arc<LoadedDataset>> {
    match input.require(DATA_LOADING)? {
        StepOutput::Dataset(d) => Ok(d.clone()),
        other => Err(mismatch(DATA_LOADING, other)),
    }
}

fn basic(input: &Input) -> Result<BasicStatistics> {
    match input.require(BASIC_STATISTICS)? {
        StepOutput::Basic(b) => Ok(b.clone()),
        other => Err(mismatch(BASIC_STATISTICS, other)),
    }
}

fn images(input: &Input) -> Result<Arc<ImageAnalysis>> {
    match input.require(IMAGE_ANALYSIS)? {
        StepOutput::Images(i) => Ok(i.clone()),
        other => Err(mismatch(IMAGE_ANALYSIS, other)),
    }
}

fn annotations(input: &Input) -> Result<AnnotationStats> {
    match input.require(ANNOTATION_ANALYSIS)? {
        StepOutput::Annotations(a) => Ok(a.clone()),
        other => Err(mismatch(ANNOTATION_ANALYSIS, other)),
    }
}

fn completeness(input: &Input) -> Result<CompletenessStats> {
    match input.require(COMPLETENESS_CHECK)? {
        StepOutput::Completeness(c) => Ok(c.clone()),
        other => Err(mismatch(COMPLETENESS_CHECK, other)),
    }
}

fn assessment(input: &Input) -> Result<Arc<Assessment>> {
    match input.require(QUALITY_ASSESSMENT)? {
        StepOutput::Assessment(a) => Ok(a.clone()),
        other => Err(mismatch(QUALITY_ASSESSMENT, other)),
    }
}

pub fn step_timeout(config: &AppConfig, step: &str) -> Option<Duration> {
    let base = STEP_TIMEOUTS.iter().find(|(name, _)| *name == step)?.1;
    let factor = config.processing.timeout_seconds as f64 / BASE_TIMEOUT_SECONDS as f64;
    let scaled = base as f64 * factor;
    Some(Duration::try_from_secs_f64(scaled.max(1.0)).unwrap_or(Duration::MAX))
}

fn new_pipeline(config: &AppConfig) -> Pipeline<StepOutput, AnalysisContext> {
    Pipeline::new(Duration::from_secs(config.processing.timeout_seconds))
}

fn add_loading_steps(
    p: &mut Pipeline<StepOutput, AnalysisContext>,
    config: &AppConfig,
) -> Result<()> {
    p.add_step(
        DATA_LOADING,
        "Discover images and annotation files, parse annotations",
        &[],
        step_timeout(config, DATA_LOADING),
        |input: &Input| {
            let ds = datasets::load(&input.context().dataset_path)?;
            Ok(StepOutput::Dataset(Arc::new(ds)))
        },
    )?
    .critical();

    p.add_step(
        BASIC_STATISTICS,
        "Count files, objects, classes and splits",
        &[DATA_LOADING],
        step_timeout(config, BASIC_STATISTICS),
        |input: &Input| {
            let stats = dataset(input)?.basic_statistics();
            info!(
                images = stats.total_images,
                objects = stats.total_objects,
                classes = stats.num_classes,
                "basic statistics"
            );
            Ok(StepOutput::Basic(stats))
        },
    )?;
    Ok(())
}

/// data_loading (critical) -> basic_statistics -> image_analysis ->
/// annotation_analysis -> completeness_check -> quality_assessment ->
/// report_generation
pub fn standard_pipeline(config: &AppConfig) -> Result<Pipeline<StepOutput, AnalysisContext>> {
    let mut p = new_pipeline(config);
    add_loading_steps(&mut p, config)?;

    p.add_step(
        IMAGE_ANALYSIS,
        "Decode images and measure resolution, sharpness, brightness and contrast",
        &[DATA_LOADING],
        step_timeout(config, IMAGE_ANALYSIS),
        |input: &Input| {
            let ds = dataset(input)?;
            let total = ds.layout.images.len();
            let batch = input.context().config.processing.batch_size.max(1);
            let seen = Cell::new(0usize);
            let analysis = ds.analyze_images(|| {
                let n = seen.get();
                if n > 0 && n % batch == 0 {
                    info!("  {n}/{total} images analysed");
                }
                seen.set(n + 1);
                input.is_cancelled()
            })?;
            Ok(StepOutput::Images(Arc::new(analysis)))
        },
    )?;

    p.add_step(
        ANNOTATION_ANALYSIS,
        "Class distribution and bounding box checks",
        &[DATA_LOADING, BASIC_STATISTICS],
        step_timeout(config, ANNOTATION_ANALYSIS),
        |input: &Input| {
            let stats = dataset(input)?.analyze_annotations();
            Ok(StepOutput::Annotations(stats))
        },
    )?;

    p.add_step(
        COMPLETENESS_CHECK,
        "Pair images with annotations, check structure and naming",
        &[DATA_LOADING],
        None,
        |input: &Input| {
            let ds = dataset(input)?;
            // a full decode may have found more broken images than the header check
            let decoded = images(input).ok();
            let stats = ds.check_completeness(decoded.as_ref().map(|a| a.corrupted.as_slice()));
            Ok(StepOutput::Completeness(stats))
        },
    )?;

    p.add_step(
        QUALITY_ASSESSMENT,
        "Score components, find issues, build recommendations",
        &[IMAGE_ANALYSIS, ANNOTATION_ANALYSIS, COMPLETENESS_CHECK],
        step_timeout(config, QUALITY_ASSESSMENT),
        |input: &Input| {
            let analysis = analysis_results(input)?;
            let result = input.context().assessor.evaluate(&analysis);
            Ok(StepOutput::Assessment(Arc::new(result)))
        },
    )?;

    p.add_step(
        REPORT_GENERATION,
        "Write detailed, summary, CSV, recommendation and metadata reports",
        &[QUALITY_ASSESSMENT],
        step_timeout(config, REPORT_GENERATION),
        |input: &Input| {
            let ctx = input.context();
            let result = assessment(input)?;
            let analysis = analysis_results(input)?;
            let basic = basic(input).ok();
            let report_input = ReportInput {
                dataset_path: &ctx.dataset_path,
                run_id: ctx.run_id,
                duration_seconds: ctx.started.elapsed().as_secs_f64(),
                analysis: &analysis,
                assessment: &result,
                scorer: ctx.assessor.scorer(),
                basic: basic.as_ref(),
                config: &ctx.config,
            };
            let written = ctx.reports.generate_all(&report_input);
            if written.is_empty() && ctx.config.output.save_detailed_report {
                bail!("no report could be written to {}", ctx.reports.reports_dir().display());
            }
            Ok(StepOutput::Reports(written))
        },
    )?;

    Ok(p)
}

fn analysis_results(input: &Input) -> Result<AnalysisResults> {
    Ok(AnalysisResults {
        image: images(input)?.stats.clone(),
        annotation: annotations(input)?,
        completeness: completeness(input)?,
    })
}

/// Only loading and counting; enough for `scoring::quick_score`.
pub fn quick_pipeline(config: &AppConfig) -> Result<Pipeline<StepOutput, AnalysisContext>> {
    let mut p = new_pipeline(config);
    add_loading_steps(&mut p, config)?;
    Ok(p)
}

/// Typed views over a finished run.
pub trait RunResults {
    fn dataset(&self) -> Option<&LoadedDataset>;
    fn basic_statistics(&self) -> Option<&BasicStatistics>;
    fn assessment(&self) -> Option<&Assessment>;
    fn reports(&self) -> Option<&BTreeMap<String, PathBuf>>;
}

impl RunResults for PipelineRun<StepOutput> {
    fn dataset(&self) -> Option<&LoadedDataset> {
        match self.get(DATA_LOADING)? {
            StepOutput::Dataset(d) => Some(d),
            _ => None,
        }
    }

    fn basic_statistics(&self) -> Option<&BasicStatistics> {
        match self.get(BASIC_STATISTICS)? {
            StepOutput::Basic(b) => Some(b),
            _ => None,
        }
    }

    fn assessment(&self) -> Option<&Assessment> {
        match self.get(QUALITY_ASSESSMENT)? {
            StepOutput::Assessment(a) => Some(a),
            _ => None,
        }
    }

    fn reports(&self) -> Option<&BTreeMap<String, PathBuf>> {
        match self.get(REPORT_GENERATION)? {
            StepOutput::Reports(r) => Some(r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_order_and_criticality() {
        let p = standard_pipeline(&AppConfig::default()).unwrap();
        let names: Vec<&str> = p.steps().iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec![
                DATA_LOADING,
                BASIC_STATISTICS,
                IMAGE_ANALYSIS,
                ANNOTATION_ANALYSIS,
                COMPLETENESS_CHECK,
                QUALITY_ASSESSMENT,
                REPORT_GENERATION
            ]
        );
        assert!(p.steps()[0].is_critical());
        assert!(p.steps()[1..].iter().all(|s| !s.is_critical()));
    }

    #[test]
    fn test_timeouts_scale_with_config() {
        let mut config = AppConfig::default();
        let p = standard_pipeline(&config).unwrap();
        assert_eq!(p.steps()[0].timeout(), Duration::from_secs(120));
        // completeness_check uses the pipeline default
        assert_eq!(p.steps()[4].timeout(), Duration::from_secs(300));

        config.processing.timeout_seconds = 600;
        assert_eq!(step_timeout(&config, IMAGE_ANALYSIS), Some(Duration::from_secs(600)));
        assert_eq!(step_timeout(&config, COMPLETENESS_CHECK), None);
    }

    #[test]
    fn test_unvalidated_huge_timeout_saturates() {
        let mut config = AppConfig::default();
        config.processing.timeout_seconds = u64::MAX;
        assert_eq!(step_timeout(&config, IMAGE_ANALYSIS), Some(Duration::MAX));
        assert!(standard_pipeline(&config).is_ok());
    }
}
