use std::fs;
use std::path::Path;

use assessor::config::AppConfig;
use assessor::reports::{CSV, DETAILED, METADATA, RECOMMENDATIONS, SUMMARY};
use assessor::steps::{RunResults, DATA_LOADING, QUALITY_ASSESSMENT};
use assessor::{analyze, dataset_history, quick, read_metrics, AnalyzeOptions};
use image::{Rgb, RgbImage};
use pipeline::StepStatus;

fn write_png(path: &Path, w: u32, h: u32) {
    let img = RgbImage::from_fn(w, h, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 3 % 256) as u8, ((x ^ y) % 256) as u8])
    });
    img.save(path).unwrap();
}

/// Five labelled images over two classes, one image without a label.
fn dataset(root: &Path) {
    fs::create_dir_all(root.join("images")).unwrap();
    fs::create_dir_all(root.join("labels")).unwrap();
    for (i, name) in ["a", "b", "c", "d", "e", "f"].iter().enumerate() {
        write_png(&root.join(format!("images/{name}.png")), 160 + 16 * i as u32, 120);
    }
    fs::write(root.join("labels/a.txt"), "0 0.5 0.5 0.2 0.2\n1 0.3 0.3 0.1 0.1\n").unwrap();
    fs::write(root.join("labels/b.txt"), "0 0.5 0.5 0.4 0.4\n").unwrap();
    fs::write(root.join("labels/c.txt"), "1 0.2 0.6 0.3 0.2\n").unwrap();
    fs::write(root.join("labels/d.txt"), "0 0.7 0.4 0.2 0.5\n1 0.4 0.4 0.3 0.3\n").unwrap();
    fs::write(root.join("labels/e.txt"), "1 0.5 0.5 0.6 0.6\n").unwrap();
    fs::write(root.join("classes.txt"), "car\nperson\n").unwrap();
}

fn config(out: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.output.reports_dir = out.to_path_buf();
    config.logging.file = None;
    config
}

#[test]
fn test_full_analysis_writes_reports_and_history() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    dataset(data.path());
    let config = config(out.path());

    let outcome = analyze(data.path(), &config, AnalyzeOptions { record_history: true }).unwrap();
    assert!(outcome.run.success, "errors: {:?}", outcome.run.errors);
    assert_eq!(outcome.run.summary.completed_steps, 7);
    assert_eq!(outcome.run.status(QUALITY_ASSESSMENT), Some(StepStatus::Completed));

    let metrics = outcome.metrics().unwrap();
    assert_eq!(metrics.total_images, 6);
    assert_eq!(metrics.num_classes, 2);
    assert!((0.0..=100.0).contains(&metrics.overall_score));
    assert!(metrics.issues_found.iter().any(|i| i.contains("missing annotation")));

    let reports = outcome.run.reports().unwrap();
    for kind in [DETAILED, SUMMARY, RECOMMENDATIONS, METADATA] {
        assert!(reports[kind].exists(), "{kind} not written");
    }
    assert!(outcome.executive_summary.as_ref().unwrap().exists());

    assert!(outcome.previous.is_none());
    assert!(outcome.comparison.is_none());
    let recorded = outcome.recorded.as_ref().unwrap();
    assert_eq!(recorded.seq, 0);
    assert_eq!(recorded.run_id, outcome.run_id);
    assert!(out.path().join("history.json").exists());

    let again = analyze(data.path(), &config, AnalyzeOptions { record_history: true }).unwrap();
    let prev = again.previous.as_ref().unwrap();
    assert_eq!(prev.seq, 0);
    assert_eq!(prev.metrics.overall_score, metrics.overall_score);
    assert!(again.comparison.as_ref().unwrap().exists());
    assert_eq!(again.recorded.as_ref().unwrap().seq, 1);

    let hist = dataset_history(data.path(), &config).unwrap();
    assert_eq!(hist.records.len(), 2);
    assert_eq!(hist.trend.unwrap().score_history.len(), 2);
}

#[test]
fn test_no_history_leaves_no_history_file() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    dataset(data.path());

    let outcome = analyze(data.path(), &config(out.path()), AnalyzeOptions::default()).unwrap();
    assert!(outcome.run.success);
    assert!(outcome.recorded.is_none());
    assert!(!out.path().join("history.json").exists());
}

#[test]
fn test_disabled_writers_are_skipped() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    dataset(data.path());
    let mut config = config(out.path());
    config.output.save_summary_report = false;
    config.output.save_csv_report = false;

    let outcome = analyze(data.path(), &config, AnalyzeOptions::default()).unwrap();
    let reports = outcome.run.reports().unwrap();
    assert!(reports.contains_key(DETAILED));
    assert!(!reports.contains_key(SUMMARY));
    assert!(!reports.contains_key(CSV));
}

#[test]
fn test_missing_dataset_is_an_error() {
    let out = tempfile::tempdir().unwrap();
    let missing = out.path().join("nope");
    let err = analyze(&missing, &config(out.path()), AnalyzeOptions::default()).err().unwrap();
    assert!(err.to_string().contains("does not exist"));
}

#[test]
fn test_empty_dataset_still_loads() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let outcome = analyze(data.path(), &config(out.path()), AnalyzeOptions::default()).unwrap();
    assert_eq!(outcome.run.status(DATA_LOADING), Some(StepStatus::Completed));
    assert_eq!(outcome.run.dataset().unwrap().layout.images.len(), 0);
}

#[test]
fn test_quick_counts_without_decoding() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    dataset(data.path());

    let q = quick(data.path(), &config(out.path())).unwrap();
    assert_eq!(q.total_images, 6);
    assert_eq!(q.total_annotations, 7);
    assert_eq!(q.num_classes, 2);
    assert_eq!(q.fingerprint.len(), 64);
    assert!((0.0..=100.0).contains(&q.score));
}

#[test]
fn test_read_metrics_from_detailed_report() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    dataset(data.path());

    let outcome = analyze(data.path(), &config(out.path()), AnalyzeOptions::default()).unwrap();
    let detailed = &outcome.run.reports().unwrap()[DETAILED];
    let metrics = read_metrics(detailed).unwrap();
    let expected = outcome.metrics().unwrap();
    assert_eq!(metrics.total_images, expected.total_images);
    assert_eq!(metrics.dataset_grade, expected.dataset_grade);
    assert!((metrics.overall_score - expected.overall_score).abs() < 1e-9);

    let bare = out.path().join("metrics.json");
    fs::write(&bare, serde_json::to_vec(&metrics).unwrap()).unwrap();
    assert_eq!(read_metrics(&bare).unwrap().issues_found, metrics.issues_found);
}
