use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use assessor::config::AppConfig;
use assessor::reports::ReportManager;
use assessor::steps::RunResults;
use assessor::{analyze, dataset_history, quick, read_metrics, AnalysisOutcome, AnalyzeOptions};
use clap::{Args, Parser, Subcommand, ValueEnum};
use scoring::compare_with_baseline;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "dqa")]
#[command(about = "Assess the quality of object detection datasets")]
#[command(version)]
struct Cli {
    /// JSON config file merged over the built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis pipeline over a dataset directory.
    Analyze(AnalyzeArgs),

    /// Compare two saved assessments (metrics or detailed report JSON).
    Compare {
        #[arg(long)]
        baseline: PathBuf,

        #[arg(long)]
        current: PathBuf,
    },

    /// Show recorded assessments and the score trend for a dataset.
    History {
        dataset: PathBuf,
    },

    /// List saved reports, optionally deleting old ones.
    Reports {
        /// Keep only the newest N reports of each kind.
        #[arg(long)]
        cleanup: Option<usize>,
    },
}

#[derive(Args)]
struct AnalyzeArgs {
    dataset: PathBuf,

    /// Console output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Count files and objects only; skips image decoding and reports.
    #[arg(long)]
    quick: bool,

    /// Do not record this assessment in the history file.
    #[arg(long)]
    no_history: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let loaded = AppConfig::load(cli.config.as_deref());
    if let Err(e) = assessor::logging::init(&loaded.config.logging) {
        eprintln!("logging disabled: {e:#}");
    }
    match &loaded.source {
        Some(path) => info!(path = %path.display(), "config loaded"),
        None => info!("using default config"),
    }
    for w in &loaded.warnings {
        warn!("config: {w}");
    }

    match run(cli.command, &loaded.config) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// `Ok(false)` means the command ran but the analysis did not succeed.
fn run(command: Commands, config: &AppConfig) -> Result<bool> {
    match command {
        Commands::Analyze(args) if args.quick => {
            let outcome = quick(&args.dataset, config)?;
            match args.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
                OutputFormat::Text => {
                    println!("Quick assessment of {}", outcome.dataset_path.display());
                    println!("   Images: {}", outcome.total_images);
                    println!("   Annotations: {}", outcome.total_annotations);
                    println!("   Classes: {}", outcome.num_classes);
                    println!("   Quick score: {:.1}/100 (grade {})", outcome.score, outcome.grade);
                }
            }
            Ok(true)
        }
        Commands::Analyze(args) => {
            let opts = AnalyzeOptions {
                record_history: !args.no_history,
            };
            let outcome = analyze(&args.dataset, config, opts)?;
            match args.format {
                OutputFormat::Json => print_json(&outcome)?,
                OutputFormat::Text => print_text(&args.dataset, &outcome),
            }
            Ok(outcome.run.success)
        }
        Commands::Compare { baseline, current } => {
            let base = read_metrics(&baseline)?;
            let cur = read_metrics(&current)?;
            let cmp = compare_with_baseline(&base, &cur);

            println!(
                "Overall: {:.1} -> {:.1} ({:+.1})",
                base.overall_score, cur.overall_score, cmp.diff.overall_score_diff
            );
            println!("Grade: {} -> {}", base.dataset_grade, cur.dataset_grade);
            print_list("Improvements", &cmp.improvements);
            print_list("Deteriorations", &cmp.deteriorations);
            print_list("Notes", &cmp.notes);

            let path = ReportManager::new(&config.output)?.write_comparison(&cur, &base)?;
            println!("\nComparison report: {}", path.display());
            Ok(true)
        }
        Commands::History { dataset } => {
            let hist = dataset_history(&dataset, config)?;
            if hist.records.is_empty() {
                println!(
                    "No assessments recorded for {} ({})",
                    dataset.display(),
                    hist.fingerprint
                );
                return Ok(true);
            }
            println!("History for {} ({})", dataset.display(), hist.fingerprint);
            for r in &hist.records {
                println!(
                    "  #{:<4} {}  {:>5.1}  grade {}  run {}",
                    r.seq,
                    r.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                    r.metrics.overall_score,
                    r.metrics.dataset_grade,
                    r.run_id
                );
            }
            if let Some(t) = hist.trend {
                println!(
                    "Trend: {:?} (slope {:+.2}/run, best {:.1}, worst {:.1}, mean {:.1})",
                    t.direction, t.slope, t.best_score, t.worst_score, t.average_score
                );
            }
            Ok(true)
        }
        Commands::Reports { cleanup } => {
            let manager = ReportManager::new(&config.output)?;
            if let Some(keep) = cleanup {
                let deleted = manager.cleanup(keep)?;
                println!("Deleted {deleted} old report(s)");
            }
            println!("Reports in {}", manager.reports_dir().display());
            for (kind, files) in manager.index()? {
                println!("  {kind}: {}", files.len());
                if let Some(newest) = files.first() {
                    println!("    latest: {}", file_name(newest));
                }
            }
            Ok(true)
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_list(title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("{title}:");
    for item in items {
        println!("   - {item}");
    }
}

fn print_json(outcome: &AnalysisOutcome) -> Result<()> {
    let doc = serde_json::json!({
        "run_id": outcome.run_id,
        "pipeline": outcome.run.overview(),
        "metrics": outcome.metrics(),
        "reports": outcome.run.reports(),
        "executive_summary": outcome.executive_summary,
        "previous_score": outcome.previous.as_ref().map(|p| p.metrics.overall_score),
    });
    let text = serde_json::to_string_pretty(&doc).context("cannot render JSON output")?;
    println!("{text}");
    Ok(())
}

fn print_text(dataset: &Path, outcome: &AnalysisOutcome) {
    let rule = "=".repeat(60);
    println!("{rule}");
    println!("DATASET QUALITY ASSESSMENT");
    println!("{rule}");
    println!("Dataset: {}", dataset.display());
    println!(
        "Pipeline: {}/{} steps completed in {:.1}s",
        outcome.run.summary.completed_steps,
        outcome.run.summary.total_steps,
        outcome.run.total_duration.as_secs_f64()
    );
    for (step, err) in &outcome.run.errors {
        println!("   failed {step}: {err}");
    }

    let Some(m) = outcome.metrics() else {
        println!("\nNo assessment was produced.");
        return;
    };

    println!("\nOverall score: {:.1}/100  (grade {})", m.overall_score, m.dataset_grade);
    println!("   Image quality:      {:>5.1}", m.image_quality_score);
    println!("   Annotation quality: {:>5.1}", m.annotation_quality_score);
    println!("   Completeness:       {:>5.1}", m.completeness_score);
    println!("   Diversity:          {:>5.1}", m.diversity_score);
    println!("   Consistency:        {:>5.1}", m.consistency_score);
    println!(
        "\nImages: {}  Annotations: {}  Classes: {}",
        m.total_images, m.total_annotations, m.num_classes
    );

    print_list("\nIssues", &m.issues_found);
    let top: Vec<String> = m.recommendations.iter().take(5).cloned().collect();
    print_list("\nTop recommendations", &top);

    if let Some(prev) = &outcome.previous {
        println!(
            "\nSince last assessment ({}): {:+.1} points",
            prev.recorded_at.format("%Y-%m-%d %H:%M"),
            m.overall_score - prev.metrics.overall_score
        );
    }
    if let Some(reports) = outcome.run.reports() {
        println!("\nReports written to {}:", outcome.reports_dir.display());
        for path in reports.values() {
            println!("   {}", file_name(path));
        }
    }
    if let Some(path) = &outcome.executive_summary {
        println!("   {}", file_name(path));
    }
    println!("{rule}");
}
