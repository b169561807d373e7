//! Layered configuration: built-in defaults, a JSON file merged over them,
//! then `DQA_*` environment overrides. Nothing here is fatal; problems come
//! back as warnings and the offending values fall back to defaults.

use std::path::{Path, PathBuf};

use scoring::{MinimumRequirements, QualityWeights, RecommendationConfig, ScoringConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// One week.
pub const MAX_TIMEOUT_SECONDS: u64 = 7 * 24 * 60 * 60;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `full`, `compact` or `pretty`.
    pub format: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "full".into(),
            file: Some(PathBuf::from("logs/quality_assessment.log")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Per-class minimum used by the requirement check.
    pub min_samples_per_class: u64,
    /// Overall score (as a fraction of 100) a dataset needs to pass.
    pub quality_threshold: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_samples_per_class: 50,
            quality_threshold: 0.7,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub reports_dir: PathBuf,
    pub save_detailed_report: bool,
    pub save_summary_report: bool,
    pub save_csv_report: bool,
    pub save_recommendations: bool,
    pub timestamp_format: String,
    /// Defaults to `<reports_dir>/history.json`.
    pub history_file: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            reports_dir: PathBuf::from("data/output"),
            save_detailed_report: true,
            save_summary_report: true,
            save_csv_report: true,
            save_recommendations: true,
            timestamp_format: "%Y%m%d_%H%M%S".into(),
            history_file: None,
        }
    }
}

impl OutputConfig {
    pub fn history_path(&self) -> PathBuf {
        self.history_file
            .clone()
            .unwrap_or_else(|| self.reports_dir.join("history.json"))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Image analysis logs progress every `batch_size` images.
    pub batch_size: usize,
    /// Accepted for config compatibility; steps run one at a time.
    pub max_workers: usize,
    pub timeout_seconds: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_workers: 4,
            timeout_seconds: 300,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub analysis: AnalysisConfig,
    pub quality_scoring: ScoringConfig,
    pub recommendations: RecommendationConfig,
    pub requirements: MinimumRequirements,
    pub output: OutputConfig,
    pub processing: ProcessingConfig,
}

/// A loaded config plus everything worth warning about once logging is up.
#[derive(Clone, Debug)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub source: Option<PathBuf>,
    pub warnings: Vec<String>,
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> LoadedConfig {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// `env` is injected so tests need not touch the process environment.
    pub fn load_with_env(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> LoadedConfig {
        let mut warnings = Vec::new();
        let mut source = None;

        let mut tree = match serde_json::to_value(AppConfig::default()) {
            Ok(v) => v,
            Err(e) => {
                warnings.push(format!("cannot serialize default config: {e}"));
                Value::Null
            }
        };

        if let Some(path) = path {
            match read_json(path) {
                Ok(file) => {
                    deep_merge(&mut tree, file);
                    source = Some(path.to_path_buf());
                }
                Err(msg) => warnings.push(format!("{msg}; using defaults")),
            }
        }

        let mut config: AppConfig = match serde_json::from_value(tree) {
            Ok(c) => c,
            Err(e) => {
                warnings.push(format!(
                    "config does not match the expected shape ({e}); using defaults"
                ));
                AppConfig::default()
            }
        };

        warnings.extend(config.apply_env(env));
        let problems = config.validate();
        if !problems.is_empty() {
            config.repair();
            warnings.extend(problems);
        }

        LoadedConfig {
            config,
            source,
            warnings,
        }
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(level) = env("DQA_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(dir) = env("DQA_REPORTS_DIR") {
            self.output.reports_dir = PathBuf::from(dir);
        }
        if let Some(raw) = env("DQA_TIMEOUT_SECONDS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.processing.timeout_seconds = secs,
                Err(_) => warnings.push(format!("DQA_TIMEOUT_SECONDS is not a number: '{raw}'")),
            }
        }
        warnings
    }

    /// Every problem found, in section order. Empty when the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let level = self.logging.level.trim().to_ascii_lowercase();
        if level.is_empty() {
            errors.push("logging.level is missing".to_string());
        } else if !LOG_LEVELS.contains(&level.as_str()) {
            errors.push(format!(
                "logging.level '{}' is not one of {}",
                self.logging.level,
                LOG_LEVELS.join("/")
            ));
        }
        if !(0.0..=1.0).contains(&self.analysis.quality_threshold) {
            errors.push("analysis.quality_threshold must be between 0 and 1".to_string());
        }
        let w = &self.quality_scoring.weights;
        let weights = [
            ("image_quality", w.image_quality),
            ("annotation_quality", w.annotation_quality),
            ("completeness", w.completeness),
            ("diversity", w.diversity),
            ("consistency", w.consistency),
        ];
        for (name, v) in weights {
            if !v.is_finite() || v < 0.0 {
                errors.push(format!(
                    "quality_scoring.weights.{name} must be a non-negative number"
                ));
            }
        }
        if self.output.reports_dir.as_os_str().is_empty() {
            errors.push("output.reports_dir is missing".to_string());
        }
        if self.processing.batch_size == 0 {
            errors.push("processing.batch_size must be positive".to_string());
        }
        if self.processing.max_workers == 0 {
            errors.push("processing.max_workers must be positive".to_string());
        }
        if !(1..=MAX_TIMEOUT_SECONDS).contains(&self.processing.timeout_seconds) {
            errors.push(format!(
                "processing.timeout_seconds must be between 1 and {MAX_TIMEOUT_SECONDS}"
            ));
        }
        errors
    }

    /// Reset whatever `validate` rejects.
    fn repair(&mut self) {
        let defaults = AppConfig::default();
        let level = self.logging.level.trim().to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            self.logging.level = defaults.logging.level;
        }
        if !(0.0..=1.0).contains(&self.analysis.quality_threshold) {
            self.analysis.quality_threshold = defaults.analysis.quality_threshold;
        }
        let w = &self.quality_scoring.weights;
        let bad_weight = [
            w.image_quality,
            w.annotation_quality,
            w.completeness,
            w.diversity,
            w.consistency,
        ]
        .iter()
        .any(|v| !v.is_finite() || *v < 0.0);
        if bad_weight {
            self.quality_scoring.weights = QualityWeights::default();
        }
        if self.output.reports_dir.as_os_str().is_empty() {
            self.output.reports_dir = defaults.output.reports_dir;
        }
        if self.processing.batch_size == 0 {
            self.processing.batch_size = defaults.processing.batch_size;
        }
        if self.processing.max_workers == 0 {
            self.processing.max_workers = defaults.processing.max_workers;
        }
        if !(1..=MAX_TIMEOUT_SECONDS).contains(&self.processing.timeout_seconds) {
            self.processing.timeout_seconds = defaults.processing.timeout_seconds;
        }
    }

    /// Dotted-path lookup, e.g. `quality_scoring.weights.diversity`.
    pub fn get_value(&self, key_path: &str) -> Option<Value> {
        let tree = serde_json::to_value(self).ok()?;
        let mut node = &tree;
        for key in key_path.split('.') {
            node = node.get(key)?;
        }
        Some(node.clone())
    }

    pub fn requirements(&self) -> MinimumRequirements {
        MinimumRequirements {
            min_images_per_class: self.analysis.min_samples_per_class,
            ..self.requirements.clone()
        }
    }
}

fn read_json(path: &Path) -> Result<Value, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read config {}: {e}", path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .map_err(|e| format!("malformed config {}: {e}", path.display()))?;
    if !value.is_object() {
        return Err(format!("config {} is not a JSON object", path.display()));
    }
    Ok(value)
}

/// Objects merge key by key; anything else in `overlay` replaces `base`.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_deep_merge_keeps_siblings() {
        let mut base = json!({"a": {"x": 1, "y": 2}, "list": [1, 2]});
        deep_merge(&mut base, json!({"a": {"y": 3}, "list": [9], "new": true}));
        assert_eq!(base, json!({"a": {"x": 1, "y": 3}, "list": [9], "new": true}));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let loaded = AppConfig::load_with_env(Some(Path::new("/definitely/not/here.json")), no_env);
        assert_eq!(loaded.config, AppConfig::default());
        assert!(loaded.source.is_none());
        assert_eq!(loaded.warnings.len(), 1);
    }

    #[test]
    fn test_partial_file_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"quality_scoring": {"weights": {"diversity": 0.5}}, "output": {"save_csv_report": false}}"#,
        )
        .unwrap();

        let loaded = AppConfig::load_with_env(Some(&path), no_env);
        assert!(loaded.warnings.is_empty(), "{:?}", loaded.warnings);
        let c = &loaded.config;
        assert_eq!(c.quality_scoring.weights.diversity, 0.5);
        assert_eq!(c.quality_scoring.weights.image_quality, 0.25);
        assert!(!c.output.save_csv_report);
        assert!(c.output.save_summary_report);
        assert_eq!(
            loaded.config.get_value("quality_scoring.weights.diversity"),
            Some(json!(0.5))
        );
    }

    #[test]
    fn test_malformed_file_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ nope").unwrap();
        let loaded = AppConfig::load_with_env(Some(&path), no_env);
        assert_eq!(loaded.config, AppConfig::default());
        assert!(loaded.warnings[0].contains("malformed"));
    }

    #[test]
    fn test_env_overrides() {
        let env = |k: &str| match k {
            "DQA_LOG_LEVEL" => Some("debug".to_string()),
            "DQA_REPORTS_DIR" => Some("/tmp/reports".to_string()),
            "DQA_TIMEOUT_SECONDS" => Some("42".to_string()),
            _ => None,
        };
        let c = AppConfig::load_with_env(None, env).config;
        assert_eq!(c.logging.level, "debug");
        assert_eq!(c.output.reports_dir, PathBuf::from("/tmp/reports"));
        assert_eq!(c.processing.timeout_seconds, 42);
        assert_eq!(c.output.history_path(), PathBuf::from("/tmp/reports/history.json"));
    }

    #[test]
    fn test_invalid_values_are_reported_and_repaired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"analysis": {"quality_threshold": 7}, "processing": {"batch_size": 0},
                "quality_scoring": {"weights": {"consistency": -1}}, "logging": {"level": "loud"}}"#,
        )
        .unwrap();
        let loaded = AppConfig::load_with_env(Some(&path), no_env);
        assert_eq!(loaded.warnings.len(), 4, "{:?}", loaded.warnings);
        assert!(loaded.config.validate().is_empty());
        assert_eq!(loaded.config.analysis.quality_threshold, 0.7);
        assert_eq!(loaded.config.processing.batch_size, 100);
        assert_eq!(loaded.config.quality_scoring.weights, QualityWeights::default());
        assert_eq!(loaded.config.logging.level, "info");
    }

    #[test]
    fn test_huge_timeout_is_rejected_and_repaired() {
        let mut c = AppConfig::default();
        c.processing.timeout_seconds = u64::MAX;
        assert_eq!(c.validate().len(), 1);

        let env = |k: &str| (k == "DQA_TIMEOUT_SECONDS").then(|| u64::MAX.to_string());
        let loaded = AppConfig::load_with_env(None, env);
        assert!(loaded.warnings[0].contains("timeout_seconds"), "{:?}", loaded.warnings);
        assert_eq!(loaded.config.processing.timeout_seconds, 300);

        c.processing.timeout_seconds = MAX_TIMEOUT_SECONDS;
        assert!(c.validate().is_empty());
    }

    #[test]
    fn test_get_value_unknown_path() {
        let c = AppConfig::default();
        assert_eq!(c.get_value("output.reports_dir"), Some(json!("data/output")));
        assert_eq!(c.get_value("output.nope"), None);
    }

    #[test]
    fn test_requirements_use_analysis_minimum() {
        let mut c = AppConfig::default();
        c.analysis.min_samples_per_class = 10;
        assert_eq!(c.requirements().min_images_per_class, 10);
        assert_eq!(c.requirements().min_total_images, 500);
    }
}
