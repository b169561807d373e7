//! Outcome of a single pipeline run.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::step::StepStatus;

/// Per-step record, kept in registration order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub description: String,
    pub dependencies: Vec<String>,
    pub critical: bool,
    pub timeout: Duration,
    pub status: StepStatus,
    pub duration: Option<Duration>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub total_steps: usize,
    pub completed_steps: usize,
    pub failed_steps: usize,
    pub success_rate: f64,
    pub total_time_seconds: f64,
    pub average_time_per_step: f64,
}

impl PipelineSummary {
    pub(crate) fn from_records(records: &[StepRecord]) -> Self {
        let total_steps = records.len();
        let completed_steps = records
            .iter()
            .filter(|r| r.status == StepStatus::Completed)
            .count();
        let failed_steps = records
            .iter()
            .filter(|r| r.status == StepStatus::Failed)
            .count();

        let timings: Vec<f64> = records
            .iter()
            .filter_map(|r| r.duration.map(|d| d.as_secs_f64()))
            .collect();
        let total_time_seconds: f64 = timings.iter().sum();
        let average_time_per_step = if timings.is_empty() {
            0.0
        } else {
            total_time_seconds / timings.len() as f64
        };

        let success_rate = if total_steps > 0 {
            completed_steps as f64 / total_steps as f64 * 100.0
        } else {
            0.0
        };

        Self {
            total_steps,
            completed_steps,
            failed_steps,
            success_rate,
            total_time_seconds,
            average_time_per_step,
        }
    }
}

/// Immutable result of `Pipeline::run`.
#[derive(Clone, Debug)]
pub struct PipelineRun<T> {
    pub success: bool,
    pub total_duration: Duration,
    pub completed_steps: Vec<String>,
    pub failed_steps: Vec<String>,
    pub results: BTreeMap<String, T>,
    pub step_timings: BTreeMap<String, Duration>,
    pub errors: BTreeMap<String, String>,
    pub records: Vec<StepRecord>,
    pub summary: PipelineSummary,
}

impl<T> PipelineRun<T> {
    pub fn get(&self, step: &str) -> Option<&T> {
        self.results.get(step)
    }

    pub fn status(&self, step: &str) -> Option<StepStatus> {
        self.records.iter().find(|r| r.name == step).map(|r| r.status)
    }

    pub fn error(&self, step: &str) -> Option<&str> {
        self.errors.get(step).map(String::as_str)
    }

    /// Everything but the results, for reports and logs.
    pub fn overview(&self) -> RunOverview {
        RunOverview {
            success: self.success,
            total_duration: self.total_duration,
            completed_steps: self.completed_steps.clone(),
            failed_steps: self.failed_steps.clone(),
            errors: self.errors.clone(),
            records: self.records.clone(),
            summary: self.summary.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunOverview {
    pub success: bool,
    pub total_duration: Duration,
    pub completed_steps: Vec<String>,
    pub failed_steps: Vec<String>,
    pub errors: BTreeMap<String, String>,
    pub records: Vec<StepRecord>,
    pub summary: PipelineSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, status: StepStatus, secs: Option<f64>) -> StepRecord {
        StepRecord {
            name: name.into(),
            description: String::new(),
            dependencies: vec![],
            critical: false,
            timeout: Duration::from_secs(1),
            status,
            duration: secs.map(Duration::from_secs_f64),
            error: None,
        }
    }

    #[test]
    fn test_summary_averages_only_timed_steps() {
        let records = vec![
            record("a", StepStatus::Completed, Some(1.0)),
            record("b", StepStatus::Failed, None),
            record("c", StepStatus::Failed, Some(3.0)),
            record("d", StepStatus::Completed, Some(2.0)),
        ];
        let s = PipelineSummary::from_records(&records);
        assert_eq!(s.total_steps, 4);
        assert_eq!(s.completed_steps, 2);
        assert_eq!(s.failed_steps, 2);
        assert!((s.success_rate - 50.0).abs() < 1e-9);
        assert!((s.total_time_seconds - 6.0).abs() < 1e-9);
        assert!((s.average_time_per_step - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_summary_of_empty_run() {
        let s = PipelineSummary::from_records(&[]);
        assert_eq!(s, PipelineSummary::default());
    }
}
