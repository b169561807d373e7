//! Sequential step pipeline
//!
//! Steps run in registration order. Declared dependencies gate a step (all
//! must have produced a result) but never reorder it. Each unit of work runs
//! under its own deadline; failures are recorded and the run continues unless
//! the failing step is critical.

mod executor;
mod run;
mod step;

pub use run::{PipelineRun, PipelineSummary, RunOverview, StepRecord};
pub use step::{Step, StepInput, StepStatus, UnitOfWork};
pub use tokio_util::sync::CancellationToken;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{error, info, warn};

use executor::{Executor, Outcome};

pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("step '{0}' is already registered")]
    DuplicateStep(String),

    #[error("step name must not be empty")]
    EmptyName,
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// A fresh pipeline is built for every run; `run` consumes it.
pub struct Pipeline<T, C = ()> {
    steps: Vec<Step<T, C>>,
    names: HashSet<String>,
    default_timeout: Duration,
}

impl<T, C> Default for Pipeline<T, C>
where
    T: Clone + Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_STEP_TIMEOUT)
    }
}

impl<T, C> Pipeline<T, C>
where
    T: Clone + Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            steps: Vec::new(),
            names: HashSet::new(),
            default_timeout,
        }
    }

    /// Register a step. Names are unique: a second registration under the
    /// same name is rejected instead of shadowing the first result.
    pub fn add_step<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        dependencies: &[&str],
        timeout: Option<Duration>,
        work: F,
    ) -> Result<&mut Step<T, C>>
    where
        F: Fn(&StepInput<T, C>) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(PipelineError::EmptyName);
        }
        if !self.names.insert(name.clone()) {
            return Err(PipelineError::DuplicateStep(name));
        }

        let step = Step::new(
            name,
            description.into(),
            dependencies.iter().map(|d| d.to_string()).collect(),
            timeout.unwrap_or(self.default_timeout),
            Arc::new(work),
        );
        self.steps.push(step);
        let last = self.steps.len() - 1;
        Ok(&mut self.steps[last])
    }

    pub fn steps(&self) -> &[Step<T, C>] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn run(mut self, ctx: C) -> PipelineRun<T> {
        let total = self.steps.len();
        info!(steps = total, "pipeline: starting");

        let started = Instant::now();
        let ctx = Arc::new(ctx);
        let mut results: BTreeMap<String, Arc<T>> = BTreeMap::new();
        let mut timings: BTreeMap<String, Duration> = BTreeMap::new();
        let mut errors: BTreeMap<String, String> = BTreeMap::new();
        let mut failed_steps: Vec<String> = Vec::new();

        let executor = match Executor::new() {
            Ok(ex) => Some(ex),
            Err(e) => {
                error!("pipeline: cannot start step executor: {e}");
                for step in self.steps.iter_mut() {
                    step.transition(StepStatus::Failed);
                    failed_steps.push(step.name.clone());
                    errors.insert(step.name.clone(), format!("executor unavailable: {e}"));
                }
                None
            }
        };

        if let Some(executor) = executor.as_ref() {
            for (i, step) in self.steps.iter_mut().enumerate() {
                info!(step = %step.name, "pipeline: step {}/{}", i + 1, total);
                if !step.description.is_empty() {
                    info!("  {}", step.description);
                }

                let missing: Vec<&str> = step
                    .dependencies
                    .iter()
                    .filter(|d| !results.contains_key(d.as_str()))
                    .map(String::as_str)
                    .collect();
                if !missing.is_empty() {
                    let msg = format!("unmet dependencies: {}", missing.join(", "));
                    error!(step = %step.name, "{msg}");
                    step.transition(StepStatus::Failed);
                    failed_steps.push(step.name.clone());
                    errors.insert(step.name.clone(), msg);
                    continue;
                }

                step.transition(StepStatus::Running);
                let input = StepInput::new(
                    ctx.clone(),
                    Arc::new(results.clone()),
                    CancellationToken::new(),
                );

                let step_started = Instant::now();
                let outcome = executor.run_bounded(step.work.clone(), input, step.timeout);
                let elapsed = step_started.elapsed();
                timings.insert(step.name.clone(), elapsed);

                let failure = match outcome {
                    Outcome::Completed(value) => {
                        results.insert(step.name.clone(), Arc::new(value));
                        step.transition(StepStatus::Completed);
                        info!(
                            step = %step.name,
                            duration_ms = elapsed.as_millis() as u64,
                            "  completed ({:.1}s)",
                            elapsed.as_secs_f64()
                        );
                        None
                    }
                    Outcome::Failed(msg) => Some(msg),
                    Outcome::TimedOut(limit) => {
                        Some(format!("timed out after {:.1}s", limit.as_secs_f64()))
                    }
                };

                if let Some(msg) = failure {
                    step.transition(StepStatus::Failed);
                    failed_steps.push(step.name.clone());
                    error!(
                        step = %step.name,
                        duration_ms = elapsed.as_millis() as u64,
                        "  failed ({:.1}s): {msg}",
                        elapsed.as_secs_f64()
                    );
                    errors.insert(step.name.clone(), msg);

                    if step.critical {
                        error!(step = %step.name, "pipeline: critical step failed, aborting run");
                        break;
                    }
                }
            }
        }
        drop(executor);

        let total_duration = started.elapsed();
        let records: Vec<StepRecord> = self
            .steps
            .iter()
            .map(|s| StepRecord {
                name: s.name.clone(),
                description: s.description.clone(),
                dependencies: s.dependencies.clone(),
                critical: s.critical,
                timeout: s.timeout,
                status: s.status,
                duration: timings.get(&s.name).copied(),
                error: errors.get(&s.name).cloned(),
            })
            .collect();
        let completed_steps: Vec<String> = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| s.name.clone())
            .collect();
        let summary = PipelineSummary::from_records(&records);

        // A worker abandoned on timeout may still hold a snapshot of earlier
        // results, so fall back to cloning.
        let results: BTreeMap<String, T> = results
            .into_iter()
            .map(|(k, v)| (k, Arc::try_unwrap(v).unwrap_or_else(|shared| (*shared).clone())))
            .collect();

        let success = failed_steps.is_empty();
        if success {
            info!("pipeline: finished in {:.1}s", total_duration.as_secs_f64());
        } else {
            warn!(
                failed = ?failed_steps,
                "pipeline: finished with {} failed step(s)",
                failed_steps.len()
            );
        }

        PipelineRun {
            success,
            total_duration,
            completed_steps,
            failed_steps,
            results,
            step_timings: timings,
            errors,
            records,
            summary,
        }
    }
}
