//! Step definitions and the input handed to a running unit of work.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub type UnitOfWork<T, C> =
    Arc<dyn Fn(&StepInput<T, C>) -> anyhow::Result<T> + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One named unit of work. Registered once, executed at most once.
pub struct Step<T, C> {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) dependencies: Vec<String>,
    pub(crate) timeout: Duration,
    pub(crate) critical: bool,
    pub(crate) status: StepStatus,
    pub(crate) work: UnitOfWork<T, C>,
}

impl<T, C> Step<T, C> {
    pub(crate) fn new(
        name: String,
        description: String,
        dependencies: Vec<String>,
        timeout: Duration,
        work: UnitOfWork<T, C>,
    ) -> Self {
        Self {
            name,
            description,
            dependencies,
            timeout,
            critical: false,
            status: StepStatus::Pending,
            work,
        }
    }

    /// A failing critical step stops the rest of the run.
    pub fn critical(&mut self) -> &mut Self {
        self.critical = true;
        self
    }

    pub fn with_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_critical(&self) -> bool {
        self.critical
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub(crate) fn transition(&mut self, next: StepStatus) {
        debug_assert!(
            matches!(
                (self.status, next),
                (StepStatus::Pending, StepStatus::Running)
                    | (StepStatus::Pending, StepStatus::Failed)
                    | (StepStatus::Running, StepStatus::Completed)
                    | (StepStatus::Running, StepStatus::Failed)
            ),
            "illegal step transition {:?} -> {:?}",
            self.status,
            next
        );
        self.status = next;
    }
}

impl<T, C> std::fmt::Debug for Step<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("timeout", &self.timeout)
            .field("critical", &self.critical)
            .field("status", &self.status)
            .finish()
    }
}

/// What a unit of work sees: the run context, every result produced so far,
/// and a token that is cancelled when the step overruns its timeout.
pub struct StepInput<T, C> {
    ctx: Arc<C>,
    results: Arc<BTreeMap<String, Arc<T>>>,
    cancel: CancellationToken,
}

impl<T, C> StepInput<T, C> {
    pub(crate) fn new(
        ctx: Arc<C>,
        results: Arc<BTreeMap<String, Arc<T>>>,
        cancel: CancellationToken,
    ) -> Self {
        Self { ctx, results, cancel }
    }

    pub fn context(&self) -> &C {
        &self.ctx
    }

    pub fn get(&self, step: &str) -> Option<&T> {
        self.results.get(step).map(|v| v.as_ref())
    }

    /// Like `get`, but a missing upstream result is an error of this step.
    pub fn require(&self, step: &str) -> anyhow::Result<&T> {
        self.get(step)
            .ok_or_else(|| anyhow::anyhow!("no result recorded for step '{step}'"))
    }

    pub fn completed(&self) -> impl Iterator<Item = &str> {
        self.results.keys().map(String::as_str)
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
