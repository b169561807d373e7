use std::any::Any;
use std::time::Duration;

use tokio::runtime::Runtime;

use crate::step::{StepInput, UnitOfWork};

pub(crate) enum Outcome<T> {
    Completed(T),
    Failed(String),
    TimedOut(Duration),
}

/// Runs one unit of work at a time on a blocking worker and waits for it
/// with a deadline. Overrunning workers are abandoned, never joined.
pub(crate) struct Executor {
    rt: Option<Runtime>,
}

impl Executor {
    pub(crate) fn new() -> std::io::Result<Self> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .thread_name("pipeline-step")
            .build()?;
        Ok(Self { rt: Some(rt) })
    }

    pub(crate) fn run_bounded<T, C>(
        &self,
        work: UnitOfWork<T, C>,
        input: StepInput<T, C>,
        limit: Duration,
    ) -> Outcome<T>
    where
        T: Send + Sync + 'static,
        C: Send + Sync + 'static,
    {
        let Some(rt) = self.rt.as_ref() else {
            return Outcome::Failed("executor already shut down".to_string());
        };
        let cancel = input.cancel_token().clone();

        rt.block_on(async move {
            let handle = tokio::task::spawn_blocking(move || work(&input));
            match tokio::time::timeout(limit, handle).await {
                Ok(Ok(Ok(value))) => Outcome::Completed(value),
                Ok(Ok(Err(e))) => Outcome::Failed(format!("{e:#}")),
                Ok(Err(join)) if join.is_panic() => {
                    Outcome::Failed(format!("panicked: {}", panic_message(join.into_panic())))
                }
                Ok(Err(join)) => Outcome::Failed(join.to_string()),
                Err(_) => {
                    cancel.cancel();
                    Outcome::TimedOut(limit)
                }
            }
        })
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        // Do not wait on workers that blew their deadline.
        if let Some(rt) = self.rt.take() {
            rt.shutdown_background();
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
