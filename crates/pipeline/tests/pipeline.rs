use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pipeline::{Pipeline, PipelineError, StepStatus};

#[test]
fn test_chain_runs_in_order() {
    let mut p: Pipeline<i64> = Pipeline::default();
    p.add_step("A", "", &[], None, |_| Ok(1)).unwrap();
    p.add_step("B", "", &["A"], None, |input| {
        Ok(input.require("A")? + 10)
    })
    .unwrap();
    p.add_step("C", "", &["B"], None, |input| {
        // B must already be visible here
        let b = *input.get("B").expect("B result");
        Ok(b * 2)
    })
    .unwrap();

    let run = p.run(());
    assert!(run.success);
    assert_eq!(run.completed_steps, vec!["A", "B", "C"]);
    assert!(run.failed_steps.is_empty());
    assert_eq!(run.get("C"), Some(&22));
    assert_eq!(run.step_timings.len(), 3);
    assert!((run.summary.success_rate - 100.0).abs() < 1e-9);
}

#[test]
fn test_unmet_dependency_skips_work_and_continues() {
    let invoked = Arc::new(AtomicBool::new(false));
    let flag = invoked.clone();

    let mut p: Pipeline<&'static str> = Pipeline::default();
    p.add_step("A", "", &[], None, |_| Ok("a")).unwrap();
    p.add_step("B", "", &["Z"], None, move |_| {
        flag.store(true, Ordering::SeqCst);
        Ok("b")
    })
    .unwrap();
    p.add_step("C", "", &["A"], None, |_| Ok("c")).unwrap();

    let run = p.run(());
    assert!(!invoked.load(Ordering::SeqCst));
    assert!(!run.success);
    assert_eq!(run.failed_steps, vec!["B"]);
    assert_eq!(run.completed_steps, vec!["A", "C"]);
    assert_eq!(run.status("B"), Some(StepStatus::Failed));
    assert!(run.error("B").unwrap().contains("Z"));
    // no timing for a step that never ran
    assert!(!run.step_timings.contains_key("B"));
}

#[test]
fn test_failure_is_recorded_with_message_and_timing() {
    let mut p: Pipeline<u32> = Pipeline::default();
    p.add_step("A", "", &[], None, |_| anyhow::bail!("disk on fire")).unwrap();
    p.add_step("B", "", &[], None, |_| Ok(2)).unwrap();

    let run = p.run(());
    assert!(!run.success);
    assert_eq!(run.failed_steps, vec!["A"]);
    assert_eq!(run.completed_steps, vec!["B"]);
    assert!(run.error("A").unwrap().contains("disk on fire"));
    assert!(run.step_timings.contains_key("A"));
    assert!(run.step_timings["A"] >= Duration::ZERO);
}

#[test]
fn test_critical_failure_aborts_remaining_steps() {
    let mut p: Pipeline<u32> = Pipeline::default();
    p.add_step("load", "", &[], None, |_| anyhow::bail!("no dataset"))
        .unwrap()
        .critical();
    p.add_step("after", "", &[], None, |_| Ok(1)).unwrap();

    let run = p.run(());
    assert!(!run.success);
    assert_eq!(run.failed_steps, vec!["load"]);
    assert!(run.completed_steps.is_empty());
    assert_eq!(run.status("after"), Some(StepStatus::Pending));
    assert_eq!(run.summary.total_steps, 2);
    assert_eq!(run.summary.failed_steps, 1);
}

#[test]
fn test_dependency_failure_does_not_abort_even_when_critical() {
    let mut p: Pipeline<u32> = Pipeline::default();
    p.add_step("gate", "", &["missing"], None, |_| Ok(0))
        .unwrap()
        .critical();
    p.add_step("next", "", &[], None, |_| Ok(1)).unwrap();

    let run = p.run(());
    assert_eq!(run.failed_steps, vec!["gate"]);
    assert_eq!(run.completed_steps, vec!["next"]);
}

#[test]
fn test_timeout_fails_step_and_cancels_token() {
    let observed_cancel = Arc::new(AtomicBool::new(false));
    let seen = observed_cancel.clone();

    let mut p: Pipeline<u32> = Pipeline::default();
    p.add_step("slow", "", &[], Some(Duration::from_millis(50)), move |input| {
        for _ in 0..200 {
            if input.is_cancelled() {
                seen.store(true, Ordering::SeqCst);
                anyhow::bail!("cancelled");
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(1)
    })
    .unwrap();
    p.add_step("fast", "", &[], None, |_| Ok(2)).unwrap();

    let run = p.run(());
    assert_eq!(run.failed_steps, vec!["slow"]);
    assert!(run.error("slow").unwrap().contains("timed out"));
    assert_eq!(run.get("fast"), Some(&2));
    assert!(run.get("slow").is_none());

    // the abandoned worker notices the cancelled token shortly after
    for _ in 0..100 {
        if observed_cancel.load(Ordering::SeqCst) {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(observed_cancel.load(Ordering::SeqCst));
}

#[test]
fn test_panic_is_a_step_failure() {
    let mut p: Pipeline<u32> = Pipeline::default();
    p.add_step("boom", "", &[], None, |_| -> anyhow::Result<u32> { panic!("kaboom") })
        .unwrap();
    p.add_step("fine", "", &[], None, |_| Ok(7)).unwrap();

    let run = p.run(());
    assert_eq!(run.failed_steps, vec!["boom"]);
    assert!(run.error("boom").unwrap().contains("kaboom"));
    assert_eq!(run.get("fine"), Some(&7));
}

#[test]
fn test_duplicate_names_are_rejected() {
    let mut p: Pipeline<u32> = Pipeline::default();
    p.add_step("A", "", &[], None, |_| Ok(1)).unwrap();
    let err = p.add_step("A", "", &[], None, |_| Ok(2)).unwrap_err();
    assert!(matches!(err, PipelineError::DuplicateStep(ref n) if n == "A"));
    assert_eq!(p.len(), 1);
}

#[test]
fn test_context_is_shared_with_every_step() {
    struct Ctx {
        calls: AtomicUsize,
        base: u32,
    }

    let mut p: Pipeline<u32, Ctx> = Pipeline::default();
    p.add_step("one", "", &[], None, |input| {
        input.context().calls.fetch_add(1, Ordering::SeqCst);
        Ok(input.context().base)
    })
    .unwrap();
    p.add_step("two", "", &["one"], None, |input| {
        input.context().calls.fetch_add(1, Ordering::SeqCst);
        Ok(input.require("one")? + input.context().base)
    })
    .unwrap();

    let run = p.run(Ctx {
        calls: AtomicUsize::new(0),
        base: 5,
    });
    assert_eq!(run.get("two"), Some(&10));
}

#[test]
fn test_default_timeout_applies_when_none_given() {
    let mut p: Pipeline<u32> = Pipeline::new(Duration::from_secs(42));
    let step = p.add_step("x", "does x", &[], None, |_| Ok(0)).unwrap();
    assert_eq!(step.timeout(), Duration::from_secs(42));
    assert_eq!(step.description(), "does x");
    assert_eq!(step.status(), StepStatus::Pending);
}

#[test]
fn test_overview_serializes() {
    let mut p: Pipeline<u32> = Pipeline::default();
    p.add_step("a", "", &[], None, |_| Ok(1)).unwrap();
    let run = p.run(());
    let json = serde_json::to_value(run.overview()).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["records"][0]["status"], "completed");
}
