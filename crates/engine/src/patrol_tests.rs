use super::*;
use std::sync::atomic::{AtomicU32, Ordering};

#[test]
fn backoff_doubles_and_caps_at_five_minutes() {
    let mut backoff = AwaitSignalBackoff::new(Duration::from_secs(1));
    assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    assert_eq!(backoff.next_delay(), Duration::from_secs(4));
    for _ in 0..20 {
        backoff.next_delay();
    }
    assert_eq!(backoff.next_delay(), Duration::from_secs(300));
}

#[test]
fn signal_resets_backoff_to_base() {
    let mut backoff = AwaitSignalBackoff::new(Duration::from_secs(1));
    backoff.next_delay();
    backoff.next_delay();
    backoff.reset();
    assert_eq!(backoff.next_delay(), Duration::from_secs(1));
}

struct CountingController {
    inbox_calls: AtomicU32,
    cleanup_calls: AtomicU32,
    work_available: bool,
    phase: CyclePhase,
}

#[async_trait::async_trait]
impl PatrolController for CountingController {
    type Error = std::convert::Infallible;

    async fn inbox_check(&mut self) -> Result<(), Self::Error> {
        self.inbox_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn domain_steps(&mut self) -> Result<bool, Self::Error> {
        Ok(self.work_available)
    }

    async fn patrol_cleanup(&mut self) -> Result<(), Self::Error> {
        self.cleanup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn context_check(&self) -> CyclePhase {
        self.phase
    }
}

#[tokio::test]
async fn run_cycle_executes_every_step_in_order() {
    let mut controller = CountingController {
        inbox_calls: AtomicU32::new(0),
        cleanup_calls: AtomicU32::new(0),
        work_available: true,
        phase: CyclePhase::Cycle,
    };

    let (found_work, phase) = run_cycle(&mut controller).await;
    assert!(found_work);
    assert_eq!(phase, CyclePhase::Cycle);
    assert_eq!(controller.inbox_calls.load(Ordering::SeqCst), 1);
    assert_eq!(controller.cleanup_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn run_cycle_reports_no_work_when_domain_steps_find_none() {
    let mut controller = CountingController {
        inbox_calls: AtomicU32::new(0),
        cleanup_calls: AtomicU32::new(0),
        work_available: false,
        phase: CyclePhase::Handoff,
    };

    let (found_work, phase) = run_cycle(&mut controller).await;
    assert!(!found_work);
    assert_eq!(phase, CyclePhase::Handoff);
}

struct FailingController;

#[async_trait::async_trait]
impl PatrolController for FailingController {
    type Error = &'static str;

    async fn inbox_check(&mut self) -> Result<(), Self::Error> {
        Err("inbox boom")
    }

    async fn domain_steps(&mut self) -> Result<bool, Self::Error> {
        Err("domain boom")
    }

    async fn patrol_cleanup(&mut self) -> Result<(), Self::Error> {
        Err("cleanup boom")
    }

    fn context_check(&self) -> CyclePhase {
        CyclePhase::Cycle
    }
}

#[tokio::test]
async fn run_cycle_survives_step_errors_and_still_completes() {
    let mut controller = FailingController;
    let (found_work, phase) = run_cycle(&mut controller).await;
    assert!(!found_work);
    assert_eq!(phase, CyclePhase::Cycle);
}
