use super::*;
use oj_adapters::{FakeCliRunner, FakeSessionHost};
use oj_storage::InMemoryBeadsStore;
use std::time::Duration;

fn deps() -> DaemonDeps {
    DaemonDeps {
        store: Arc::new(InMemoryBeadsStore::new()),
        rig_stores: Default::default(),
        sessions: Arc::new(FakeSessionHost::new()),
        cli: Arc::new(FakeCliRunner::default()),
        registry: RigRegistry::new(),
        heartbeat: HeartbeatConfig::default(),
        convoy_event_poll_interval: Duration::from_secs(3600),
        convoy_stranded_scan_interval: Duration::from_secs(3600),
    }
}

#[tokio::test]
async fn stop_before_start_is_a_safe_no_op() {
    let daemon = Daemon::new();
    assert!(!daemon.is_running());
    daemon.stop().await.unwrap();
    assert!(!daemon.is_running());
}

#[tokio::test]
async fn start_is_idempotent() {
    let daemon = Daemon::new();
    daemon.start(deps());
    assert!(daemon.is_running());

    // A second start() while already running must not spawn a duplicate
    // set of tasks or otherwise panic.
    daemon.start(deps());
    assert!(daemon.is_running());

    daemon.stop().await.unwrap();
}

#[tokio::test]
async fn stop_is_idempotent_and_joins_within_bound() {
    let daemon = Daemon::new();
    daemon.start(deps());

    daemon.stop().await.unwrap();
    assert!(!daemon.is_running());

    // A second stop() once already stopped is a no-op, not an error.
    daemon.stop().await.unwrap();
}

#[tokio::test]
async fn stop_cancels_background_tasks_promptly() {
    let daemon = Daemon::new();
    daemon.start(deps());

    let elapsed = {
        let start = tokio::time::Instant::now();
        daemon.stop().await.unwrap();
        start.elapsed()
    };
    assert!(elapsed < SHUTDOWN_BOUND, "stop() took {elapsed:?}, expected well under {SHUTDOWN_BOUND:?}");
}
