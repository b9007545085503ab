use super::*;

#[test]
fn first_kill_is_always_allowed() {
    let registry = SessionRegistry::new();
    assert!(registry.kill_allowed("hq-orchestrator", 0, 300_000));
}

#[test]
fn kill_blocked_within_cooldown_window() {
    let mut registry = SessionRegistry::new();
    registry.record_kill("hq-orchestrator", 1_000);
    assert!(!registry.kill_allowed("hq-orchestrator", 1_000 + 299_999, 300_000));
}

#[test]
fn kill_allowed_once_cooldown_elapses() {
    let mut registry = SessionRegistry::new();
    registry.record_kill("hq-orchestrator", 1_000);
    assert!(registry.kill_allowed("hq-orchestrator", 1_000 + 300_000, 300_000));
}

#[test]
fn cooldown_is_tracked_independently_per_session() {
    let mut registry = SessionRegistry::new();
    registry.record_kill("gt-monitor", 1_000);
    assert!(registry.kill_allowed("gt-processor", 1_000, 300_000));
}
