use super::*;
use crate::heartbeat::HeartbeatReconciler;
use oj_adapters::FakeSessionHost;
use oj_core::RigRegistry;
use oj_storage::InMemoryBeadsStore;

#[tokio::test]
async fn boot_starts_an_absent_orchestrator_without_touching_rigs() {
    let store = InMemoryBeadsStore::new();
    let sessions = FakeSessionHost::new();
    let registry = RigRegistry::new();
    let reconciler = HeartbeatReconciler { store: &store, sessions: &sessions, registry: &registry, started_at_ms: 0 };
    let mut kill_registry = SessionRegistry::new();

    let action = run_boot(&reconciler, &mut kill_registry, &oj_core::HeartbeatConfig::default(), 1_000_000).await.unwrap();
    assert_eq!(action, ReconcileAction::Start);
    assert!(sessions.has_session(&orchestrator_session_id()).await.unwrap());
}

#[tokio::test]
async fn boot_is_a_no_op_for_a_fresh_healthy_orchestrator() {
    let store = InMemoryBeadsStore::new();
    let sessions = FakeSessionHost::new();
    let id = orchestrator_session_id();
    sessions.create(&id, ".", "gt patrol orchestrator", &Default::default()).await.unwrap();
    store.create_issue(oj_core::test_support::agent_session(AgentRole::Orchestrator, &id)).unwrap();
    let registry = RigRegistry::new();
    let reconciler = HeartbeatReconciler { store: &store, sessions: &sessions, registry: &registry, started_at_ms: 0 };
    let mut kill_registry = SessionRegistry::new();

    let action = run_boot(&reconciler, &mut kill_registry, &oj_core::HeartbeatConfig::default(), 1_000_000).await.unwrap();
    assert_eq!(action, ReconcileAction::None);
}
