use super::*;
use oj_adapters::{FakeCliRunner, FakeSessionHost};
use oj_core::test_support::agent_session;
use oj_core::{Bead, BeadFields, BeadType, MergeStrategy, MrFields};
use oj_storage::InMemoryBeadsStore;

fn worker_bead(session_id: &str, role: AgentRole, cleanup_status: CleanupStatus, last_activity_ms: u64) -> Bead {
    let mut bead = agent_session(role, session_id);
    let fields = bead.agent_fields_mut().unwrap();
    fields.cleanup_status = cleanup_status;
    fields.last_activity_ms = last_activity_ms;
    bead
}

fn rig_agent(rig: &str, role: AgentRole, session_id: &str) -> Bead {
    let mut bead = agent_session(role, session_id);
    bead.agent_fields_mut().unwrap().rig = Some(rig.to_string());
    bead
}

#[tokio::test]
async fn worker_done_clean_nukes_session_and_notifies_processor() {
    let store = InMemoryBeadsStore::new();
    let sessions = FakeSessionHost::new();
    let cli = FakeCliRunner::new();

    let worker_id = store.create_issue(rig_agent("gt", AgentRole::Worker, "sess-1")).unwrap();
    sessions.create(worker_id.as_str(), "/tmp", "bash", &Default::default()).await.unwrap();
    let processor_id = store.create_issue(rig_agent("gt", AgentRole::Processor, "proc-sess")).unwrap();
    let mr_id = store
        .create_issue(Bead {
            fields: Some(BeadFields::MergeRequest(MrFields {
                branch: "feature/x".to_string(),
                target_branch: "main".to_string(),
                source_issue: BeadId::from_string("gt-iss-1"),
                worker: worker_id,
                retry_count: 0,
                convoy_id: None,
                convoy_created_at: None,
                blocked_by: None,
                merge_strategy: MergeStrategy::RebaseFf,
                claim_owner: None,
                claim_expires_at: None,
            })),
            ..Bead::builder().bead_type(BeadType::MergeRequest).title("m1").build()
        })
        .unwrap();

    let monitor = LifecycleMonitor { store: &store, sessions: &sessions, cli: &cli, rig_name: "gt".to_string() };
    let msg = ProtocolMessage::new("hq-mon-1", "sess-1", Subject::WorkerDone)
        .with_field("worker", worker_id.as_str())
        .with_field("branch", "feature/x")
        .with_field("issue", "gt-iss-1")
        .with_field("cleanup_status", "clean");

    let action = monitor.handle_message(&msg).await.unwrap();
    assert!(matches!(action, InboxAction::NukedWorkerAndNotifiedProcessor { .. }));
    assert!(!sessions.has_session(worker_id.as_str()).await.unwrap());

    let processor = store.get_issue(&processor_id).unwrap().unwrap();
    let sent = ProtocolMessage::parse(&processor.description).unwrap();
    assert_eq!(sent.subject, Subject::MergeReady);
    assert_eq!(sent.field("mr"), Some(mr_id.as_str()));
    assert_eq!(sent.field("worker"), Some(worker_id.as_str()));
    assert_eq!(sent.field("issue"), Some("gt-iss-1"));
}

#[tokio::test]
async fn worker_done_unclean_opens_cleanup_wisp_without_killing_session() {
    let store = InMemoryBeadsStore::new();
    let worker_id = store
        .create_issue(worker_bead("sess-2", AgentRole::Worker, CleanupStatus::HasUncommitted, 0))
        .unwrap();
    let sessions = FakeSessionHost::new();
    let cli = FakeCliRunner::new();
    sessions.create("sess-2", "/tmp", "bash", &Default::default()).await.unwrap();

    let monitor = LifecycleMonitor { store: &store, sessions: &sessions, cli: &cli, rig_name: "gt".to_string() };
    let msg = ProtocolMessage::new("hq-mon-1", "sess-2", Subject::WorkerDone)
        .with_field("worker", worker_id.as_str())
        .with_field("branch", "feature/y")
        .with_field("issue", "gt-iss-2")
        .with_field("cleanup_status", "has_uncommitted");

    let action = monitor.handle_message(&msg).await.unwrap();
    assert!(matches!(action, InboxAction::OpenedCleanupWisp { .. }));
    assert!(sessions.has_session("sess-2").await.unwrap());
}

#[tokio::test]
async fn merged_nukes_sandbox() {
    let store = InMemoryBeadsStore::new();
    let sessions = FakeSessionHost::new();
    let cli = FakeCliRunner::new();
    sessions.create("sess-3", "/tmp", "bash", &Default::default()).await.unwrap();

    let monitor = LifecycleMonitor { store: &store, sessions: &sessions, cli: &cli, rig_name: "gt".to_string() };
    let msg = ProtocolMessage::new("hq-mon-1", "gt-proc", Subject::Merged)
        .with_field("mr", "gt-mr-1")
        .with_field("branch", "feature/x")
        .with_field("merge_commit", "abc123")
        .with_field("target_branch", "main")
        .with_field("worker", "sess-3");

    let action = monitor.handle_message(&msg).await.unwrap();
    assert_eq!(action, InboxAction::NukedSandboxAfterMerge { mr: "gt-mr-1".to_string() });
    assert!(!sessions.has_session("sess-3").await.unwrap());
}

#[tokio::test]
async fn rework_request_escalates_without_touching_sessions() {
    let store = InMemoryBeadsStore::new();
    let sessions = FakeSessionHost::new();
    let cli = FakeCliRunner::new();

    let monitor = LifecycleMonitor { store: &store, sessions: &sessions, cli: &cli, rig_name: "gt".to_string() };
    let msg = ProtocolMessage::new("hq-mon-1", "gt-proc", Subject::ReworkRequest)
        .with_field("mr", "gt-mr-2")
        .with_field("branch", "feature/y")
        .with_field("conflict_files", "a.rs,b.rs");

    let action = monitor.handle_message(&msg).await.unwrap();
    assert_eq!(action, InboxAction::EscalatedForRework { mr: "gt-mr-2".to_string() });
}

#[test]
fn survey_verdict_matrix() {
    assert_eq!(survey_verdict(0, true, CleanupStatus::None), SurveyVerdict::Healthy);
    assert_eq!(survey_verdict(GENTLE_NUDGE_IDLE_MS, true, CleanupStatus::None), SurveyVerdict::GentleNudge);
    assert_eq!(survey_verdict(DIRECTED_NUDGE_IDLE_MS + 1, true, CleanupStatus::None), SurveyVerdict::DirectedNudge);
    assert_eq!(survey_verdict(0, false, CleanupStatus::Clean), SurveyVerdict::Healthy);
    assert_eq!(survey_verdict(0, false, CleanupStatus::HasUnpushed), SurveyVerdict::EscalateDeadSession);
}

#[tokio::test]
async fn survey_rebuilds_view_from_store_every_call() {
    let store = InMemoryBeadsStore::new();
    let worker_id = store
        .create_issue(worker_bead("sess-a", AgentRole::Worker, CleanupStatus::None, 0))
        .unwrap();
    store.create_issue(worker_bead("sess-b", AgentRole::Monitor, CleanupStatus::None, 0)).unwrap();
    let sessions = FakeSessionHost::new();
    let cli = FakeCliRunner::new();
    sessions.create("sess-a", "/tmp", "bash", &Default::default()).await.unwrap();

    let monitor = LifecycleMonitor { store: &store, sessions: &sessions, cli: &cli, rig_name: "gt".to_string() };
    let results = monitor.survey(10 * 60_000).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, worker_id);
    assert_eq!(results[0].1, SurveyVerdict::GentleNudge);
}
