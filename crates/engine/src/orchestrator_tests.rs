use super::*;
use oj_adapters::FakeCliRunner;
use oj_core::test_support::{agent_session, open_issue};
use oj_core::{AgentFields, Bead, BeadFields, GateFields, GateKind, RigBuilder};
use oj_storage::InMemoryBeadsStore;
use std::collections::HashMap;

struct NeverCloser;

#[async_trait::async_trait]
impl ExternalGateChecker for NeverCloser {
    async fn run_complete(&self, _gate_id: &BeadId) -> Result<bool, GateEvalError> {
        Ok(false)
    }

    async fn pr_approved(&self, _gate_id: &BeadId) -> Result<bool, GateEvalError> {
        Ok(false)
    }
}

fn registry_with_gt() -> RigRegistry {
    let mut registry = RigRegistry::new();
    registry.register(RigBuilder::default().name("gt").bead_prefix("gt-").build()).unwrap();
    registry
}

fn wisp(status: BeadStatus, updated_at_ms: u64) -> Bead {
    Bead::builder().bead_type(BeadType::Wisp).title("wisp").status(status).updated_at_ms(updated_at_ms).build()
}

#[test]
fn dog_pool_spawns_below_idle_floor() {
    assert_eq!(dog_pool_action(0, 1, None), DogPoolAction::SpawnDog);
    assert_eq!(dog_pool_action(1, 4, None), DogPoolAction::NoAction);
}

#[test]
fn dog_pool_never_spawns_past_the_cap() {
    assert_eq!(dog_pool_action(0, MAX_TOTAL_DOGS, None), DogPoolAction::NoAction);
}

#[test]
fn dog_pool_retires_old_idle_dog_above_floor() {
    let old_dog = BeadId::new("hq-ag-");
    let action = dog_pool_action(2, 3, Some((old_dog, DOG_IDLE_RETIRE_MS + 1)));
    assert_eq!(action, DogPoolAction::RetireIdleDog(old_dog));
}

#[test]
fn dog_pool_never_retires_below_the_idle_floor() {
    let old_dog = BeadId::new("hq-ag-");
    let action = dog_pool_action(MIN_IDLE_DOGS, 2, Some((old_dog, DOG_IDLE_RETIRE_MS + 1)));
    assert_eq!(action, DogPoolAction::NoAction);
}

#[test]
fn needs_health_check_only_with_open_work() {
    assert!(!needs_health_check(0));
    assert!(needs_health_check(1));
}

#[test]
fn expired_wisps_filters_closed_past_ttl_only() {
    let fresh = wisp(BeadStatus::Closed, 100);
    let stale = wisp(BeadStatus::Closed, 0);
    let open = wisp(BeadStatus::Open, 0);
    let now_ms = WISP_TTL_MS + 100;
    let ids = expired_wisps(&[fresh.clone(), stale.clone(), open], now_ms);
    assert_eq!(ids, vec![stale.id]);
}

#[tokio::test]
async fn evaluate_and_dispatch_gates_dispatches_unblocked_molecule() {
    let town = InMemoryBeadsStore::new();
    let registry = registry_with_gt();
    let waiter = BeadId::new("gt-");
    let gate = Bead::builder()
        .bead_type(BeadType::Gate)
        .title("gate")
        .created_at_ms(1_000)
        .fields(Some(BeadFields::Gate(GateFields { kind: GateKind::Timer, timeout_ms: Some(1_000), blocks_molecule: None, waiters: vec![waiter] })))
        .build();
    town.create_issue(gate).unwrap();

    let cli = FakeCliRunner::new();
    let checker = NeverCloser;
    let orchestrator = Orchestrator { town_store: &town, cli: &cli, gate_checker: &checker, registry: &registry };

    let (closed, dispatched) = orchestrator.evaluate_and_dispatch_gates(5_000).await.unwrap();
    assert_eq!(closed, 1);
    assert_eq!(dispatched, 1);
    assert_eq!(cli.state().slung, vec![(waiter.as_str().to_string(), "gt".to_string(), true, None)]);
}

#[tokio::test]
async fn check_fully_tracked_convoys_skips_convoys_with_open_tracked_issues() {
    let town = InMemoryBeadsStore::new();
    let registry = registry_with_gt();
    let convoy_id = town.create_issue(oj_core::test_support::empty_convoy("convoy")).unwrap();
    let issue = town.create_issue(open_issue("gt-", "a")).unwrap();
    town.add_dependency(&convoy_id, &issue, oj_core::DependencyEdgeType::Tracks).unwrap();

    let cli = FakeCliRunner::new();
    let checker = NeverCloser;
    let orchestrator = Orchestrator { town_store: &town, cli: &cli, gate_checker: &checker, registry: &registry };

    let checked = orchestrator.check_fully_tracked_convoys().await.unwrap();
    assert_eq!(checked, 0);
    assert!(cli.state().checked.is_empty());
}

#[tokio::test]
async fn check_fully_tracked_convoys_triggers_check_when_all_tracked_closed() {
    let town = InMemoryBeadsStore::new();
    let registry = registry_with_gt();
    let convoy_id = town.create_issue(oj_core::test_support::empty_convoy("convoy")).unwrap();
    let issue = town.create_issue(open_issue("gt-", "a")).unwrap();
    town.add_dependency(&convoy_id, &issue, oj_core::DependencyEdgeType::Tracks).unwrap();
    town.close_issue(&issue, "done").unwrap();

    let cli = FakeCliRunner::new();
    let checker = NeverCloser;
    let orchestrator = Orchestrator { town_store: &town, cli: &cli, gate_checker: &checker, registry: &registry };

    let checked = orchestrator.check_fully_tracked_convoys().await.unwrap();
    assert_eq!(checked, 1);
    assert_eq!(cli.state().checked, vec![Some(convoy_id.as_str().to_string())]);
}

#[tokio::test]
async fn compact_wisps_deletes_only_expired_ones() {
    let town = InMemoryBeadsStore::new();
    let registry = registry_with_gt();
    let stale_id = town.create_issue(wisp(BeadStatus::Closed, 0)).unwrap();
    let fresh_id = town.create_issue(wisp(BeadStatus::Closed, WISP_TTL_MS)).unwrap();

    let cli = FakeCliRunner::new();
    let checker = NeverCloser;
    let orchestrator = Orchestrator { town_store: &town, cli: &cli, gate_checker: &checker, registry: &registry };

    let compacted = orchestrator.compact_wisps(WISP_TTL_MS + 1).unwrap();
    assert_eq!(compacted, 1);
    assert!(town.get_issue(&stale_id).unwrap().is_none());
    assert!(town.get_issue(&fresh_id).unwrap().is_some());
}

#[tokio::test]
async fn health_scan_pings_only_rigs_with_open_work() {
    let town = InMemoryBeadsStore::new();
    let registry = registry_with_gt();
    let mut monitor = agent_session(AgentRole::Monitor, "mon-sess");
    if let Some(BeadFields::Agent(AgentFields { rig, .. })) = monitor.fields.as_mut() {
        *rig = Some("gt".to_string());
    }
    let monitor_id = town.create_issue(monitor).unwrap();

    let gt_store = InMemoryBeadsStore::new();
    gt_store.create_issue(open_issue("gt-", "open work")).unwrap();

    let cli = FakeCliRunner::new();
    let checker = NeverCloser;
    let orchestrator = Orchestrator { town_store: &town, cli: &cli, gate_checker: &checker, registry: &registry };

    let mut rig_stores: HashMap<String, &dyn oj_storage::BeadsStore> = HashMap::new();
    rig_stores.insert("gt".to_string(), &gt_store);

    let pinged = orchestrator.health_scan(&rig_stores).unwrap();
    assert_eq!(pinged, vec!["gt".to_string()]);
    let mailbox = town.get_issue(&monitor_id).unwrap().unwrap();
    assert!(mailbox.description.contains("HEALTH_CHECK"));
}

#[tokio::test]
async fn health_scan_skips_rigs_with_no_open_work() {
    let town = InMemoryBeadsStore::new();
    let registry = registry_with_gt();
    let monitor = agent_session(AgentRole::Monitor, "mon-sess");
    town.create_issue(monitor).unwrap();

    let gt_store = InMemoryBeadsStore::new();
    let cli = FakeCliRunner::new();
    let checker = NeverCloser;
    let orchestrator = Orchestrator { town_store: &town, cli: &cli, gate_checker: &checker, registry: &registry };

    let mut rig_stores: HashMap<String, &dyn oj_storage::BeadsStore> = HashMap::new();
    rig_stores.insert("gt".to_string(), &gt_store);

    let pinged = orchestrator.health_scan(&rig_stores).unwrap();
    assert!(pinged.is_empty());
}

fn dog_bead(status: BeadStatus, updated_at_ms: u64) -> Bead {
    Bead {
        fields: Some(BeadFields::Agent(AgentFields {
            role: AgentRole::Dog,
            rig: None,
            worker_name: None,
            session_id: String::new(),
            hook_bead: None,
            cleanup_status: oj_core::CleanupStatus::None,
            last_activity_ms: updated_at_ms,
            done_intent_at_ms: None,
            parse_failures: 0,
        })),
        ..Bead::builder().bead_type(BeadType::Agent).title("dog").status(status).updated_at_ms(updated_at_ms).build()
    }
}

#[tokio::test]
async fn maintain_dog_pool_spawns_a_new_dog_bead_below_the_idle_floor() {
    let town = InMemoryBeadsStore::new();
    let registry = registry_with_gt();
    let cli = FakeCliRunner::new();
    let checker = NeverCloser;
    let orchestrator = Orchestrator { town_store: &town, cli: &cli, gate_checker: &checker, registry: &registry };

    let action = orchestrator.maintain_dog_pool(1_000).unwrap();
    assert_eq!(action, DogPoolAction::SpawnDog);
    let dogs = town.list_issues(IssueFilter { bead_type: Some(BeadType::Agent), ..Default::default() }).unwrap();
    assert_eq!(dogs.len(), 1);
}

#[tokio::test]
async fn maintain_dog_pool_retires_an_old_idle_dog_above_the_floor() {
    let town = InMemoryBeadsStore::new();
    let registry = registry_with_gt();
    let cli = FakeCliRunner::new();
    let checker = NeverCloser;
    town.create_issue(dog_bead(BeadStatus::Open, 500)).unwrap();
    let old_dog = town.create_issue(dog_bead(BeadStatus::Open, 0)).unwrap();
    town.create_issue(dog_bead(BeadStatus::InProgress, 0)).unwrap();
    let orchestrator = Orchestrator { town_store: &town, cli: &cli, gate_checker: &checker, registry: &registry };

    let now_ms = DOG_IDLE_RETIRE_MS + 1;
    let action = orchestrator.maintain_dog_pool(now_ms).unwrap();
    assert!(matches!(action, DogPoolAction::RetireIdleDog(_)));
    assert_eq!(town.get_issue(&old_dog).unwrap().unwrap().status, BeadStatus::Closed);
}

fn worker_with_done_intent(done_intent_at_ms: Option<u64>) -> Bead {
    Bead {
        fields: Some(BeadFields::Agent(AgentFields {
            role: AgentRole::Worker,
            rig: Some("gt".to_string()),
            worker_name: None,
            session_id: "sess".to_string(),
            hook_bead: None,
            cleanup_status: oj_core::CleanupStatus::None,
            last_activity_ms: 0,
            done_intent_at_ms,
            parse_failures: 0,
        })),
        ..Bead::builder().bead_type(BeadType::Agent).title("worker").build()
    }
}

#[tokio::test]
async fn scan_for_zombies_files_a_warrant_for_a_stuck_done_intent() {
    let town = InMemoryBeadsStore::new();
    let registry = registry_with_gt();
    let cli = FakeCliRunner::new();
    let checker = NeverCloser;
    let stuck = town.create_issue(worker_with_done_intent(Some(0))).unwrap();
    let fresh = town.create_issue(worker_with_done_intent(Some(900_000))).unwrap();
    let orchestrator = Orchestrator { town_store: &town, cli: &cli, gate_checker: &checker, registry: &registry };

    let filed = orchestrator.scan_for_zombies(1_000_000).unwrap();
    assert_eq!(filed, vec![stuck]);
    assert!(town.get_issue(&stuck).unwrap().unwrap().description.contains("death warrant"));
    assert!(town.get_issue(&fresh).unwrap().unwrap().description.is_empty());
}

#[tokio::test]
async fn inbox_check_parses_and_clears_a_valid_message() {
    let town = InMemoryBeadsStore::new();
    let registry = registry_with_gt();
    let cli = FakeCliRunner::new();
    let checker = NeverCloser;
    town.create_issue(Bead {
        id: BeadId::from_string(ORCHESTRATOR_MAILBOX_ID),
        fields: Some(BeadFields::Agent(AgentFields {
            role: AgentRole::Orchestrator,
            rig: None,
            worker_name: None,
            session_id: String::new(),
            hook_bead: None,
            cleanup_status: oj_core::CleanupStatus::None,
            last_activity_ms: 0,
            done_intent_at_ms: None,
            parse_failures: 0,
        })),
        description: ProtocolMessage::new(ORCHESTRATOR_MAILBOX_ID, "gt-mon-1", Subject::HealthCheck)
            .with_field("target", "gt")
            .encode(),
        ..Bead::builder().bead_type(BeadType::Agent).title("orchestrator").build()
    })
    .unwrap();
    let mut orchestrator = Orchestrator { town_store: &town, cli: &cli, gate_checker: &checker, registry: &registry };

    crate::patrol::PatrolController::inbox_check(&mut orchestrator).await.unwrap();

    let mailbox = town.get_issue(&BeadId::from_string(ORCHESTRATOR_MAILBOX_ID)).unwrap().unwrap();
    assert!(mailbox.description.is_empty());
}

#[tokio::test]
async fn inbox_check_bumps_parse_failures_on_a_malformed_message() {
    let town = InMemoryBeadsStore::new();
    let registry = registry_with_gt();
    let cli = FakeCliRunner::new();
    let checker = NeverCloser;
    town.create_issue(Bead {
        id: BeadId::from_string(ORCHESTRATOR_MAILBOX_ID),
        fields: Some(BeadFields::Agent(AgentFields {
            role: AgentRole::Orchestrator,
            rig: None,
            worker_name: None,
            session_id: String::new(),
            hook_bead: None,
            cleanup_status: oj_core::CleanupStatus::None,
            last_activity_ms: 0,
            done_intent_at_ms: None,
            parse_failures: 0,
        })),
        description: "not a protocol message".to_string(),
        ..Bead::builder().bead_type(BeadType::Agent).title("orchestrator").build()
    })
    .unwrap();
    let mut orchestrator = Orchestrator { town_store: &town, cli: &cli, gate_checker: &checker, registry: &registry };

    crate::patrol::PatrolController::inbox_check(&mut orchestrator).await.unwrap();

    let mailbox = town.get_issue(&BeadId::from_string(ORCHESTRATOR_MAILBOX_ID)).unwrap().unwrap();
    assert_eq!(mailbox.agent_fields().unwrap().parse_failures, 1);
}
