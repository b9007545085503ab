use super::*;
use crate::store::ConfigScope;
use oj_core::test_support::open_issue;
use oj_core::{BeadFields, BeadType, MergeStrategy, MrFields};

fn mr_bead(prefix: &str, worker: BeadId) -> Bead {
    Bead::builder()
        .bead_type(BeadType::MergeRequest)
        .title("fix it")
        .fields(Some(BeadFields::MergeRequest(MrFields {
            branch: "branch/i1".into(),
            target_branch: "main".into(),
            source_issue: BeadId::new("gt-"),
            worker,
            retry_count: 0,
            convoy_id: None,
            convoy_created_at: None,
            blocked_by: None,
            merge_strategy: MergeStrategy::RebaseFf,
            claim_owner: None,
            claim_expires_at: None,
        })))
        .build()
}

#[test]
fn event_ids_are_monotone_across_two_polls() {
    let store = InMemoryBeadsStore::new();
    let a = open_issue("gt-", "a");
    let b = open_issue("gt-", "b");
    store.create_issue(a).unwrap();
    let first = store.get_all_events_since(0).unwrap();
    let max1 = first.iter().map(|e| e.id).max().unwrap();

    store.create_issue(b).unwrap();
    let second = store.get_all_events_since(max1).unwrap();
    assert!(second.iter().all(|e| e.id > max1));
}

#[test]
fn close_issue_emits_closed_event_and_is_terminal() {
    let store = InMemoryBeadsStore::new();
    let bead = open_issue("gt-", "a");
    let id = bead.id;
    store.create_issue(bead).unwrap();
    store.close_issue(&id, "done").unwrap();

    let after = store.get_issue(&id).unwrap().unwrap();
    assert_eq!(after.status, BeadStatus::Closed);
    assert!(store.close_issue(&id, "again").is_err());

    let events = store.get_all_events_since(0).unwrap();
    assert!(events.iter().any(|e| matches!(e.kind, oj_core::EventKind::Closed)));
}

#[test]
fn claim_owner_is_exclusive_until_expiry() {
    let store = InMemoryBeadsStore::new();
    let worker = BeadId::new(oj_core::hq::AGENT);
    let mr = mr_bead("gt-", worker);
    let id = store.create_issue(mr).unwrap();

    let p1 = BeadId::new(oj_core::hq::AGENT);
    let p2 = BeadId::new(oj_core::hq::AGENT);

    store.claim_owner(&id, &p1, 1_000, 500).unwrap();
    let err = store.claim_owner(&id, &p2, 1_100, 500).unwrap_err();
    assert!(matches!(err, crate::errors::ClaimError::AlreadyClaimed(_)));

    // Past expiry, a second processor may reap and succeed.
    store.claim_owner(&id, &p2, 1_600, 500).unwrap();
    let bead = store.get_issue(&id).unwrap().unwrap();
    assert_eq!(bead.mr_fields().unwrap().claim_owner, Some(p2));
}

#[test]
fn claim_owner_rejects_non_mr_beads() {
    let store = InMemoryBeadsStore::new();
    let bead = open_issue("gt-", "plain issue");
    let id = store.create_issue(bead).unwrap();
    let owner = BeadId::new(oj_core::hq::AGENT);
    assert!(matches!(store.claim_owner(&id, &owner, 0, 100), Err(crate::errors::ClaimError::NotAnMr(_))));
}

#[test]
fn dependency_edges_are_queryable_both_directions() {
    let store = InMemoryBeadsStore::new();
    let convoy = store.create_issue(open_issue(oj_core::hq::CONVOY, "convoy")).unwrap();
    let issue = store.create_issue(open_issue("gt-", "issue")).unwrap();
    store.add_dependency(&convoy, &issue, oj_core::DependencyEdgeType::Tracks).unwrap();

    let deps = store.get_dependencies_with_metadata(&convoy).unwrap();
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].other_id, issue);

    let dependents = store.get_dependents_with_metadata(&issue).unwrap();
    assert_eq!(dependents.len(), 1);
    assert_eq!(dependents[0].other_id, convoy);
}

#[test]
fn config_layering_prefers_most_specific_scope() {
    let store = InMemoryBeadsStore::new();
    store
        .set_config("escalation", ConfigScope::Town, "default", serde_json::json!({"nudge_minutes": 5, "a": 1}))
        .unwrap();
    store
        .set_config("escalation", ConfigScope::Rig("gt".into()), "default", serde_json::json!({"nudge_minutes": 10}))
        .unwrap();

    let merged = store
        .get_config_layered(
            "escalation",
            &[ConfigScope::Town, ConfigScope::Rig("gt".into())],
            "default",
        )
        .unwrap()
        .unwrap();
    assert_eq!(merged["nudge_minutes"], 10);
    assert_eq!(merged["a"], 1);
}

#[test]
fn non_close_events_list_remains_empty_after_plain_update() {
    let store = InMemoryBeadsStore::new();
    let bead = open_issue("gt-", "a");
    let id = store.create_issue(bead).unwrap();
    store.update_issue(&id, BeadPatch::new().description("touched")).unwrap();

    let events = store.get_all_events_since(0).unwrap();
    assert!(events.iter().any(|e| matches!(e.kind, oj_core::EventKind::Created)));
    assert!(!events.iter().any(|e| e.is_closing()));
}
