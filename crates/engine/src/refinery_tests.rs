use super::*;
use crate::merge_slot::MergeSlot;
use oj_adapters::{FakeGateRunner, FakeGitOps, QualityGateKind};
use oj_core::{Bead, BeadFields, BeadId, BeadStatus, BeadType, MergeStrategy, MrFields, Priority};
use oj_storage::InMemoryBeadsStore;

fn mr_bead(id: &str) -> Bead {
    Bead {
        id: BeadId::from_string(id),
        fields: Some(BeadFields::MergeRequest(MrFields {
            branch: "feature/x".to_string(),
            target_branch: "main".to_string(),
            source_issue: BeadId::from_string("gt-iss-1"),
            worker: BeadId::from_string("gt-worker-1"),
            retry_count: 0,
            convoy_id: None,
            convoy_created_at: None,
            blocked_by: None,
            merge_strategy: MergeStrategy::RebaseFf,
            claim_owner: None,
            claim_expires_at: None,
        })),
        priority: Priority::P2,
        ..Bead::builder().bead_type(BeadType::MergeRequest).title(id).build()
    }
}

fn processor<'a>(store: &'a InMemoryBeadsStore, git: &'a FakeGitOps, gates: &'a FakeGateRunner, slot: &'a MergeSlot) -> MergeProcessor<'a> {
    MergeProcessor::new(
        store,
        git,
        gates,
        slot,
        oj_core::MergeConfig::default(),
        BeadId::from_string("gt-processor-1"),
        "gt",
        "gt-",
        "main",
        std::path::PathBuf::from("/tmp/repo"),
    )
}

#[tokio::test]
async fn ok_outcome_merges_the_claimed_mr() {
    let store = InMemoryBeadsStore::new();
    store.create_issue(mr_bead("gt-mr-1")).unwrap();
    let git = FakeGitOps::new();
    git.set_shas("abc123");
    let gates = FakeGateRunner::new();
    let slot = MergeSlot::new();
    let proc = processor(&store, &git, &gates, &slot);
    let classifier = FixedVerdict(GateFailureVerdict::BranchRegression);

    let outcome = run_merge_cycle(&proc, &classifier, 1_000, Duration::from_millis(1)).await.unwrap();

    assert_eq!(outcome, CycleOutcome::Merged);
    assert_eq!(store.get_issue(&BeadId::from_string("gt-mr-1")).unwrap().unwrap().status, BeadStatus::Closed);
}

#[tokio::test]
async fn gate_fail_rejects_with_the_classifier_verdict() {
    let store = InMemoryBeadsStore::new();
    store.create_issue(mr_bead("gt-mr-2")).unwrap();
    store.create_issue(Bead {
        id: BeadId::from_string("gt-iss-1"),
        assignee: Some(BeadId::from_string("gt-worker-1")),
        status: BeadStatus::InProgress,
        ..Bead::builder().bead_type(BeadType::Issue).title("source").build()
    }).unwrap();
    let git = FakeGitOps::new();
    let gates = FakeGateRunner::new();
    gates.set(QualityGateKind::Lint, false);
    let slot = MergeSlot::new();
    let proc = processor(&store, &git, &gates, &slot);
    let classifier = FixedVerdict(GateFailureVerdict::PreExisting);

    let outcome = run_merge_cycle(&proc, &classifier, 1_000, Duration::from_millis(1)).await.unwrap();

    assert_eq!(outcome, CycleOutcome::Rejected);
    assert_eq!(store.get_issue(&BeadId::from_string("gt-mr-2")).unwrap().unwrap().status, BeadStatus::Closed);
    let bugs = store.list_issues(oj_storage::IssueFilter { bead_type: Some(BeadType::Bug), ..Default::default() }).unwrap();
    assert_eq!(bugs.len(), 1);
}

#[tokio::test]
async fn conflict_and_empty_loop_without_side_effects() {
    let store = InMemoryBeadsStore::new();
    let git = FakeGitOps::new();
    let gates = FakeGateRunner::new();
    let slot = MergeSlot::new();
    let proc = processor(&store, &git, &gates, &slot);
    let classifier = FixedVerdict(GateFailureVerdict::BranchRegression);

    // No MRs at all: `prepare` reports Empty.
    let outcome = run_merge_cycle(&proc, &classifier, 1_000, Duration::from_millis(1)).await.unwrap();
    assert_eq!(outcome, CycleOutcome::LoopAgain);

    // One MR that always conflicts on rebase.
    store.create_issue(mr_bead("gt-mr-3")).unwrap();
    git.set_rebase_outcome(oj_adapters::RebaseOutcome::Conflict { sha: "dead".to_string(), files: vec![] });
    let outcome = run_merge_cycle(&proc, &classifier, 1_000, Duration::from_millis(1)).await.unwrap();
    assert_eq!(outcome, CycleOutcome::LoopAgain);
    assert!(proc.current_claim().is_none());
}
