use super::*;

#[test]
fn bead_id_prefix_roundtrip() {
    let id = BeadId::new("gt-");
    assert!(id.prefix().starts_with("gt-"));
    assert_eq!(id.as_str().len(), id.prefix().len() + crate::id::ID_SUFFIX_LEN);
}

#[test]
fn bead_id_hq_family_prefixes() {
    let convoy = BeadId::new(hq::CONVOY);
    assert!(convoy.as_str().starts_with("hq-cv-"));
    let agent = BeadId::new(hq::AGENT);
    assert!(agent.as_str().starts_with("hq-ag-"));
    let gate = BeadId::new(hq::GATE);
    assert!(gate.as_str().starts_with("hq-gt-"));
}

#[test]
fn status_transitions_follow_lifecycle() {
    assert!(BeadStatus::Open.can_transition_to(BeadStatus::InProgress));
    assert!(BeadStatus::InProgress.can_transition_to(BeadStatus::Closed));
    assert!(BeadStatus::Closed.can_transition_to(BeadStatus::Open)); // explicit reopen
    assert!(!BeadStatus::Closed.can_transition_to(BeadStatus::InProgress));
}

#[test]
fn priority_clamps_out_of_range() {
    assert_eq!(Priority::new(9).get(), 4);
    assert_eq!(Priority::new(0).get(), 0);
    assert_eq!(Priority::default(), Priority::P2);
}

#[test]
fn bead_type_slingable_matrix() {
    assert!(BeadType::Issue.is_slingable());
    assert!(BeadType::Task.is_slingable());
    assert!(BeadType::Bug.is_slingable());
    assert!(!BeadType::Epic.is_slingable());
    assert!(!BeadType::MergeRequest.is_slingable());
    assert!(!BeadType::Convoy.is_slingable());
}

#[test]
fn ready_for_dispatch_requires_open_unassigned_slingable() {
    let open = Bead::builder().status(BeadStatus::Open).build();
    assert!(open.is_ready_for_dispatch());

    let assigned = Bead::builder().status(BeadStatus::Open).assignee(Some(BeadId::new("gt-"))).build();
    assert!(!assigned.is_ready_for_dispatch());

    let epic = Bead::builder().bead_type(BeadType::Epic).build();
    assert!(!epic.is_ready_for_dispatch());
}

#[test]
fn mr_fields_round_trip_through_json() {
    let mr = MrFields {
        branch: "branch/i1".into(),
        target_branch: "main".into(),
        source_issue: BeadId::new("gt-"),
        worker: BeadId::new(hq::AGENT),
        retry_count: 0,
        convoy_id: None,
        convoy_created_at: None,
        blocked_by: None,
        merge_strategy: MergeStrategy::RebaseFf,
        claim_owner: None,
        claim_expires_at: None,
    };
    let bead = Bead::builder()
        .bead_type(BeadType::MergeRequest)
        .fields(Some(BeadFields::MergeRequest(mr.clone())))
        .build();
    let json = serde_json::to_string(&bead).unwrap();
    let back: Bead = serde_json::from_str(&json).unwrap();
    assert_eq!(back.mr_fields().unwrap(), &mr);
}

#[test]
fn default_merge_strategy_is_rebase_ff() {
    assert_eq!(MergeStrategy::default(), MergeStrategy::RebaseFf);
}
