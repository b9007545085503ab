use super::*;

#[test]
fn config_scope_key_distinguishes_town_and_rig() {
    assert_eq!(ConfigScope::Town.key(), "*");
    assert_eq!(ConfigScope::Rig("gt".into()).key(), "gt");
}

#[test]
fn bead_patch_builder_sets_only_touched_fields() {
    let patch = BeadPatch::new().status(oj_core::BeadStatus::InProgress);
    assert_eq!(patch.status, Some(oj_core::BeadStatus::InProgress));
    assert!(patch.title.is_none());
    assert!(patch.description.is_none());
}
