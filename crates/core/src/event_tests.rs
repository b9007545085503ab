use super::*;

#[test]
fn closed_event_is_closing() {
    let ev = StoreEvent::builder().kind(EventKind::Closed).build();
    assert!(ev.is_closing());
}

#[test]
fn status_changed_to_closed_is_closing() {
    let ev = StoreEvent::builder()
        .kind(EventKind::StatusChanged)
        .new_value(Some("closed".to_string()))
        .build();
    assert!(ev.is_closing());
}

#[test]
fn status_changed_to_other_value_is_not_closing() {
    let ev = StoreEvent::builder()
        .kind(EventKind::StatusChanged)
        .new_value(Some("in_progress".to_string()))
        .build();
    assert!(!ev.is_closing());
}

#[test]
fn created_and_updated_are_never_closing() {
    assert!(!StoreEvent::builder().kind(EventKind::Created).build().is_closing());
    assert!(!StoreEvent::builder().kind(EventKind::Updated).build().is_closing());
}
