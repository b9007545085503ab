// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! The in-band mailbox protocol (§6.5): a human-readable `Key: Value` wire
//! format for messages routed through per-agent mailbox beads.

mod message;

pub use message::{ParseError, ProtocolMessage, Subject};

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_subject() -> impl Strategy<Value = Subject> {
        prop_oneof![
            Just(Subject::WorkerDone),
            Just(Subject::MergeReady),
            Just(Subject::Merged),
            Just(Subject::MergeFailed),
            Just(Subject::ReworkRequest),
            Just(Subject::HealthCheck),
        ]
    }

    fn required_value(field: &str) -> String {
        format!("v-{field}")
    }

    proptest! {
        #[test]
        fn any_subject_with_its_required_fields_round_trips(subject in arb_subject()) {
            let required: &[&str] = match subject {
                Subject::WorkerDone => &["worker", "branch", "issue", "cleanup_status"],
                Subject::MergeReady => &["mr", "worker", "issue"],
                Subject::Merged => &["mr", "branch", "merge_commit", "target_branch", "worker"],
                Subject::MergeFailed => &["mr", "failure_type", "error"],
                Subject::ReworkRequest => &["mr", "branch", "conflict_files"],
                Subject::HealthCheck => &["target"],
            };
            let mut msg = ProtocolMessage::new("hq-ag-to", "hq-ag-from", subject);
            for field in required {
                msg = msg.with_field(*field, required_value(field));
            }
            let encoded = msg.encode();
            let parsed = ProtocolMessage::parse(&encoded).unwrap();
            prop_assert_eq!(parsed, msg);
        }
    }
}
