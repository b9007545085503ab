// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::bead::{hq, AgentFields, AgentRole, Bead, BeadFields, BeadId, BeadStatus, BeadType, CleanupStatus};
use crate::event::{EventKind, StoreEvent};

/// An open issue bead, ready for dispatch.
pub fn open_issue(prefix: &str, title: &str) -> Bead {
    Bead::builder().bead_type(BeadType::Issue).title(title).status(BeadStatus::Open).build().with_prefix(prefix)
}

/// A convoy bead tracking no issues yet.
pub fn empty_convoy(title: &str) -> Bead {
    use crate::bead::{ConvoyFields, MergeStrategy};
    Bead::builder()
        .bead_type(BeadType::Convoy)
        .title(title)
        .fields(Some(BeadFields::Convoy(ConvoyFields {
            owner: None,
            subscribers: Vec::new(),
            merge_strategy: MergeStrategy::RebaseFf,
        })))
        .build()
        .with_prefix(hq::CONVOY)
}

/// An agent bead for a freshly-started session.
pub fn agent_session(role: AgentRole, session_id: &str) -> Bead {
    Bead::builder()
        .bead_type(BeadType::Agent)
        .title(session_id)
        .fields(Some(BeadFields::Agent(AgentFields {
            role,
            rig: None,
            worker_name: None,
            session_id: session_id.to_string(),
            hook_bead: None,
            cleanup_status: CleanupStatus::None,
            last_activity_ms: 1_000_000,
            done_intent_at_ms: None,
            parse_failures: 0,
        })))
        .build()
        .with_prefix(hq::AGENT)
}

pub fn closed_event(issue_id: BeadId) -> StoreEvent {
    StoreEvent::builder().kind(EventKind::Closed).issue_id(issue_id).build()
}

/// Test-only helper: rewrite a bead's id to carry a specific prefix,
/// keeping the generated random suffix intact. Lets builders produce ids
/// that route correctly in tests without hand-rolling nanoids.
trait WithPrefix {
    fn with_prefix(self, prefix: &str) -> Self;
}

impl WithPrefix for Bead {
    fn with_prefix(mut self, prefix: &str) -> Self {
        self.id = BeadId::new(prefix);
        self
    }
}
