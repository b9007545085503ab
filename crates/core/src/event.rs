// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! Store event log entries. Every beads store emits a monotone stream of
//! these; the convoy manager polls it per store with a per-store
//! high-water mark.

use crate::bead::BeadId;
use serde::{Deserialize, Serialize};

/// Strictly monotone per-store sequence number. Never regresses across a
/// store's lifetime.
pub type EventId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Closed,
    StatusChanged,
    Updated,
}

crate::simple_display! {
    EventKind {
        Created => "created",
        Closed => "closed",
        StatusChanged => "status_changed",
        Updated => "updated",
    }
}

/// One entry in a beads store's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreEvent {
    pub id: EventId,
    pub kind: EventKind,
    pub issue_id: BeadId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
    pub timestamp_ms: u64,
}

impl StoreEvent {
    /// Whether this event should trigger a `CheckConvoysForIssue` dispatch:
    /// a `Closed` event, or a `StatusChanged` event whose new value is
    /// `"closed"`.
    pub fn is_closing(&self) -> bool {
        match self.kind {
            EventKind::Closed => true,
            EventKind::StatusChanged => self.new_value.as_deref() == Some("closed"),
            _ => false,
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
crate::builder! {
    pub struct StoreEventBuilder => StoreEvent {
        set {
            id: EventId = 1,
            kind: EventKind = EventKind::Created,
            issue_id: BeadId = BeadId::new("gt-"),
            new_value: Option<String> = None,
            timestamp_ms: u64 = 1_000_000,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
