// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! The merge-slot mutual-exclusion primitive (§4.3 step d): at most one MR
//! may hold the slot that guards conflict-resolution task creation for a
//! rig at a time. Re-entrant for the MR that already holds it; a stale
//! claim (holder never released before its lease expired) is recovered by
//! the next acquirer rather than blocking forever.

use oj_core::BeadId;
use parking_lot::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
struct SlotState {
    held_by: Option<BeadId>,
    expires_at_ms: u64,
}

/// One decision `acquire` can reach on a single poll of the slot.
#[derive(Debug, PartialEq, Eq)]
enum SlotDecision {
    Acquired,
    Wait,
}

fn decide(state: &mut SlotState, mr_id: &BeadId, now_ms: u64, hold_ms: u64) -> SlotDecision {
    let free = match &state.held_by {
        None => true,
        Some(holder) => holder == mr_id || state.expires_at_ms <= now_ms,
    };
    if !free {
        return SlotDecision::Wait;
    }
    state.held_by = Some(mr_id.clone());
    state.expires_at_ms = now_ms + hold_ms;
    SlotDecision::Acquired
}

/// Guards conflict-task creation for one rig. A rig has exactly one
/// `MergeSlot` shared across every MR the merge processor considers.
#[derive(Default)]
pub struct MergeSlot {
    state: Mutex<SlotState>,
}

impl MergeSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks (via backoff sleeps, not busy-waiting) until `mr_id` holds the
    /// slot, re-entering immediately if it already does. `now_ms` is sampled
    /// fresh on every poll so callers can drive this under a paused or fake
    /// clock in tests.
    pub async fn acquire(
        &self,
        mr_id: &BeadId,
        hold_ms: u64,
        backoff_base_ms: u64,
        backoff_max_ms: u64,
        mut now_ms: impl FnMut() -> u64,
    ) {
        let mut backoff = backoff_base_ms.max(1);
        loop {
            let now = now_ms();
            let decision = {
                let mut state = self.state.lock();
                decide(&mut state, mr_id, now, hold_ms)
            };
            if decision == SlotDecision::Acquired {
                return;
            }
            tokio::time::sleep(Duration::from_millis(backoff)).await;
            backoff = (backoff * 2).min(backoff_max_ms.max(backoff_base_ms.max(1)));
        }
    }

    /// Releases the slot if `mr_id` is the current holder. A release from a
    /// non-holder (e.g. a claim that already expired and was reclaimed by
    /// another MR) is a no-op.
    pub fn release(&self, mr_id: &BeadId) {
        let mut state = self.state.lock();
        if state.held_by.as_ref() == Some(mr_id) {
            state.held_by = None;
            state.expires_at_ms = 0;
        }
    }

    /// True if `mr_id` currently holds the slot (for tests and diagnostics).
    pub fn is_held_by(&self, mr_id: &BeadId) -> bool {
        self.state.lock().held_by.as_ref() == Some(mr_id)
    }
}

#[cfg(test)]
#[path = "merge_slot_tests.rs"]
mod tests;
