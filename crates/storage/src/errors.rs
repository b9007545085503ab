// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

use oj_core::BeadId;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("bead {0} not found")]
    NotFound(BeadId),

    #[error("invalid status transition on {id}: {from} -> {to}")]
    InvalidTransition { id: BeadId, from: &'static str, to: &'static str },

    #[error("bead {0} is already closed")]
    AlreadyClosed(BeadId),

    #[error("dependency edge {from} -> {to} would exceed traversal depth limit")]
    DepthExceeded { from: BeadId, to: BeadId },

    #[error("cyclic dependency detected starting at {0}")]
    CycleDetected(BeadId),

    #[error("snapshot (de)serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ClaimError {
    #[error("bead {0} is claimed by another owner and the claim has not expired")]
    AlreadyClaimed(BeadId),

    #[error("bead {0} is not a merge-request bead")]
    NotAnMr(BeadId),

    #[error("bead {0} not found")]
    NotFound(BeadId),
}
