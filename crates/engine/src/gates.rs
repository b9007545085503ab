// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! Gate evaluation (§4.4, Orchestrator responsibilities). A gate is an
//! async coordination primitive; a closed gate may unblock a scheduled
//! molecule. Timer gates are evaluated in-process; external-run/
//! external-pr gates poll an external system via [`ExternalGateChecker`];
//! human and mail gates are closed only by external events and are never
//! polled here.

use async_trait::async_trait;
use oj_core::{BeadId, GateKind};
use oj_storage::{BeadsStore, IssueFilter, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateEvalError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("external gate check failed: {0}")]
    ExternalCheckFailed(String),
}

/// Whether a timer gate has expired: `created_at + timeout <= now`.
pub fn timer_gate_expired(created_at_ms: u64, timeout_ms: Option<u64>, now_ms: u64) -> bool {
    match timeout_ms {
        Some(timeout) => created_at_ms.saturating_add(timeout) <= now_ms,
        None => false,
    }
}

/// Polls the external systems `external-run` and `external-pr` gates
/// depend on. Implemented outside this crate (CI status API, PR review
/// state); this trait is the seam.
#[async_trait]
pub trait ExternalGateChecker: Send + Sync + 'static {
    async fn run_complete(&self, gate_id: &BeadId) -> Result<bool, GateEvalError>;
    async fn pr_approved(&self, gate_id: &BeadId) -> Result<bool, GateEvalError>;
}

/// A gate the sweep closed, carrying the molecule ids it was blocking so
/// the caller can dispatch them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedGate {
    pub gate_id: BeadId,
    pub unblocked: Vec<BeadId>,
}

/// Sweep every open gate bead, closing the ones whose condition is now
/// satisfied, and return what was unblocked for the caller to dispatch via
/// `sling`. Human and mail gates are never touched here — they close only
/// via an explicit external event handled elsewhere.
pub async fn evaluate_gates(
    store: &dyn BeadsStore,
    checker: &dyn ExternalGateChecker,
    now_ms: u64,
) -> Result<Vec<ClosedGate>, GateEvalError> {
    let gates = store.list_issues(IssueFilter { bead_type: Some(oj_core::BeadType::Gate), ..Default::default() })?;
    let mut closed = Vec::new();

    for gate in gates.into_iter().filter(|g| g.status != oj_core::BeadStatus::Closed) {
        let Some(fields) = gate.gate_fields() else { continue };
        let should_close = match fields.kind {
            GateKind::Timer => timer_gate_expired(gate.created_at_ms, fields.timeout_ms, now_ms),
            GateKind::ExternalRun => checker.run_complete(&gate.id).await?,
            GateKind::ExternalPr => checker.pr_approved(&gate.id).await?,
            GateKind::Human | GateKind::Mail => false,
        };
        if !should_close {
            continue;
        }
        store.close_issue(&gate.id, "gate condition satisfied")?;
        closed.push(ClosedGate { gate_id: gate.id, unblocked: fields.waiters.clone() });
    }

    Ok(closed)
}

#[cfg(test)]
#[path = "gates_tests.rs"]
mod tests;
