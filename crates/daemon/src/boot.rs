// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! The boot controller (§4.1): an ephemeral, stateless decision spawned by
//! every heartbeat tick to judge start/nudge/kill for the town
//! orchestrator specifically. It carries no state of its own between
//! ticks — everything it needs is recomputed from the store and session
//! host each call — so it can never itself become a reliability concern.

use oj_core::AgentRole;

use crate::heartbeat::{controller_session_id, ExpectedController, HeartbeatReconciler, ReconcileAction};
use crate::heartbeat::HeartbeatError;
use crate::session_registry::SessionRegistry;

/// Run one boot decision for the town orchestrator. A thin, single-entry
/// specialization of [`HeartbeatReconciler::tick`]'s per-controller logic,
/// kept separate because the orchestrator's start/nudge/kill judgment is
/// spawned as its own ephemeral unit every tick rather than folded into
/// the rig-by-rig sweep.
pub async fn run_boot(
    reconciler: &HeartbeatReconciler<'_>,
    kill_registry: &mut SessionRegistry,
    cfg: &oj_core::HeartbeatConfig,
    now_ms: u64,
) -> Result<ReconcileAction, HeartbeatError> {
    let orchestrator = ExpectedController { role: AgentRole::Orchestrator, rig: None };
    reconciler.reconcile_one(&orchestrator, kill_registry, cfg, now_ms).await
}

/// The session id boot expects for the orchestrator — a thin re-export so
/// callers that only care about the orchestrator don't need to reach into
/// [`crate::heartbeat`] directly.
pub fn orchestrator_session_id() -> String {
    controller_session_id(AgentRole::Orchestrator, None)
}

#[cfg(test)]
#[path = "boot_tests.rs"]
mod tests;
