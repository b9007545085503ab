// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! The universal patrol-loop shape (§4.4): every long-lived controller
//! (orchestrator, lifecycle monitor, merge-processor loop) runs the same
//! cycle — `inbox-check -> domain-specific steps -> patrol-cleanup ->
//! context-check` — squashing into a fresh wisp at a "cycle" boundary and
//! starting a fresh session at a "handoff" boundary. Between cycles the
//! controller awaits a signal with exponential backoff on idle.

use std::time::Duration;

/// What a patrol cycle decided to do at its context-check step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    /// Squash the current wisp and start a new one; same session continues.
    Cycle,
    /// Squash and hand off to a fresh session.
    Handoff,
}

/// Exponential backoff on idle `await-signal` cycles, capped at 5 minutes
/// (§4.4). A signal arrival resets it.
#[derive(Debug, Clone, Copy)]
pub struct AwaitSignalBackoff {
    base: Duration,
    cap: Duration,
    idle_streak: u32,
}

impl AwaitSignalBackoff {
    pub fn new(base: Duration) -> Self {
        Self { base, cap: Duration::from_secs(300), idle_streak: 0 }
    }

    /// The delay to wait for the next idle cycle, doubling each time a
    /// cycle finds nothing to do, capped at 5 minutes.
    pub fn next_delay(&mut self) -> Duration {
        let multiplier = 1u32.checked_shl(self.idle_streak).unwrap_or(u32::MAX);
        let delay = self.base.saturating_mul(multiplier).min(self.cap);
        self.idle_streak = self.idle_streak.saturating_add(1);
        delay
    }

    /// A signal arrived: reset the backoff to its base delay.
    pub fn reset(&mut self) {
        self.idle_streak = 0;
    }
}

/// One iteration of a patrol controller's universal cycle shape. `T` is
/// whatever per-controller context the domain-specific steps need (store
/// handles, session host, CLI runner).
#[async_trait::async_trait]
pub trait PatrolController: Send + Sync {
    /// Domain-specific error surfaced from a cycle. Fatal errors escalate
    /// on a bead (§7); this trait only carries the non-fatal case since
    /// fatal propagation is handled by the caller's own error type.
    type Error: std::fmt::Display + Send;

    /// Drain the controller's inbox (protocol messages, signals).
    async fn inbox_check(&mut self) -> Result<(), Self::Error>;

    /// The domain-specific steps for this controller. Returns whether any
    /// work was found — drives the idle-backoff decision.
    async fn domain_steps(&mut self) -> Result<bool, Self::Error>;

    /// Cleanup invariants (log rotation, stale-state sweep) that run every
    /// cycle regardless of whether domain steps found work.
    async fn patrol_cleanup(&mut self) -> Result<(), Self::Error>;

    /// Decide cycle vs. handoff after a cleanup pass.
    fn context_check(&self) -> CyclePhase;
}

/// Run one full cycle of a [`PatrolController`]: inbox-check,
/// domain-specific steps, patrol-cleanup, context-check. Returns whether
/// work was found (feeds the caller's backoff) and the resulting phase.
/// A non-fatal step error is logged and treated as "no work found" so the
/// loop keeps going — the cycle *is* the retry (§7).
pub async fn run_cycle<C: PatrolController>(controller: &mut C) -> (bool, CyclePhase) {
    if let Err(err) = controller.inbox_check().await {
        tracing::warn!(error = %err, "patrol inbox-check failed, continuing");
    }

    let found_work = match controller.domain_steps().await {
        Ok(found) => found,
        Err(err) => {
            tracing::warn!(error = %err, "patrol domain steps failed, continuing");
            false
        }
    };

    if let Err(err) = controller.patrol_cleanup().await {
        tracing::warn!(error = %err, "patrol cleanup failed, continuing");
    }

    (found_work, controller.context_check())
}

#[cfg(test)]
#[path = "patrol_tests.rs"]
mod tests;
