// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! The orchestrator (§4.4): the town singleton. Evaluates gates and
//! dispatches what they unblock, triggers a `convoy check` on convoys whose
//! tracked issues all closed, health-scans rigs, maintains the dog pool, and
//! compacts expired ephemeral wisps. Never kills a session directly — it
//! only files a death warrant for the lifecycle monitor or heartbeat
//! reconciler to act on.

use async_trait::async_trait;
use oj_core::{AgentFields, AgentRole, Bead, BeadFields, BeadId, BeadStatus, BeadType, CleanupStatus, Priority, RigRegistry};
use oj_storage::{is_convoy_closed, BeadsStore, IssueFilter, StoreError};
use oj_wire::{ProtocolMessage, Subject};
use thiserror::Error;

use crate::gates::{evaluate_gates, ExternalGateChecker, GateEvalError};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Gate(#[from] GateEvalError),

    #[error(transparent)]
    Cli(#[from] oj_adapters::CliError),
}

/// Fixed mailbox id for the town-singleton orchestrator (§6.5: one mailbox
/// bead per agent id). Reused by [`Orchestrator::inbox_check`] and as the
/// `from` address `health_scan` already stamped on outgoing messages.
pub const ORCHESTRATOR_MAILBOX_ID: &str = "hq-orchestrator";

/// Dog pool sizing bounds (§4.4: "maintain a dog pool (>=1 idle, <=4 total;
/// optionally retire after 24h idle)").
pub const MIN_IDLE_DOGS: u32 = 1;
pub const MAX_TOTAL_DOGS: u32 = 4;
pub const DOG_IDLE_RETIRE_MS: u64 = 24 * 60 * 60 * 1000;

/// A worker still holding `done_intent_at_ms` this long after setting it is
/// stuck (§3 "Done-intent label"), matching `GateConfig`'s
/// `done_intent_stuck_secs` default.
pub const DONE_INTENT_STUCK_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DogPoolAction {
    SpawnDog,
    RetireIdleDog(BeadId),
    NoAction,
}

/// Pure dog-pool sizing decision, given the current counts and the oldest
/// idle dog's bead id and idle duration (if any). Spawning takes priority
/// over retirement in a single tick — the pool never drops below the idle
/// floor just because an old dog also happens to qualify for retirement.
pub fn dog_pool_action(idle: u32, total: u32, oldest_idle: Option<(BeadId, u64)>) -> DogPoolAction {
    if idle < MIN_IDLE_DOGS && total < MAX_TOTAL_DOGS {
        return DogPoolAction::SpawnDog;
    }
    if let Some((id, idle_ms)) = oldest_idle {
        if idle_ms > DOG_IDLE_RETIRE_MS && idle > MIN_IDLE_DOGS {
            return DogPoolAction::RetireIdleDog(id);
        }
    }
    DogPoolAction::NoAction
}

/// Whether a rig's monitor/processor should receive a `HEALTH_CHECK` this
/// cycle — only when the rig has active work (§4.4: "sending `HEALTH_CHECK`
/// only when active work exists").
pub fn needs_health_check(open_work_count: u32) -> bool {
    open_work_count > 0
}

/// A wisp older than this with no activity is compacted away.
pub const WISP_TTL_MS: u64 = 6 * 60 * 60 * 1000;

/// Ids of closed wisp beads past their TTL, eligible for deletion.
pub fn expired_wisps(wisps: &[oj_core::Bead], now_ms: u64) -> Vec<BeadId> {
    wisps
        .iter()
        .filter(|w| w.bead_type == BeadType::Wisp && w.status == BeadStatus::Closed)
        .filter(|w| now_ms.saturating_sub(w.updated_at_ms) > WISP_TTL_MS)
        .map(|w| w.id)
        .collect()
}

/// Write a protocol message into its recipient's mailbox bead (§6.5: one
/// mailbox bead per agent id).
pub fn send_message(store: &dyn BeadsStore, mailbox: &BeadId, msg: &ProtocolMessage) -> Result<(), StoreError> {
    store.update_issue(mailbox, oj_storage::BeadPatch::new().description(msg.encode()))
}

/// A zombie worker death warrant: the orchestrator never kills a session
/// directly, it records the verdict for the lifecycle monitor or heartbeat
/// reconciler to carry out.
pub fn file_death_warrant(store: &dyn BeadsStore, worker: &BeadId) -> Result<(), StoreError> {
    store.update_issue(worker, oj_storage::BeadPatch::new().description("death warrant filed: zombie worker"))
}

/// What one orchestrator cycle did, for callers that want to observe
/// progress (tests, logging).
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub gates_closed: u32,
    pub molecules_dispatched: u32,
    pub convoys_checked: u32,
    pub stranded_scanned: bool,
    pub wisps_compacted: u32,
}

pub struct Orchestrator<'a> {
    pub town_store: &'a dyn BeadsStore,
    pub cli: &'a dyn oj_adapters::CliRunner,
    pub gate_checker: &'a dyn ExternalGateChecker,
    pub registry: &'a RigRegistry,
}

impl<'a> Orchestrator<'a> {
    /// Evaluate every open gate and dispatch whatever it unblocks via
    /// `sling`. One cycle's worth of the orchestrator's gate responsibility.
    pub async fn evaluate_and_dispatch_gates(&self, now_ms: u64) -> Result<(u32, u32), OrchestratorError> {
        let closed = evaluate_gates(self.town_store, self.gate_checker, now_ms).await?;
        let mut dispatched = 0;
        for gate in &closed {
            for molecule in &gate.unblocked {
                let Some(rig) = self.registry.resolve(molecule) else { continue };
                if !rig.state.dispatchable() {
                    continue;
                }
                self.cli.sling(molecule.as_str(), &rig.name, true, None).await?;
                dispatched += 1;
            }
        }
        Ok((closed.len() as u32, dispatched))
    }

    /// Trigger `convoy check` for every non-closed convoy whose tracked
    /// issues have all closed (an out-of-band completion the event poll
    /// might have missed, e.g. after a bulk close).
    pub async fn check_fully_tracked_convoys(&self) -> Result<u32, OrchestratorError> {
        let convoys = self.town_store.list_issues(IssueFilter { bead_type: Some(BeadType::Convoy), ..Default::default() })?;
        let mut checked = 0;
        for convoy in convoys.into_iter().filter(|c| c.status != BeadStatus::Closed) {
            if is_convoy_closed(self.town_store, &convoy.id)? {
                self.cli.convoy_check(Some(convoy.id.as_str())).await?;
                checked += 1;
            }
        }
        Ok(checked)
    }

    /// Compact expired ephemeral wisps.
    pub fn compact_wisps(&self, now_ms: u64) -> Result<u32, OrchestratorError> {
        let wisps = self.town_store.list_issues(IssueFilter { bead_type: Some(BeadType::Wisp), ..Default::default() })?;
        let expired = expired_wisps(&wisps, now_ms);
        for id in &expired {
            self.town_store.delete_issue(id)?;
        }
        Ok(expired.len() as u32)
    }

    /// Health-scan every active rig: count its open, slingable work and
    /// send `HEALTH_CHECK` to its monitor mailbox only if that count is
    /// nonzero.
    pub fn health_scan(&self, rig_stores: &std::collections::HashMap<String, &dyn BeadsStore>) -> Result<Vec<String>, OrchestratorError> {
        let mut pinged = Vec::new();
        for rig in self.registry.active_rigs() {
            let Some(store) = rig_stores.get(rig.name.as_str()) else { continue };
            let open_work = store
                .list_issues(IssueFilter { status: Some(BeadStatus::Open), ..Default::default() })?
                .into_iter()
                .filter(|b| b.bead_type.is_slingable())
                .count() as u32;
            if needs_health_check(open_work) {
                let monitors = self.town_store.list_issues(IssueFilter { bead_type: Some(BeadType::Agent), ..Default::default() })?;
                if let Some(monitor) = monitors
                    .iter()
                    .find(|a| a.agent_fields().map(|f| matches!(f.role, AgentRole::Monitor) && f.rig.as_deref() == Some(rig.name.as_str())).unwrap_or(false))
                {
                    let msg = ProtocolMessage::new(monitor.id.as_str(), ORCHESTRATOR_MAILBOX_ID, Subject::HealthCheck)
                        .with_field("target", rig.name.clone());
                    send_message(self.town_store, &monitor.id, &msg)?;
                    pinged.push(rig.name.clone());
                }
            }
        }
        Ok(pinged)
    }

    /// Size the dog pool this cycle (§4.4): spawn below the idle floor,
    /// retire an old idle dog above it. A dog's own `Bead` status doubles as
    /// its idle/working state (open = idle, in_progress = working) — the
    /// orchestrator only ever records the decision on a bead; an external
    /// boot component carries out the actual `dispatch --plugin` spawn or
    /// session teardown, mirroring how [`file_death_warrant`] records
    /// intent rather than killing a session directly.
    pub fn maintain_dog_pool(&self, now_ms: u64) -> Result<DogPoolAction, OrchestratorError> {
        let dogs: Vec<Bead> = self
            .town_store
            .list_issues(IssueFilter { bead_type: Some(BeadType::Agent), ..Default::default() })?
            .into_iter()
            .filter(|a| a.agent_fields().map(|f| matches!(f.role, AgentRole::Dog)).unwrap_or(false))
            .collect();
        let total = dogs.len() as u32;
        let idle: Vec<&Bead> = dogs.iter().filter(|d| d.status == BeadStatus::Open).collect();
        let oldest_idle = idle
            .iter()
            .min_by_key(|d| d.updated_at_ms)
            .map(|d| (d.id, now_ms.saturating_sub(d.updated_at_ms)));

        let action = dog_pool_action(idle.len() as u32, total, oldest_idle);
        match &action {
            DogPoolAction::SpawnDog => {
                self.town_store.create_issue(Bead {
                    id: BeadId::new(oj_core::hq::AGENT),
                    bead_type: BeadType::Agent,
                    title: "dog".to_string(),
                    description: "dog pool: spawn requested".to_string(),
                    status: BeadStatus::Open,
                    priority: Priority::default(),
                    labels: Default::default(),
                    assignee: None,
                    created_at_ms: now_ms,
                    updated_at_ms: now_ms,
                    created_by: None,
                    fields: Some(BeadFields::Agent(AgentFields {
                        role: AgentRole::Dog,
                        rig: None,
                        worker_name: None,
                        session_id: String::new(),
                        hook_bead: None,
                        cleanup_status: CleanupStatus::None,
                        last_activity_ms: now_ms,
                        done_intent_at_ms: None,
                        parse_failures: 0,
                    })),
                })?;
            }
            DogPoolAction::RetireIdleDog(id) => {
                self.town_store.close_issue(id, "dog pool retired after idle timeout")?;
            }
            DogPoolAction::NoAction => {}
        }
        Ok(action)
    }

    /// File death warrants for workers stuck mid-`done` past
    /// [`DONE_INTENT_STUCK_MS`] (§3 "Done-intent label"). Never kills a
    /// session directly — the lifecycle monitor or heartbeat reconciler
    /// acts on the warrant.
    pub fn scan_for_zombies(&self, now_ms: u64) -> Result<Vec<BeadId>, OrchestratorError> {
        let agents = self.town_store.list_issues(IssueFilter { bead_type: Some(BeadType::Agent), ..Default::default() })?;
        let mut filed = Vec::new();
        for agent in agents {
            let Some(fields) = agent.agent_fields() else { continue };
            if !matches!(fields.role, AgentRole::Worker) {
                continue;
            }
            let Some(done_intent_at) = fields.done_intent_at_ms else { continue };
            if now_ms.saturating_sub(done_intent_at) > DONE_INTENT_STUCK_MS {
                file_death_warrant(self.town_store, &agent.id)?;
                filed.push(agent.id);
            }
        }
        Ok(filed)
    }

    /// Drain the orchestrator's own mailbox bead, parsing whatever it
    /// holds (§6.5). No subject addressed to the orchestrator has a
    /// handler of its own yet, so a successful parse is simply acknowledged
    /// by clearing the mailbox; a failed parse bumps the mailbox's
    /// `parse_failures` counter instead of stalling.
    fn drain_own_inbox(&self) -> Result<(), OrchestratorError> {
        let mailbox_id = BeadId::from_string(ORCHESTRATOR_MAILBOX_ID);
        let Some(mailbox) = self.town_store.get_issue(&mailbox_id)? else { return Ok(()) };
        if mailbox.description.trim().is_empty() {
            return Ok(());
        }

        match ProtocolMessage::parse(&mailbox.description) {
            Ok(_msg) => {
                self.town_store.update_issue(&mailbox_id, oj_storage::BeadPatch::new().description(""))?;
            }
            Err(err) => {
                tracing::warn!(error = %err, "orchestrator failed to parse inbox message");
                if let Some(fields) = mailbox.agent_fields() {
                    let mut updated = fields.clone();
                    updated.parse_failures += 1;
                    self.town_store.update_issue(
                        &mailbox_id,
                        oj_storage::BeadPatch::new().fields(Some(BeadFields::Agent(updated))).description(""),
                    )?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<'a> crate::patrol::PatrolController for Orchestrator<'a> {
    type Error = OrchestratorError;

    async fn inbox_check(&mut self) -> Result<(), Self::Error> {
        self.drain_own_inbox()
    }

    async fn domain_steps(&mut self) -> Result<bool, Self::Error> {
        let now_ms = oj_core::Clock::epoch_ms(&oj_core::SystemClock);
        let (gates_closed, dispatched) = self.evaluate_and_dispatch_gates(now_ms).await?;
        let convoys_checked = self.check_fully_tracked_convoys().await?;
        let dog_pool_action = self.maintain_dog_pool(now_ms)?;
        let zombies_filed = self.scan_for_zombies(now_ms)?;
        Ok(gates_closed > 0
            || dispatched > 0
            || convoys_checked > 0
            || dog_pool_action != DogPoolAction::NoAction
            || !zombies_filed.is_empty())
    }

    async fn patrol_cleanup(&mut self) -> Result<(), Self::Error> {
        let now_ms = oj_core::Clock::epoch_ms(&oj_core::SystemClock);
        self.compact_wisps(now_ms)?;
        Ok(())
    }

    fn context_check(&self) -> crate::patrol::CyclePhase {
        crate::patrol::CyclePhase::Cycle
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
