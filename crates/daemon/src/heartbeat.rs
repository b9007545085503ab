// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! The heartbeat reconciler (§4.1): every tick, walks the expected-session
//! table (the town orchestrator plus a monitor and processor per active
//! rig) and reconciles each against the session host — start if absent,
//! nudge past 5 min idle, kill and restart past 10 min. Parked/docked rigs
//! get their stray sessions killed without a restart.

use oj_adapters::{SessionHost, SessionHostError};
use oj_core::{AgentFields, AgentRole, Bead, BeadFields, BeadId, BeadStatus, BeadType, CleanupStatus, HeartbeatConfig, RigRegistry};
use oj_storage::{BeadPatch, BeadsStore, IssueFilter, StoreError};
use std::collections::HashMap;
use thiserror::Error;

use crate::session_registry::SessionRegistry;

#[derive(Debug, Error)]
pub enum HeartbeatError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    SessionHost(#[from] SessionHostError),
}

/// One entry of the expected-session table: a controller this topology
/// expects to have a live session, keyed by role and (for per-rig roles)
/// the rig it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedController {
    pub role: AgentRole,
    pub rig: Option<String>,
}

/// The town orchestrator plus a monitor and processor for every
/// dispatchable rig. Parked/docked rigs are excluded here — their
/// sessions, if any, are strays handled by [`HeartbeatReconciler::kill_strays`]
/// rather than reconciled against this table.
pub fn expected_controllers(registry: &RigRegistry) -> Vec<ExpectedController> {
    let mut expected = vec![ExpectedController { role: AgentRole::Orchestrator, rig: None }];
    for rig in registry.active_rigs() {
        expected.push(ExpectedController { role: AgentRole::Monitor, rig: Some(rig.name.clone()) });
        expected.push(ExpectedController { role: AgentRole::Processor, rig: Some(rig.name.clone()) });
    }
    expected
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Start,
    Nudge,
    Kill,
    None,
}

/// The staleness decision for one controller (§4.1). An absent controller
/// is always started, grace period or not — the grace period only
/// suppresses judging a controller the daemon just started as stale.
pub fn reconcile_decision(present: bool, idle_ms: u64, in_grace_period: bool, cfg: &HeartbeatConfig) -> ReconcileAction {
    if !present {
        return ReconcileAction::Start;
    }
    if in_grace_period {
        return ReconcileAction::None;
    }
    if idle_ms >= cfg.kill_after_secs * 1000 {
        ReconcileAction::Kill
    } else if idle_ms >= cfg.nudge_after_secs * 1000 {
        ReconcileAction::Nudge
    } else {
        ReconcileAction::None
    }
}

/// The session-id convention this reconciler starts controllers under.
pub fn controller_session_id(role: AgentRole, rig: Option<&str>) -> String {
    match rig {
        Some(rig) => format!("hq-{rig}-{role}"),
        None => format!("hq-{role}"),
    }
}

fn controller_command(role: AgentRole, rig: Option<&str>) -> String {
    match rig {
        Some(rig) => format!("gt patrol {role} --rig {rig}"),
        None => format!("gt patrol {role}"),
    }
}

pub struct HeartbeatReconciler<'a> {
    pub store: &'a dyn BeadsStore,
    pub sessions: &'a dyn SessionHost,
    pub registry: &'a RigRegistry,
    pub started_at_ms: u64,
}

impl<'a> HeartbeatReconciler<'a> {
    fn find_controller(&self, role: AgentRole, rig: Option<&str>) -> Result<Option<Bead>, StoreError> {
        let agents = self.store.list_issues(IssueFilter { bead_type: Some(BeadType::Agent), status: None, label: None })?;
        Ok(agents
            .into_iter()
            .find(|b| b.agent_fields().map(|f| f.role == role && f.rig.as_deref() == rig).unwrap_or(false)))
    }

    async fn start_controller(&self, expected: &ExpectedController, existing: Option<&Bead>, now_ms: u64) -> Result<(), HeartbeatError> {
        let session_id = controller_session_id(expected.role, expected.rig.as_deref());
        let work_dir = expected
            .rig
            .as_deref()
            .and_then(|name| self.registry.by_name(name))
            .and_then(|rig| rig.local_repo.clone())
            .unwrap_or_else(|| ".".to_string());
        let command = controller_command(expected.role, expected.rig.as_deref());

        self.sessions.create(&session_id, &work_dir, &command, &HashMap::new()).await?;

        match existing {
            Some(bead) => {
                let mut fields = bead.agent_fields().cloned().unwrap_or(AgentFields {
                    role: expected.role,
                    rig: expected.rig.clone(),
                    worker_name: None,
                    session_id: session_id.clone(),
                    hook_bead: None,
                    cleanup_status: CleanupStatus::None,
                    last_activity_ms: now_ms,
                    done_intent_at_ms: None,
                    parse_failures: 0,
                });
                fields.session_id = session_id;
                fields.last_activity_ms = now_ms;
                self.store.update_issue(&bead.id, BeadPatch::new().fields(Some(BeadFields::Agent(fields))))?;
            }
            None => {
                let bead = Bead {
                    id: BeadId::new("hq-ag-"),
                    bead_type: BeadType::Agent,
                    title: format!("{} controller", expected.role),
                    description: String::new(),
                    status: BeadStatus::Open,
                    priority: oj_core::Priority::default(),
                    labels: Default::default(),
                    assignee: None,
                    created_at_ms: now_ms,
                    updated_at_ms: now_ms,
                    created_by: None,
                    fields: Some(BeadFields::Agent(AgentFields {
                        role: expected.role,
                        rig: expected.rig.clone(),
                        worker_name: None,
                        session_id,
                        hook_bead: None,
                        cleanup_status: CleanupStatus::None,
                        last_activity_ms: now_ms,
                        done_intent_at_ms: None,
                        parse_failures: 0,
                    })),
                };
                self.store.create_issue(bead)?;
            }
        }
        Ok(())
    }

    /// Reconcile a single expected controller against the session host.
    /// The unit both [`Self::tick`] and the standalone boot decision
    /// ([`crate::boot::run_boot`]) are built from.
    pub async fn reconcile_one(
        &self,
        expected: &ExpectedController,
        kill_registry: &mut SessionRegistry,
        cfg: &HeartbeatConfig,
        now_ms: u64,
    ) -> Result<ReconcileAction, HeartbeatError> {
        let in_grace = now_ms.saturating_sub(self.started_at_ms) < cfg.startup_grace_secs * 1000;
        let bead = self.find_controller(expected.role, expected.rig.as_deref())?;
        let (present, idle_ms, session_id) = match &bead {
            Some(b) => {
                let fields = b.agent_fields();
                let sid = fields.map(|f| f.session_id.clone()).unwrap_or_default();
                let alive = self.sessions.has_session(&sid).await?;
                let idle = now_ms.saturating_sub(fields.map(|f| f.last_activity_ms).unwrap_or(now_ms));
                (alive, idle, sid)
            }
            None => (false, 0, controller_session_id(expected.role, expected.rig.as_deref())),
        };

        let action = reconcile_decision(present, idle_ms, in_grace, cfg);
        let taken = match action {
            ReconcileAction::Kill => {
                if kill_registry.kill_allowed(&session_id, now_ms, cfg.kill_cooldown_secs * 1000) {
                    self.sessions.kill(&session_id, true).await.ok();
                    kill_registry.record_kill(&session_id, now_ms);
                    self.start_controller(expected, bead.as_ref(), now_ms).await?;
                    ReconcileAction::Kill
                } else {
                    ReconcileAction::None
                }
            }
            ReconcileAction::Nudge => {
                self.sessions.send_keys(&session_id, "").await.ok();
                ReconcileAction::Nudge
            }
            ReconcileAction::Start => {
                self.start_controller(expected, bead.as_ref(), now_ms).await?;
                ReconcileAction::Start
            }
            ReconcileAction::None => ReconcileAction::None,
        };
        Ok(taken)
    }

    /// One reconciliation pass over the expected-session table.
    pub async fn tick(
        &self,
        kill_registry: &mut SessionRegistry,
        cfg: &HeartbeatConfig,
        now_ms: u64,
    ) -> Result<Vec<(ExpectedController, ReconcileAction)>, HeartbeatError> {
        let mut results = Vec::new();
        for expected in expected_controllers(self.registry) {
            let taken = self.reconcile_one(&expected, kill_registry, cfg, now_ms).await?;
            results.push((expected, taken));
        }
        self.kill_strays().await?;
        Ok(results)
    }

    /// Kill any monitor/processor session still alive for a parked or
    /// docked rig, without restarting it (§4.1).
    async fn kill_strays(&self) -> Result<(), HeartbeatError> {
        for rig in self.registry.all() {
            if rig.state.dispatchable() {
                continue;
            }
            for role in [AgentRole::Monitor, AgentRole::Processor] {
                let Some(bead) = self.find_controller(role, Some(&rig.name))? else { continue };
                let Some(fields) = bead.agent_fields() else { continue };
                if self.sessions.has_session(&fields.session_id).await? {
                    self.sessions.kill(&fields.session_id, true).await.ok();
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
