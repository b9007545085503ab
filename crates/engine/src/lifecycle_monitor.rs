// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! The lifecycle monitor (§4.4, per rig): processes the rig's protocol
//! inbox and periodically surveys known workers. Discovery-over-tracking —
//! it holds no in-memory cache that survives a cycle; every call rebuilds
//! its view from the store.

use oj_adapters::{CliError, CliRunner, SessionHost, SessionHostError};
use oj_core::{AgentRole, BeadFields, BeadId, BeadType, CleanupStatus};
use oj_storage::{BeadPatch, BeadsStore, IssueFilter, StoreError};
use oj_wire::{ProtocolMessage, Subject};
use thiserror::Error;

use crate::orchestrator::send_message;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    SessionHost(#[from] SessionHostError),

    #[error(transparent)]
    Cli(#[from] CliError),
}

/// An action taken while processing one inbox message, for callers that
/// want to observe (and tests that want to assert) what happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboxAction {
    NukedWorkerAndNotifiedProcessor { worker: BeadId },
    OpenedCleanupWisp { worker: BeadId },
    NukedSandboxAfterMerge { mr: String },
    EscalatedForRework { mr: String },
    Ignored,
}

/// Survey verdict for one worker, per the periodic-survey rules (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurveyVerdict {
    Healthy,
    GentleNudge,
    DirectedNudge,
    EscalateDeadSession,
}

/// Idle thresholds for the periodic worker survey, in milliseconds.
pub const GENTLE_NUDGE_IDLE_MS: u64 = 5 * 60_000;
pub const DIRECTED_NUDGE_IDLE_MS: u64 = 15 * 60_000;

pub fn survey_verdict(idle_ms: u64, session_alive: bool, cleanup_status: CleanupStatus) -> SurveyVerdict {
    if !session_alive {
        return match cleanup_status {
            CleanupStatus::Clean => SurveyVerdict::Healthy,
            _ => SurveyVerdict::EscalateDeadSession,
        };
    }
    if idle_ms > DIRECTED_NUDGE_IDLE_MS {
        SurveyVerdict::DirectedNudge
    } else if idle_ms >= GENTLE_NUDGE_IDLE_MS {
        SurveyVerdict::GentleNudge
    } else {
        SurveyVerdict::Healthy
    }
}

/// Processes one rig's protocol inbox and periodic worker survey.
pub struct LifecycleMonitor<'a> {
    pub store: &'a dyn BeadsStore,
    pub sessions: &'a dyn SessionHost,
    pub cli: &'a dyn CliRunner,
    pub rig_name: String,
}

impl<'a> LifecycleMonitor<'a> {
    /// Handle one decoded protocol message addressed to this rig's
    /// monitor.
    pub async fn handle_message(&self, msg: &ProtocolMessage) -> Result<InboxAction, LifecycleError> {
        match msg.subject {
            Subject::WorkerDone => self.handle_worker_done(msg).await,
            Subject::Merged => self.handle_merged(msg).await,
            Subject::MergeFailed | Subject::ReworkRequest => self.handle_rework_needed(msg).await,
            Subject::MergeReady | Subject::HealthCheck => Ok(InboxAction::Ignored),
        }
    }

    async fn handle_worker_done(&self, msg: &ProtocolMessage) -> Result<InboxAction, LifecycleError> {
        let Some(worker) = msg.field("worker") else { return Ok(InboxAction::Ignored) };
        let worker_id = BeadId::from_string(worker);
        let clean = msg.field("cleanup_status") == Some("clean");

        if clean {
            self.sessions.kill(worker, true).await?;
            self.store.close_issue(&worker_id, "worker done, clean").unwrap_or(());
            if let Some(issue) = msg.field("issue") {
                self.notify_merge_processor(issue, &worker_id)?;
            }
            Ok(InboxAction::NukedWorkerAndNotifiedProcessor { worker: worker_id })
        } else {
            self.store.update_issue(
                &worker_id,
                BeadPatch::new().description("cleanup wisp opened: unsafe worker exit"),
            )?;
            Ok(InboxAction::OpenedCleanupWisp { worker: worker_id })
        }
    }

    async fn handle_merged(&self, msg: &ProtocolMessage) -> Result<InboxAction, LifecycleError> {
        let mr = msg.field("mr").unwrap_or_default().to_string();
        if let Some(worker) = msg.field("worker") {
            self.sessions.kill(worker, true).await.ok();
        }
        Ok(InboxAction::NukedSandboxAfterMerge { mr })
    }

    async fn handle_rework_needed(&self, msg: &ProtocolMessage) -> Result<InboxAction, LifecycleError> {
        let mr = msg.field("mr").unwrap_or_default().to_string();
        Ok(InboxAction::EscalatedForRework { mr })
    }

    /// Find the live agent bead for this rig playing `role` (discovered
    /// fresh from the store every call, per this controller's
    /// discovery-over-tracking rule).
    fn find_agent(&self, role: AgentRole) -> Result<Option<oj_core::Bead>, LifecycleError> {
        let agents = self.store.list_issues(IssueFilter { bead_type: Some(BeadType::Agent), ..Default::default() })?;
        Ok(agents
            .into_iter()
            .find(|a| a.agent_fields().map(|f| f.role == role && f.rig.as_deref() == Some(self.rig_name.as_str())).unwrap_or(false)))
    }

    /// This rig's own monitor mailbox bead, used as the `from` address on
    /// outgoing protocol messages.
    fn own_mailbox(&self) -> Result<Option<oj_core::Bead>, LifecycleError> {
        self.find_agent(AgentRole::Monitor)
    }

    /// Find the MR the just-finished worker filed against `issue` and send
    /// `MERGE_READY` to the rig's merge processor (§4.4: on clean
    /// `WORKER_DONE`, "immediately send `MERGE_READY` to the merge processor
    /// and nudge it"). A no-op if either the MR or the processor's mailbox
    /// cannot be found — the periodic survey and stranded-convoy scan
    /// recover from a missed notification.
    fn notify_merge_processor(&self, issue: &str, worker: &BeadId) -> Result<(), LifecycleError> {
        let issue_id = BeadId::from_string(issue);
        let mrs = self.store.list_issues(IssueFilter { bead_type: Some(BeadType::MergeRequest), ..Default::default() })?;
        let Some(mr) = mrs
            .into_iter()
            .find(|m| m.mr_fields().map(|f| f.source_issue == issue_id && f.worker == *worker).unwrap_or(false))
        else {
            return Ok(());
        };
        let Some(processor) = self.find_agent(AgentRole::Processor)? else { return Ok(()) };
        let from = self.own_mailbox()?.map(|m| m.id.as_str().to_string()).unwrap_or_else(|| self.rig_name.clone());

        let msg = ProtocolMessage::new(processor.id.as_str(), from, Subject::MergeReady)
            .with_field("mr", mr.id.as_str())
            .with_field("worker", worker.as_str())
            .with_field("issue", issue);
        send_message(self.store, &processor.id, &msg)?;
        Ok(())
    }

    /// Drain this rig's own monitor mailbox: parse its description as a
    /// protocol message, dispatch it via [`Self::handle_message`], then
    /// clear the mailbox. A body that fails to parse bumps the monitor's
    /// own `parse_failures` counter rather than stalling the inbox (§6.5
    /// Validation).
    pub async fn drain_inbox(&self) -> Result<Option<InboxAction>, LifecycleError> {
        let Some(mailbox) = self.own_mailbox()? else { return Ok(None) };
        if mailbox.description.trim().is_empty() {
            return Ok(None);
        }

        match ProtocolMessage::parse(&mailbox.description) {
            Ok(msg) => {
                let action = self.handle_message(&msg).await?;
                self.store.update_issue(&mailbox.id, BeadPatch::new().description(""))?;
                Ok(Some(action))
            }
            Err(err) => {
                tracing::warn!(mailbox = %mailbox.id, error = %err, "failed to parse inbox message");
                self.bump_parse_failures(&mailbox)?;
                Ok(None)
            }
        }
    }

    fn bump_parse_failures(&self, mailbox: &oj_core::Bead) -> Result<(), LifecycleError> {
        let Some(fields) = mailbox.agent_fields() else { return Ok(()) };
        let mut updated = fields.clone();
        updated.parse_failures += 1;
        self.store.update_issue(
            &mailbox.id,
            BeadPatch::new().fields(Some(BeadFields::Agent(updated))).description(""),
        )?;
        Ok(())
    }

    /// Periodic survey: rebuild the worker view from the store and the
    /// session host (no cached state from a prior cycle), and return the
    /// verdict for each worker found.
    pub async fn survey(&self, now_ms: u64) -> Result<Vec<(BeadId, SurveyVerdict)>, LifecycleError> {
        let workers = self.store.list_issues(IssueFilter { bead_type: Some(oj_core::BeadType::Agent), ..Default::default() })?;
        let mut results = Vec::new();

        for worker in workers {
            let Some(fields) = worker.agent_fields() else { continue };
            if !matches!(fields.role, AgentRole::Worker) {
                continue;
            }
            let alive = self.sessions.has_session(&fields.session_id).await.unwrap_or(false);
            let idle_ms = now_ms.saturating_sub(fields.last_activity_ms);
            let verdict = survey_verdict(idle_ms, alive, fields.cleanup_status);
            results.push((worker.id, verdict));
        }
        Ok(results)
    }
}

#[cfg(test)]
#[path = "lifecycle_monitor_tests.rs"]
mod tests;
