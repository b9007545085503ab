// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! The merge processor's deterministic pipeline (§4.3): claim the
//! highest-scoring unblocked MR, rebase it on its target, run the
//! configured quality gates, and either merge, park it behind a
//! conflict-resolution task, or hand a gate failure back to the patrol
//! formula for classification. `refinery.rs` only chains the three
//! operations here (`prepare`/`merge`/`reject`) — the actual pipeline
//! steps live in this file.

use crate::merge_slot::MergeSlot;
use crate::orchestrator::send_message;
use crate::scoring::MrScoreInputs;
use oj_adapters::{GateRunError, GitError, GitOps, QualityGateRunner, QUALITY_GATE_ORDER};
use oj_core::{AgentRole, Bead, BeadFields, BeadId, BeadStatus, BeadType, MergeConfig, MergeStrategy, MrFields, Priority};
use oj_storage::{BeadPatch, BeadsStore, ClaimError, IssueFilter, StoreError};
use oj_wire::{ProtocolMessage, Subject};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Gate(#[from] GateRunError),

    #[error("no MR is currently claimed")]
    NoClaim,

    #[error("pushed branch {branch} does not match the verified remote SHA (local {local}, remote {remote})")]
    PushVerificationFailed { branch: String, local: String, remote: String },
}

/// Structured exit code for `prepare`, read by the patrol formula in
/// `refinery.rs` (§4.4 Merge-Processor controller).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareOutcome {
    Ok,
    Conflict,
    GateFail,
    Empty,
    Infra,
}

/// Structured metadata carried by a conflict-resolution task's description
/// (§4.3 step d). Tasks have no dedicated `BeadFields` variant, so this is
/// encoded the same `Key: Value` way the wire protocol encodes messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictTaskInfo {
    pub conflict_branch: String,
    pub target_branch: String,
    pub conflict_sha: String,
    pub conflict_files: Vec<String>,
}

impl ConflictTaskInfo {
    pub fn encode(&self) -> String {
        format!(
            "conflict_branch: {}\ntarget_branch: {}\nconflict_sha: {}\nconflict_files: {}\n",
            self.conflict_branch,
            self.target_branch,
            self.conflict_sha,
            self.conflict_files.join(","),
        )
    }

    pub fn decode(body: &str) -> Option<Self> {
        let mut raw: BTreeMap<&str, &str> = BTreeMap::new();
        for line in body.lines() {
            let Some((key, value)) = line.split_once(':') else { continue };
            raw.insert(key.trim(), value.trim());
        }
        Some(Self {
            conflict_branch: raw.get("conflict_branch")?.to_string(),
            target_branch: raw.get("target_branch")?.to_string(),
            conflict_sha: raw.get("conflict_sha")?.to_string(),
            conflict_files: raw
                .get("conflict_files")
                .map(|s| s.split(',').filter(|f| !f.is_empty()).map(str::to_string).collect())
                .unwrap_or_default(),
        })
    }
}

/// How a gate failure resolves (§4.4: "the single LLM judgment point").
/// Lives here rather than `refinery.rs` since [`MergeProcessor::reject`]
/// branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateFailureVerdict {
    BranchRegression,
    PreExisting,
}

impl GateFailureVerdict {
    pub fn reason(&self) -> &'static str {
        match self {
            GateFailureVerdict::BranchRegression => "branch regression",
            GateFailureVerdict::PreExisting => "pre-existing failure on target branch",
        }
    }
}

/// Runs the §4.3 pipeline for one rig's merge-request queue against a
/// single long-lived checkout of that rig's repository.
pub struct MergeProcessor<'a> {
    pub store: &'a dyn BeadsStore,
    pub git: &'a dyn GitOps,
    pub gates: &'a dyn QualityGateRunner,
    pub merge_slot: &'a MergeSlot,
    pub config: MergeConfig,
    pub processor_id: BeadId,
    pub rig_name: String,
    pub bead_prefix: String,
    pub default_branch: String,
    pub workdir: PathBuf,
    current_claim: parking_lot::Mutex<Option<BeadId>>,
}

/// How long a conflict-task creation critical section may hold the merge
/// slot before it is considered stale and reaped by the next contender.
const CONFLICT_TASK_SLOT_HOLD_MS: u64 = 30_000;

impl<'a> MergeProcessor<'a> {
    pub fn new(
        store: &'a dyn BeadsStore,
        git: &'a dyn GitOps,
        gates: &'a dyn QualityGateRunner,
        merge_slot: &'a MergeSlot,
        config: MergeConfig,
        processor_id: BeadId,
        rig_name: impl Into<String>,
        bead_prefix: impl Into<String>,
        default_branch: impl Into<String>,
        workdir: PathBuf,
    ) -> Self {
        Self {
            store,
            git,
            gates,
            merge_slot,
            config,
            processor_id,
            rig_name: rig_name.into(),
            bead_prefix: bead_prefix.into(),
            default_branch: default_branch.into(),
            workdir,
            current_claim: parking_lot::Mutex::new(None),
        }
    }

    pub fn current_claim(&self) -> Option<BeadId> {
        *self.current_claim.lock()
    }

    /// Reattach to an MR this processor already holds a live claim on,
    /// for a caller that did not itself call `prepare` in this process
    /// (the CLI's operator-triggered `merge`/`reject`, run as a separate
    /// invocation from whatever called `prepare`).
    pub fn resume_claim(&self, mr_id: BeadId) -> Result<(), MergeError> {
        let mr = self.store.get_issue(&mr_id)?.ok_or(MergeError::NoClaim)?;
        let fields = mr.mr_fields().ok_or(MergeError::NoClaim)?;
        if fields.claim_owner != Some(self.processor_id) {
            return Err(MergeError::NoClaim);
        }
        *self.current_claim.lock() = Some(mr_id);
        Ok(())
    }

    /// Claim the highest-scoring unblocked open MR (§4.3 Scoring, Claim),
    /// rebase it onto its target, and run the quality-gate pipeline.
    /// Returns a structured exit code rather than erroring on the
    /// business-logic outcomes a patrol formula loops on.
    pub async fn prepare(&self, now_ms: u64) -> Result<PrepareOutcome, MergeError> {
        let Some(mr_id) = self.claim_next(now_ms)? else { return Ok(PrepareOutcome::Empty) };
        let Some(mr) = self.store.get_issue(&mr_id)? else {
            self.store.release_claim(&mr_id)?;
            return Ok(PrepareOutcome::Infra);
        };
        let Some(fields) = mr.mr_fields().cloned() else {
            self.store.release_claim(&mr_id)?;
            return Ok(PrepareOutcome::Infra);
        };

        *self.current_claim.lock() = Some(mr_id);

        self.git.fetch(&fields.target_branch).await?;
        self.git.fetch(&fields.branch).await?;
        self.git.checkout(&fields.branch).await?;

        let squash = fields.merge_strategy == MergeStrategy::Squash;
        let rebase = self.git.rebase_onto(&fields.target_branch, squash).await?;

        let conflict = match rebase {
            oj_adapters::RebaseOutcome::Clean => None,
            oj_adapters::RebaseOutcome::Conflict { sha, files } => Some((sha, files)),
        };

        if let Some((sha, files)) = conflict {
            self.open_conflict_task(&mr_id, &fields, &sha, files, now_ms).await?;
            *self.current_claim.lock() = None;
            return Ok(PrepareOutcome::Conflict);
        }

        for gate in QUALITY_GATE_ORDER {
            if !self.gates.run(gate, &self.workdir).await? {
                tracing::warn!(mr = %mr_id, gate = gate.as_str(), "quality gate failed");
                return Ok(PrepareOutcome::GateFail);
            }
        }

        Ok(PrepareOutcome::Ok)
    }

    /// Pick the highest-scoring open, unblocked MR and claim it via the
    /// store's CAS `claim_owner` (§4.3 Claim). A claim race against another
    /// processor falls through to the next-highest candidate rather than
    /// erroring — the loser simply finds nothing this cycle.
    fn claim_next(&self, now_ms: u64) -> Result<Option<BeadId>, MergeError> {
        let open_mrs = self.store.list_issues(IssueFilter {
            bead_type: Some(BeadType::MergeRequest),
            status: Some(BeadStatus::Open),
            ..Default::default()
        })?;

        let mut candidates: Vec<(BeadId, MrScoreInputs)> = Vec::new();
        for mr in open_mrs {
            let Some(fields) = mr.mr_fields() else { continue };
            if let Some(blocker) = fields.blocked_by {
                match self.store.get_issue(&blocker)? {
                    Some(task) if task.status == BeadStatus::Closed => {
                        self.store.update_issue(&mr.id, BeadPatch::new().fields(Some(BeadFields::MergeRequest(MrFields {
                            blocked_by: None,
                            ..fields.clone()
                        }))))?;
                    }
                    _ => continue,
                }
            }

            let hours_since_mr_created = now_ms.saturating_sub(mr.created_at_ms) as f64 / 3_600_000.0;
            let hours_since_convoy_created = fields
                .convoy_created_at
                .map(|t| now_ms.saturating_sub(t) as f64 / 3_600_000.0)
                .unwrap_or(0.0);

            candidates.push((
                mr.id,
                MrScoreInputs {
                    priority: mr.priority,
                    retry_count: fields.retry_count,
                    hours_since_convoy_created,
                    hours_since_mr_created,
                },
            ));
        }

        candidates.sort_by(|a, b| {
            crate::scoring::score(b.1).partial_cmp(&crate::scoring::score(a.1)).unwrap_or(std::cmp::Ordering::Equal)
        });

        for (mr_id, _) in candidates {
            match self.store.claim_owner(&mr_id, &self.processor_id, now_ms, self.config.claim_ttl_secs * 1000) {
                Ok(()) => {
                    self.store.update_issue(&mr_id, BeadPatch::new().status(BeadStatus::InProgress))?;
                    return Ok(Some(mr_id));
                }
                Err(ClaimError::AlreadyClaimed(_)) => continue,
                Err(ClaimError::NotAnMr(_) | ClaimError::NotFound(_)) => continue,
            }
        }
        Ok(None)
    }

    async fn open_conflict_task(
        &self,
        mr_id: &BeadId,
        fields: &MrFields,
        sha: &str,
        files: Vec<String>,
        now_ms: u64,
    ) -> Result<(), MergeError> {
        self.merge_slot
            .acquire(mr_id, CONFLICT_TASK_SLOT_HOLD_MS, 250, self.config.merge_slot_backoff_max_ms, || now_ms)
            .await;

        let info = ConflictTaskInfo {
            conflict_branch: fields.branch.clone(),
            target_branch: fields.target_branch.clone(),
            conflict_sha: sha.to_string(),
            conflict_files: files,
        };
        let task_id = BeadId::new(&self.bead_prefix);
        self.store.create_issue(Bead {
            id: task_id,
            bead_type: BeadType::Task,
            title: format!("resolve rebase conflict on {}", fields.branch),
            description: info.encode(),
            status: BeadStatus::Open,
            priority: Priority::P1,
            labels: Default::default(),
            assignee: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            created_by: Some(self.processor_id),
            fields: None,
        })?;

        self.git.abort_rebase().await?;
        self.store.update_issue(
            mr_id,
            BeadPatch::new().status(BeadStatus::Open).fields(Some(BeadFields::MergeRequest(MrFields {
                blocked_by: Some(task_id),
                retry_count: fields.retry_count + 1,
                ..fields.clone()
            }))),
        )?;
        self.store.release_claim(mr_id)?;
        self.merge_slot.release(mr_id);
        tracing::info!(mr = %mr_id, task = %task_id, "rebase conflict, opened resolution task");
        Ok(())
    }

    /// Fast-forward-merge the currently claimed MR to its target, push, and
    /// verify the push landed before telling anyone it merged (§4.3 steps
    /// g-l). The claim is released whether this succeeds or fails; a push
    /// that succeeds but fails verification is a hard error the operator
    /// must resolve by hand (never retried automatically).
    pub async fn merge(&self) -> Result<(), MergeError> {
        let Some(mr_id) = self.current_claim() else { return Err(MergeError::NoClaim) };
        let Some(mr) = self.store.get_issue(&mr_id)? else { return Err(MergeError::NoClaim) };
        let Some(fields) = mr.mr_fields().cloned() else { return Err(MergeError::NoClaim) };

        let merge_commit = self.git.fast_forward_merge(&fields.branch, &fields.target_branch).await?;
        self.git.push(&fields.target_branch).await?;

        let local = self.git.local_sha(&fields.target_branch).await?;
        let remote = self.git.remote_sha(&fields.target_branch).await?;
        if local != remote {
            return Err(MergeError::PushVerificationFailed { branch: fields.target_branch.clone(), local, remote });
        }

        self.notify_monitor(
            ProtocolMessage::new("", self.processor_id.as_str(), Subject::Merged)
                .with_field("mr", mr_id.as_str())
                .with_field("branch", fields.branch.as_str())
                .with_field("merge_commit", merge_commit.as_str())
                .with_field("target_branch", fields.target_branch.as_str())
                .with_field("worker", fields.worker.as_str()),
        )?;

        self.store.close_issue(&mr_id, "merged")?;
        if fields.target_branch == self.default_branch {
            self.store.close_issue(&fields.source_issue, "merged to default branch").unwrap_or(());
        }
        self.git.delete_branch(&fields.branch).await?;
        self.sync_crew_workspaces(&fields);

        self.store.release_claim(&mr_id)?;
        *self.current_claim.lock() = None;
        Ok(())
    }

    /// Reject the currently claimed MR on gate failure (§4.3 failure
    /// taxonomy). `BranchRegression` reopens the source issue for a fresh
    /// worker to pick up; `PreExisting` files a bug against the target
    /// branch instead, since the producer's change was not at fault.
    pub fn reject(&self, verdict: GateFailureVerdict, reason: &str, now_ms: u64) -> Result<(), MergeError> {
        let Some(mr_id) = self.current_claim() else { return Err(MergeError::NoClaim) };
        let Some(mr) = self.store.get_issue(&mr_id)? else { return Err(MergeError::NoClaim) };
        let Some(fields) = mr.mr_fields().cloned() else { return Err(MergeError::NoClaim) };

        self.store.update_issue(
            &mr_id,
            BeadPatch::new().fields(Some(BeadFields::MergeRequest(MrFields {
                retry_count: fields.retry_count + 1,
                ..fields.clone()
            }))),
        )?;
        self.store.close_issue(&mr_id, reason)?;

        match verdict {
            GateFailureVerdict::BranchRegression => {
                self.store.update_issue(
                    &fields.source_issue,
                    BeadPatch::new().status(BeadStatus::Open).assignee(None),
                )?;
            }
            GateFailureVerdict::PreExisting => {
                self.store.create_issue(Bead {
                    id: BeadId::new(&self.bead_prefix),
                    bead_type: BeadType::Bug,
                    title: format!("pre-existing gate failure on {}", fields.target_branch),
                    description: reason.to_string(),
                    status: BeadStatus::Open,
                    priority: Priority::P2,
                    labels: Default::default(),
                    assignee: None,
                    created_at_ms: now_ms,
                    updated_at_ms: now_ms,
                    created_by: Some(self.processor_id),
                    fields: None,
                })?;
            }
        }

        self.notify_monitor(
            ProtocolMessage::new("", self.processor_id.as_str(), Subject::MergeFailed)
                .with_field("mr", mr_id.as_str())
                .with_field(
                    "failure_type",
                    match verdict {
                        GateFailureVerdict::BranchRegression => "branch_regression",
                        GateFailureVerdict::PreExisting => "pre_existing",
                    },
                )
                .with_field("error", reason),
        )?;

        self.store.release_claim(&mr_id)?;
        *self.current_claim.lock() = None;
        Ok(())
    }

    fn sync_crew_workspaces(&self, _fields: &MrFields) {
        // No crew-workspace sync hook is wired up in this deployment; a
        // real one would refresh each crew session's worktree here.
    }

    fn find_monitor(&self) -> Result<Option<Bead>, StoreError> {
        let agents = self.store.list_issues(IssueFilter { bead_type: Some(BeadType::Agent), ..Default::default() })?;
        Ok(agents.into_iter().find(|a| {
            a.agent_fields().map(|f| f.role == AgentRole::Monitor && f.rig.as_deref() == Some(self.rig_name.as_str())).unwrap_or(false)
        }))
    }

    fn notify_monitor(&self, msg: ProtocolMessage) -> Result<(), MergeError> {
        let Some(monitor) = self.find_monitor()? else { return Ok(()) };
        let msg = ProtocolMessage { to: monitor.id.as_str().to_string(), ..msg };
        send_message(self.store, &monitor.id, &msg)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "merge_processor_tests.rs"]
mod tests;
