// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! The bead: the universal persisted unit of state.
//!
//! Every tracked entity — issue, task, merge request, convoy, agent, gate,
//! wisp, config — is a [`Bead`] distinguished by [`BeadType`] and, where the
//! type carries extra structure, a [`BeadFields`] bundle.

use crate::id::IdBuf;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identifier for a bead. The prefix is the enrolling rig's `bead_prefix`
/// (town-level beads use the `hq-` family); the suffix is a random id body.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BeadId(pub IdBuf);

impl BeadId {
    /// Mint a new id under the given prefix, e.g. `BeadId::new("gt-")`.
    pub fn new(prefix: &str) -> Self {
        Self(IdBuf::new(&format!("{prefix}{}", crate::id::random_suffix())))
    }

    /// Parse an id from an existing string (storage read, wire decode).
    pub fn from_string(id: impl AsRef<str>) -> Self {
        Self(IdBuf::new(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// The prefix this id was minted under, derived by stripping the fixed
    /// random suffix length from the tail.
    pub fn prefix(&self) -> &str {
        let s = self.0.as_str();
        let cut = s.len().saturating_sub(crate::id::ID_SUFFIX_LEN);
        &s[..cut]
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for BeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BeadId({:?})", self.0.as_str())
    }
}

impl std::fmt::Display for BeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.as_str())
    }
}

impl From<&str> for BeadId {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

impl From<String> for BeadId {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

impl AsRef<str> for BeadId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq<str> for BeadId {
    fn eq(&self, other: &str) -> bool {
        self.0.as_str() == other
    }
}

impl PartialEq<&str> for BeadId {
    fn eq(&self, other: &&str) -> bool {
        self.0.as_str() == *other
    }
}

impl std::borrow::Borrow<str> for BeadId {
    fn borrow(&self) -> &str {
        self.0.as_str()
    }
}

impl std::ops::Deref for BeadId {
    type Target = str;

    fn deref(&self) -> &str {
        self.0.as_str()
    }
}

/// Town-level bead id family, used for convoys, agents, and gates.
pub mod hq {
    pub const CONVOY: &str = "hq-cv-";
    pub const AGENT: &str = "hq-ag-";
    pub const GATE: &str = "hq-gt-";
}

/// The kind of entity a bead represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BeadType {
    Issue,
    Task,
    Bug,
    Epic,
    MergeRequest,
    Convoy,
    Advice,
    Agent,
    Wisp,
    Gate,
    Config,
}

crate::simple_display! {
    BeadType {
        Issue => "issue",
        Task => "task",
        Bug => "bug",
        Epic => "epic",
        MergeRequest => "merge-request",
        Convoy => "convoy",
        Advice => "advice",
        Agent => "agent",
        Wisp => "wisp",
        Gate => "gate",
        Config => "config",
    }
}

impl BeadType {
    /// Whether a worker may be dispatched directly onto an open bead of
    /// this type (used by the convoy manager's ready-issue scan).
    pub fn is_slingable(&self) -> bool {
        matches!(self, BeadType::Issue | BeadType::Task | BeadType::Bug)
    }
}

/// Lifecycle status. `open -> in_progress -> closed`; closed is terminal
/// except for an explicit reopen back to `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeadStatus {
    Open,
    InProgress,
    Closed,
}

crate::simple_display! {
    BeadStatus {
        Open => "open",
        InProgress => "in_progress",
        Closed => "closed",
    }
}

impl BeadStatus {
    /// Whether `self -> next` is an allowed transition.
    pub fn can_transition_to(&self, next: BeadStatus) -> bool {
        use BeadStatus::*;
        matches!(
            (self, next),
            (Open, InProgress)
                | (Open, Closed)
                | (InProgress, Closed)
                | (InProgress, Open)
                | (Closed, Open) // explicit reopen
        )
    }
}

/// Priority, `0` (highest) through `4` (lowest). Values outside the range
/// are clamped on construction rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(u8);

impl Priority {
    pub const P0: Priority = Priority(0);
    pub const P1: Priority = Priority(1);
    pub const P2: Priority = Priority(2);
    pub const P3: Priority = Priority(3);
    pub const P4: Priority = Priority(4);

    pub fn new(v: u8) -> Self {
        Priority(v.min(4))
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::P2
    }
}

/// Typed dependency edge between two beads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyEdgeType {
    /// Convoy -> issue: the convoy tracks this issue's completion.
    Tracks,
    /// Issue -> issue: the source is blocked until the target closes.
    Blocks,
    Parent,
    Child,
}

crate::simple_display! {
    DependencyEdgeType {
        Tracks => "tracks",
        Blocks => "blocks",
        Parent => "parent",
        Child => "child",
    }
}

/// A dependency edge as returned by the store, paired with the id on the
/// other end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub other_id: BeadId,
    pub edge_type: DependencyEdgeType,
}

/// Merge strategy for a merge request. `rebase-ff` is the deterministic
/// default; `squash` is opt-in via the MR field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    RebaseFf,
    Squash,
}

impl Default for MergeStrategy {
    fn default() -> Self {
        MergeStrategy::RebaseFf
    }
}

crate::simple_display! {
    MergeStrategy {
        RebaseFf => "rebase-ff",
        Squash => "squash",
    }
}

/// Self-reported worktree hygiene at the time a worker announces `done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupStatus {
    Clean,
    HasUncommitted,
    HasStash,
    HasUnpushed,
    None,
}

crate::simple_display! {
    CleanupStatus {
        Clean => "clean",
        HasUncommitted => "has_uncommitted",
        HasStash => "has_stash",
        HasUnpushed => "has_unpushed",
        None => "none",
    }
}

/// The role a live agent session is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Orchestrator,
    Monitor,
    Processor,
    Worker,
    Dog,
    Crew,
    Boot,
}

crate::simple_display! {
    AgentRole {
        Orchestrator => "orchestrator",
        Monitor => "monitor",
        Processor => "processor",
        Worker => "worker",
        Dog => "dog",
        Crew => "crew",
        Boot => "boot",
    }
}

/// Gate coordination kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateKind {
    Timer,
    ExternalRun,
    ExternalPr,
    Human,
    Mail,
}

crate::simple_display! {
    GateKind {
        Timer => "timer",
        ExternalRun => "external-run",
        ExternalPr => "external-pr",
        Human => "human",
        Mail => "mail",
    }
}

/// Fields for a `merge-request` bead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MrFields {
    pub branch: String,
    pub target_branch: String,
    pub source_issue: BeadId,
    pub worker: BeadId,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convoy_id: Option<BeadId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convoy_created_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<BeadId>,
    pub merge_strategy: MergeStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_owner: Option<BeadId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_expires_at: Option<u64>,
}

/// Fields for a `convoy` bead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvoyFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<BeadId>,
    #[serde(default)]
    pub subscribers: Vec<String>,
    pub merge_strategy: MergeStrategy,
}

/// Fields for an `agent` bead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentFields {
    pub role: AgentRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rig: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_name: Option<String>,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook_bead: Option<BeadId>,
    pub cleanup_status: CleanupStatus,
    pub last_activity_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_intent_at_ms: Option<u64>,
    /// Parse-failure counter surfaced when a protocol message addressed to
    /// this agent fails required-field validation (see §6.5).
    #[serde(default)]
    pub parse_failures: u32,
}

/// Fields for a `gate` bead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateFields {
    pub kind: GateKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks_molecule: Option<BeadId>,
    #[serde(default)]
    pub waiters: Vec<BeadId>,
}

/// The typed field bundle carried by a bead, keyed by [`BeadType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum BeadFields {
    MergeRequest(MrFields),
    Convoy(ConvoyFields),
    Agent(AgentFields),
    Gate(GateFields),
}

impl BeadFields {
    pub fn as_mr(&self) -> Option<&MrFields> {
        match self {
            BeadFields::MergeRequest(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_mr_mut(&mut self) -> Option<&mut MrFields> {
        match self {
            BeadFields::MergeRequest(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_convoy(&self) -> Option<&ConvoyFields> {
        match self {
            BeadFields::Convoy(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_agent(&self) -> Option<&AgentFields> {
        match self {
            BeadFields::Agent(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_agent_mut(&mut self) -> Option<&mut AgentFields> {
        match self {
            BeadFields::Agent(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_gate(&self) -> Option<&GateFields> {
        match self {
            BeadFields::Gate(f) => Some(f),
            _ => None,
        }
    }
}

/// The universal persisted unit of state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bead {
    pub id: BeadId,
    pub bead_type: BeadType,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: BeadStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<BeadId>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<BeadId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<BeadFields>,
}

impl Bead {
    /// Whether this bead is open and unassigned, i.e. eligible for
    /// dispatch via the convoy manager's ready-issue scan.
    pub fn is_ready_for_dispatch(&self) -> bool {
        self.status == BeadStatus::Open && self.assignee.is_none() && self.bead_type.is_slingable()
    }

    pub fn mr_fields(&self) -> Option<&MrFields> {
        self.fields.as_ref().and_then(BeadFields::as_mr)
    }

    pub fn mr_fields_mut(&mut self) -> Option<&mut MrFields> {
        self.fields.as_mut().and_then(BeadFields::as_mr_mut)
    }

    pub fn convoy_fields(&self) -> Option<&ConvoyFields> {
        self.fields.as_ref().and_then(BeadFields::as_convoy)
    }

    pub fn agent_fields(&self) -> Option<&AgentFields> {
        self.fields.as_ref().and_then(BeadFields::as_agent)
    }

    pub fn agent_fields_mut(&mut self) -> Option<&mut AgentFields> {
        self.fields.as_mut().and_then(BeadFields::as_agent_mut)
    }

    pub fn gate_fields(&self) -> Option<&GateFields> {
        self.fields.as_ref().and_then(BeadFields::as_gate)
    }
}

#[cfg(any(test, feature = "test-support"))]
crate::builder! {
    pub struct BeadBuilder => Bead {
        into {
            title: String = "untitled",
            description: String = "",
        }
        set {
            bead_type: BeadType = BeadType::Issue,
            status: BeadStatus = BeadStatus::Open,
            priority: Priority = Priority::P2,
            labels: BTreeSet<String> = BTreeSet::new(),
            assignee: Option<BeadId> = None,
            created_at_ms: u64 = 1_000_000,
            updated_at_ms: u64 = 1_000_000,
            created_by: Option<BeadId> = None,
            fields: Option<BeadFields> = None,
        }
        computed {
            id: BeadId = BeadId::new("gt-"),
        }
    }
}

#[cfg(test)]
#[path = "bead_tests.rs"]
mod tests;
