// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! The beads store contract (§6.1). Consumed by the convoy manager,
//! refinery, and patrol controllers; implemented here by
//! [`crate::memory::InMemoryBeadsStore`] and, in production, by the real
//! content-addressed store (an external collaborator — see the
//! workspace-level design notes).

use crate::errors::{ClaimError, StoreError};
use oj_core::{Bead, BeadId, BeadStatus, BeadType, DependencyEdge, DependencyEdgeType, EventId, Priority, StoreEvent};
use std::collections::{BTreeSet, HashMap};

/// A partial update to a bead. `None` fields are left untouched
/// (last-writer-wins semantics per field; see §3 Lifecycle summary).
#[derive(Debug, Clone, Default)]
pub struct BeadPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<BeadStatus>,
    pub priority: Option<Priority>,
    pub labels: Option<BTreeSet<String>>,
    pub assignee: Option<Option<BeadId>>,
    pub fields: Option<Option<oj_core::BeadFields>>,
}

impl BeadPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: BeadStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn assignee(mut self, assignee: Option<BeadId>) -> Self {
        self.assignee = Some(assignee);
        self
    }

    pub fn fields(mut self, fields: Option<oj_core::BeadFields>) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Filter for `ListIssues`.
#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    pub bead_type: Option<BeadType>,
    pub status: Option<BeadStatus>,
    pub label: Option<String>,
}

/// Layered scope for config-bead lookups (§6.4), ordered
/// least-specific to most-specific.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConfigScope {
    Town,
    Rig(String),
}

impl ConfigScope {
    pub fn key(&self) -> String {
        match self {
            ConfigScope::Town => "*".to_string(),
            ConfigScope::Rig(rig) => rig.clone(),
        }
    }
}

/// Required operations a beads store must support.
pub trait BeadsStore: Send + Sync {
    fn get_all_events_since(&self, last_event_id: EventId) -> Result<Vec<StoreEvent>, StoreError>;

    fn get_issue(&self, id: &BeadId) -> Result<Option<Bead>, StoreError>;

    fn get_issues_by_ids(&self, ids: &[BeadId]) -> Result<HashMap<BeadId, Bead>, StoreError>;

    fn get_dependents_with_metadata(&self, id: &BeadId) -> Result<Vec<DependencyEdge>, StoreError>;

    fn get_dependencies_with_metadata(&self, id: &BeadId) -> Result<Vec<DependencyEdge>, StoreError>;

    fn add_dependency(&self, from: &BeadId, to: &BeadId, edge_type: DependencyEdgeType) -> Result<(), StoreError>;

    fn create_issue(&self, bead: Bead) -> Result<BeadId, StoreError>;

    fn update_issue(&self, id: &BeadId, patch: BeadPatch) -> Result<(), StoreError>;

    fn close_issue(&self, id: &BeadId, reason: &str) -> Result<(), StoreError>;

    fn delete_issue(&self, id: &BeadId) -> Result<(), StoreError>;

    fn list_issues(&self, filter: IssueFilter) -> Result<Vec<Bead>, StoreError>;

    /// Optimistic-concurrency claim. The one place the core cannot
    /// tolerate last-writer-wins (§4.3).
    fn claim_owner(&self, id: &BeadId, owner: &BeadId, now_ms: u64, ttl_ms: u64) -> Result<(), ClaimError>;

    /// Release a claim held by `owner`, or reap it regardless of owner if
    /// it has already expired. A no-op if unclaimed.
    fn release_claim(&self, id: &BeadId) -> Result<(), StoreError>;

    fn set_config(&self, category: &str, scope: ConfigScope, slug: &str, value: serde_json::Value) -> Result<(), StoreError>;

    fn get_config(&self, category: &str, scope: &ConfigScope, slug: &str) -> Result<Option<serde_json::Value>, StoreError>;

    /// Merge all layers for `slug` from least- to most-specific, returning
    /// the most-specific non-null field per key (shallow object merge).
    fn get_config_layered(
        &self,
        category: &str,
        scopes: &[ConfigScope],
        slug: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let mut merged: Option<serde_json::Map<String, serde_json::Value>> = None;
        for scope in scopes {
            if let Some(serde_json::Value::Object(layer)) = self.get_config(category, scope, slug)? {
                let base = merged.get_or_insert_with(serde_json::Map::new);
                for (k, v) in layer {
                    base.insert(k, v);
                }
            }
        }
        Ok(merged.map(serde_json::Value::Object))
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
