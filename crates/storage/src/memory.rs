// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! In-process reference implementation of [`BeadsStore`]. Exercises the
//! whole contract — monotone event log, dependency edges, CAS-guarded
//! claims, layered config beads — without any external collaborator.

use crate::errors::{ClaimError, StoreError};
use crate::store::{BeadPatch, BeadsStore, ConfigScope, IssueFilter};
use oj_core::{Bead, BeadId, BeadStatus, DependencyEdge, DependencyEdgeType, EventId, EventKind, StoreEvent};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Default)]
struct Inner {
    beads: HashMap<BeadId, Bead>,
    /// Forward edges: id -> [(other, edge_type)] where `id` is the source.
    edges_out: HashMap<BeadId, Vec<(BeadId, DependencyEdgeType)>>,
    /// Reverse edges: id -> [(other, edge_type)] where `id` is the target.
    edges_in: HashMap<BeadId, Vec<(BeadId, DependencyEdgeType)>>,
    events: Vec<StoreEvent>,
    next_event_id: EventId,
    config: HashMap<(String, String, String), serde_json::Value>,
}

/// An in-memory [`BeadsStore`]. Safe to share across threads; all state is
/// behind a single lock (sufficient for the access patterns here — no
/// operation blocks on external I/O).
pub struct InMemoryBeadsStore {
    inner: Mutex<Inner>,
}

impl Default for InMemoryBeadsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBeadsStore {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner { next_event_id: 1, ..Default::default() }) }
    }

    /// Dump the whole store to JSON (§ ambient persistence). The daemon
    /// calls this on a timer and the CLI calls it once per invocation so a
    /// subprocess-per-command tool sees the same state the daemon does.
    pub fn to_json(&self) -> Result<String, StoreError> {
        let inner = self.inner.lock();
        let snapshot = Snapshot {
            beads: inner.beads.values().cloned().collect(),
            edges_out: inner.edges_out.iter().map(|(k, v)| (k.as_str().to_string(), v.clone())).collect(),
            events: inner.events.clone(),
            next_event_id: inner.next_event_id,
            config: inner.config.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        };
        serde_json::to_string_pretty(&snapshot).map_err(StoreError::Serde)
    }

    /// Rebuild a store from a prior [`to_json`](Self::to_json) dump,
    /// reconstructing the reverse edge index rather than trusting it was
    /// serialized consistently.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let snapshot: Snapshot = serde_json::from_str(json).map_err(StoreError::Serde)?;
        let mut edges_out: HashMap<BeadId, Vec<(BeadId, DependencyEdgeType)>> = HashMap::new();
        let mut edges_in: HashMap<BeadId, Vec<(BeadId, DependencyEdgeType)>> = HashMap::new();
        for (from, edges) in snapshot.edges_out {
            let from = BeadId::from_string(from);
            for (to, edge_type) in edges {
                edges_out.entry(from).or_default().push((to, edge_type));
                edges_in.entry(to).or_default().push((from, edge_type));
            }
        }
        let beads = snapshot.beads.into_iter().map(|b| (b.id, b)).collect();
        let config = snapshot.config.into_iter().collect();
        Ok(Self {
            inner: Mutex::new(Inner { beads, edges_out, edges_in, events: snapshot.events, next_event_id: snapshot.next_event_id, config }),
        })
    }

    fn emit(inner: &mut Inner, kind: EventKind, issue_id: BeadId, new_value: Option<String>, now_ms: u64) {
        let id = inner.next_event_id;
        inner.next_event_id += 1;
        inner.events.push(StoreEvent { id, kind, issue_id, new_value, timestamp_ms: now_ms });
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    beads: Vec<Bead>,
    edges_out: Vec<(String, Vec<(BeadId, DependencyEdgeType)>)>,
    events: Vec<StoreEvent>,
    next_event_id: EventId,
    config: Vec<((String, String, String), serde_json::Value)>,
}

impl BeadsStore for InMemoryBeadsStore {
    fn get_all_events_since(&self, last_event_id: EventId) -> Result<Vec<StoreEvent>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.events.iter().filter(|e| e.id > last_event_id).cloned().collect())
    }

    fn get_issue(&self, id: &BeadId) -> Result<Option<Bead>, StoreError> {
        Ok(self.inner.lock().beads.get(id).cloned())
    }

    fn get_issues_by_ids(&self, ids: &[BeadId]) -> Result<HashMap<BeadId, Bead>, StoreError> {
        let inner = self.inner.lock();
        Ok(ids.iter().filter_map(|id| inner.beads.get(id).map(|b| (*id, b.clone()))).collect())
    }

    fn get_dependents_with_metadata(&self, id: &BeadId) -> Result<Vec<DependencyEdge>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .edges_in
            .get(id)
            .into_iter()
            .flatten()
            .map(|(other, edge_type)| DependencyEdge { other_id: *other, edge_type: *edge_type })
            .collect())
    }

    fn get_dependencies_with_metadata(&self, id: &BeadId) -> Result<Vec<DependencyEdge>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .edges_out
            .get(id)
            .into_iter()
            .flatten()
            .map(|(other, edge_type)| DependencyEdge { other_id: *other, edge_type: *edge_type })
            .collect())
    }

    fn add_dependency(&self, from: &BeadId, to: &BeadId, edge_type: DependencyEdgeType) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.beads.contains_key(from) {
            return Err(StoreError::NotFound(*from));
        }
        if !inner.beads.contains_key(to) {
            return Err(StoreError::NotFound(*to));
        }
        inner.edges_out.entry(*from).or_default().push((*to, edge_type));
        inner.edges_in.entry(*to).or_default().push((*from, edge_type));
        Ok(())
    }

    fn create_issue(&self, bead: Bead) -> Result<BeadId, StoreError> {
        let mut inner = self.inner.lock();
        let id = bead.id;
        let now_ms = bead.created_at_ms;
        inner.beads.insert(id, bead);
        Self::emit(&mut inner, EventKind::Created, id, None, now_ms);
        Ok(id)
    }

    fn update_issue(&self, id: &BeadId, patch: BeadPatch) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let now_ms = inner.beads.get(id).map(|b| b.updated_at_ms).unwrap_or(0);
        let bead = inner.beads.get_mut(id).ok_or(StoreError::NotFound(*id))?;

        let mut status_change = None;
        if let Some(next) = patch.status {
            if !bead.status.can_transition_to(next) {
                return Err(StoreError::InvalidTransition {
                    id: *id,
                    from: status_str(bead.status),
                    to: status_str(next),
                });
            }
            bead.status = next;
            status_change = Some(next);
        }
        if let Some(v) = patch.title {
            bead.title = v;
        }
        if let Some(v) = patch.description {
            bead.description = v;
        }
        if let Some(v) = patch.priority {
            bead.priority = v;
        }
        if let Some(v) = patch.labels {
            bead.labels = v;
        }
        if let Some(v) = patch.assignee {
            bead.assignee = v;
        }
        if let Some(v) = patch.fields {
            bead.fields = v;
        }
        bead.updated_at_ms = now_ms;

        if let Some(new_status) = status_change {
            Self::emit(&mut inner, EventKind::StatusChanged, *id, Some(status_str(new_status).to_string()), now_ms);
        } else {
            Self::emit(&mut inner, EventKind::Updated, *id, None, now_ms);
        }
        Ok(())
    }

    fn close_issue(&self, id: &BeadId, _reason: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let now_ms = inner.beads.get(id).map(|b| b.updated_at_ms).unwrap_or(0);
        let bead = inner.beads.get_mut(id).ok_or(StoreError::NotFound(*id))?;
        if bead.status == BeadStatus::Closed {
            return Err(StoreError::AlreadyClosed(*id));
        }
        bead.status = BeadStatus::Closed;
        bead.updated_at_ms = now_ms;
        Self::emit(&mut inner, EventKind::Closed, *id, None, now_ms);
        Ok(())
    }

    fn delete_issue(&self, id: &BeadId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.beads.remove(id).ok_or(StoreError::NotFound(*id))?;
        inner.edges_out.remove(id);
        inner.edges_in.remove(id);
        Ok(())
    }

    fn list_issues(&self, filter: IssueFilter) -> Result<Vec<Bead>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .beads
            .values()
            .filter(|b| filter.bead_type.map(|t| t == b.bead_type).unwrap_or(true))
            .filter(|b| filter.status.map(|s| s == b.status).unwrap_or(true))
            .filter(|b| filter.label.as_ref().map(|l| b.labels.contains(l)).unwrap_or(true))
            .cloned()
            .collect())
    }

    fn claim_owner(&self, id: &BeadId, owner: &BeadId, now_ms: u64, ttl_ms: u64) -> Result<(), ClaimError> {
        let mut inner = self.inner.lock();
        let bead = inner.beads.get_mut(id).ok_or(ClaimError::NotFound(*id))?;
        let fields = bead.fields.as_mut().and_then(|f| f.as_mr_mut()).ok_or(ClaimError::NotAnMr(*id))?;

        if let (Some(_existing_owner), Some(expires_at)) = (fields.claim_owner, fields.claim_expires_at) {
            if expires_at > now_ms {
                return Err(ClaimError::AlreadyClaimed(*id));
            }
            // Stale claim: fall through and reap it.
        }
        fields.claim_owner = Some(*owner);
        fields.claim_expires_at = Some(now_ms + ttl_ms);
        Ok(())
    }

    fn release_claim(&self, id: &BeadId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(bead) = inner.beads.get_mut(id) {
            if let Some(fields) = bead.fields.as_mut().and_then(|f| f.as_mr_mut()) {
                fields.claim_owner = None;
                fields.claim_expires_at = None;
            }
        }
        Ok(())
    }

    fn set_config(&self, category: &str, scope: ConfigScope, slug: &str, value: serde_json::Value) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.config.insert((category.to_string(), scope.key(), slug.to_string()), value);
        Ok(())
    }

    fn get_config(&self, category: &str, scope: &ConfigScope, slug: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.config.get(&(category.to_string(), scope.key(), slug.to_string())).cloned())
    }
}

fn status_str(status: BeadStatus) -> &'static str {
    match status {
        BeadStatus::Open => "open",
        BeadStatus::InProgress => "in_progress",
        BeadStatus::Closed => "closed",
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
