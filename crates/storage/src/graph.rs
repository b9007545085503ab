// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! Dependency-graph traversal. The graph is a DAG by convention but must be
//! treated defensively: cycles are possible through human input. Every
//! traversal here carries an explicit depth limit and a visited-set guard
//! (§9 design notes).

use crate::errors::StoreError;
use crate::store::BeadsStore;
use oj_core::{BeadId, BeadStatus, DependencyEdgeType};
use std::collections::HashSet;

/// Matches the depth limit in §9: "All traversals have explicit depth
/// limits (16) and visited-set guards."
pub const MAX_TRAVERSAL_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Follow outgoing edges (this node's dependencies).
    Out,
    /// Follow incoming edges (this node's dependents).
    In,
}

/// Breadth-first closure over edges of a given type, starting at `start`.
/// The visited set already makes cycles harmless (a node is never
/// revisited); the depth limit is an independent safety bound against
/// pathologically wide or deep graphs.
pub fn closure(
    store: &dyn BeadsStore,
    start: &BeadId,
    edge_type: DependencyEdgeType,
    direction: Direction,
) -> Result<Vec<BeadId>, StoreError> {
    let mut visited = HashSet::new();
    visited.insert(*start);
    let mut result = Vec::new();
    let mut frontier = vec![*start];
    let mut depth = 0;

    while !frontier.is_empty() {
        if depth >= MAX_TRAVERSAL_DEPTH {
            return Err(StoreError::DepthExceeded { from: *start, to: frontier[0] });
        }
        let mut next = Vec::new();
        for node in frontier {
            let edges = match direction {
                Direction::Out => store.get_dependencies_with_metadata(&node)?,
                Direction::In => store.get_dependents_with_metadata(&node)?,
            };
            for edge in edges {
                if edge.edge_type == edge_type && visited.insert(edge.other_id) {
                    result.push(edge.other_id);
                    next.push(edge.other_id);
                }
            }
        }
        frontier = next;
        depth += 1;
    }

    Ok(result)
}

/// Issues a convoy tracks, via outgoing `tracks` edges.
pub fn tracked_issues(store: &dyn BeadsStore, convoy_id: &BeadId) -> Result<Vec<BeadId>, StoreError> {
    closure(store, convoy_id, DependencyEdgeType::Tracks, Direction::Out)
}

/// A convoy is closed iff it tracks at least one issue and every tracked
/// issue is closed. An empty convoy (no tracked issues yet) is never
/// auto-closed — see DESIGN.md for the rationale.
pub fn is_convoy_closed(store: &dyn BeadsStore, convoy_id: &BeadId) -> Result<bool, StoreError> {
    let tracked = tracked_issues(store, convoy_id)?;
    if tracked.is_empty() {
        return Ok(false);
    }
    let issues = store.get_issues_by_ids(&tracked)?;
    Ok(tracked.iter().all(|id| issues.get(id).map(|b| b.status == BeadStatus::Closed).unwrap_or(false)))
}

/// Whether `issue_id` is blocked by any still-open `blocks` dependency.
/// Direct only — the spec's ready-issue check is "not blocked by an open
/// `blocks` dep", not a transitive closure over blockers.
pub fn is_blocked(store: &dyn BeadsStore, issue_id: &BeadId) -> Result<bool, StoreError> {
    let deps = store.get_dependencies_with_metadata(issue_id)?;
    let blockers: Vec<BeadId> =
        deps.iter().filter(|e| e.edge_type == DependencyEdgeType::Blocks).map(|e| e.other_id).collect();
    if blockers.is_empty() {
        return Ok(false);
    }
    let issues = store.get_issues_by_ids(&blockers)?;
    Ok(blockers.iter().any(|id| issues.get(id).map(|b| b.status != BeadStatus::Closed).unwrap_or(false)))
}

/// Find the next ready issue tracked by a convoy: open, unassigned,
/// slingable, and not blocked. Refreshes each candidate from the store
/// rather than trusting stale edge metadata.
pub fn next_ready_tracked_issue(store: &dyn BeadsStore, convoy_id: &BeadId) -> Result<Option<BeadId>, StoreError> {
    let tracked = tracked_issues(store, convoy_id)?;
    let issues = store.get_issues_by_ids(&tracked)?;
    for id in tracked {
        let Some(bead) = issues.get(&id) else { continue };
        if bead.is_ready_for_dispatch() && !is_blocked(store, &id)? {
            return Ok(Some(id));
        }
    }
    Ok(None)
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
