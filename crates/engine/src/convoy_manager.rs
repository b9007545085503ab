// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! The convoy manager (§4.2): drives convoys to completion without polling
//! every controller. Owns two independent loops — event poll and stranded
//! scan — that share one idempotent check, [`ConvoyManager::check_convoys_for_issue`].

use oj_adapters::{CliError, CliRunner};
use oj_core::{BeadId, DependencyEdgeType, EventId, Rig, RigRegistry};
use oj_storage::{BeadsStore, StoreError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvoyManagerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cli(#[from] CliError),
}

/// The reserved key under which the town-level store is kept in the
/// per-store high-water-mark map.
const TOWN_KEY: &str = "town";

/// Strip an `external:prefix:id` wrapper, returning the bare bead id
/// underneath. Ids with no such wrapper pass through unchanged.
pub fn normalize_issue_id(raw: &str) -> BeadId {
    if let Some(rest) = raw.strip_prefix("external:") {
        if let Some((_prefix, id)) = rest.split_once(':') {
            return BeadId::from_string(id);
        }
    }
    BeadId::from_string(raw)
}

/// Drives convoys to completion. Holds one beads store per active rig plus
/// the town store (where convoy beads and their `tracks`/`blocks` edges
/// live), a rig registry for prefix resolution, and the CLI surface used
/// to dispatch work.
pub struct ConvoyManager {
    registry: RigRegistry,
    town_store: Arc<dyn BeadsStore>,
    rig_stores: HashMap<String, Arc<dyn BeadsStore>>,
    cli: Arc<dyn CliRunner>,
    high_water_marks: Mutex<HashMap<String, EventId>>,
}

impl ConvoyManager {
    pub fn new(
        registry: RigRegistry,
        town_store: Arc<dyn BeadsStore>,
        rig_stores: HashMap<String, Arc<dyn BeadsStore>>,
        cli: Arc<dyn CliRunner>,
    ) -> Self {
        Self { registry, town_store, rig_stores, cli, high_water_marks: Mutex::new(HashMap::new()) }
    }

    pub fn high_water_mark(&self, store_key: &str) -> EventId {
        *self.high_water_marks.lock().get(store_key).unwrap_or(&0)
    }

    fn rig_for(&self, id: &BeadId) -> Option<&Rig> {
        self.registry.resolve(id)
    }

    /// The content store that owns `id`'s bead, by prefix resolution.
    /// `None` for an unknown prefix — callers log and skip rather than
    /// crash (§3, rig registry invariants).
    fn store_for_id(&self, id: &BeadId) -> Option<Arc<dyn BeadsStore>> {
        if let Some(rig) = self.rig_for(id) {
            return self.rig_stores.get(&rig.name).cloned();
        }
        if id.prefix().starts_with("hq-") {
            return Some(self.town_store.clone());
        }
        None
    }

    /// Event poll: for each known store, pull events since its own
    /// high-water mark and dispatch closing ones to the shared check. The
    /// mark advances only past events that were successfully dispatched —
    /// a dispatch failure halts that store's advance for this tick so the
    /// event is retried on the next one.
    pub async fn event_poll_tick(&self) {
        let stores: Vec<(String, Arc<dyn BeadsStore>)> = std::iter::once((TOWN_KEY.to_string(), self.town_store.clone()))
            .chain(self.rig_stores.iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect();

        for (key, store) in stores {
            let hwm = self.high_water_mark(&key);
            let events = match store.get_all_events_since(hwm) {
                Ok(events) => events,
                Err(err) => {
                    tracing::warn!(store = %key, error = %err, "event poll failed, retrying next tick");
                    continue;
                }
            };

            let mut advanced_to = hwm;
            for event in events {
                if event.is_closing() && !event.issue_id.is_empty() {
                    match self.check_convoys_for_issue(event.issue_id.as_str()).await {
                        Ok(()) => advanced_to = event.id,
                        Err(err) => {
                            tracing::warn!(store = %key, event_id = event.id, error = %err, "convoy check dispatch failed");
                            break;
                        }
                    }
                } else {
                    advanced_to = event.id;
                }
            }

            if advanced_to > hwm {
                self.high_water_marks.lock().insert(key, advanced_to);
            }
        }
    }

    /// The shared, idempotent check. Looks up convoys that `tracks` the
    /// given issue, re-tests completeness for each, and feeds at most one
    /// ready issue per convoy.
    pub async fn check_convoys_for_issue(&self, raw_issue_id: &str) -> Result<(), ConvoyManagerError> {
        let issue_id = normalize_issue_id(raw_issue_id);
        let dependents = self.town_store.get_dependents_with_metadata(&issue_id)?;
        let convoy_ids: Vec<BeadId> =
            dependents.iter().filter(|e| e.edge_type == DependencyEdgeType::Tracks).map(|e| e.other_id).collect();

        for convoy_id in convoy_ids {
            let Some(convoy) = self.town_store.get_issue(&convoy_id)? else { continue };
            if convoy.status == oj_core::BeadStatus::Closed {
                continue;
            }

            self.cli.convoy_check(Some(convoy_id.as_str())).await?;

            let Some(refreshed) = self.town_store.get_issue(&convoy_id)? else { continue };
            if refreshed.status == oj_core::BeadStatus::Closed {
                continue;
            }

            if let Some(next_issue) = self.next_ready_tracked_issue(&convoy_id)? {
                if let Some(rig) = self.rig_for(&next_issue) {
                    if rig.state.dispatchable() {
                        self.cli.sling(next_issue.as_str(), &rig.name, true, None).await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// The first tracked issue that is open, unassigned, slingable, and not
    /// blocked by an open `blocks` dep — refreshed from its owning store
    /// rather than trusted from stale edge metadata.
    fn next_ready_tracked_issue(&self, convoy_id: &BeadId) -> Result<Option<BeadId>, StoreError> {
        let tracked: Vec<BeadId> = self
            .town_store
            .get_dependencies_with_metadata(convoy_id)?
            .into_iter()
            .filter(|e| e.edge_type == DependencyEdgeType::Tracks)
            .map(|e| e.other_id)
            .collect();

        for id in tracked {
            let Some(store) = self.store_for_id(&id) else { continue };
            let Some(bead) = store.get_issue(&id)? else { continue };
            if bead.is_ready_for_dispatch() && !self.is_blocked(&id)? {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    fn is_blocked(&self, issue_id: &BeadId) -> Result<bool, StoreError> {
        let blockers: Vec<BeadId> = self
            .town_store
            .get_dependencies_with_metadata(issue_id)?
            .into_iter()
            .filter(|e| e.edge_type == DependencyEdgeType::Blocks)
            .map(|e| e.other_id)
            .collect();

        for blocker in blockers {
            let Some(store) = self.store_for_id(&blocker) else { continue };
            if let Some(bead) = store.get_issue(&blocker)? {
                if bead.status != oj_core::BeadStatus::Closed {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Stranded scan: enumerate convoys via the CLI and feed one ready
    /// issue (or re-check) per convoy. A dispatch failure for one convoy
    /// logs and continues; an issue whose prefix resolves to no known or
    /// non-dispatchable rig is skipped.
    pub async fn stranded_scan_tick(&self) {
        let convoys = match self.cli.convoy_stranded().await {
            Ok(c) => c,
            Err(err) => {
                tracing::warn!(error = %err, "convoy stranded --json failed");
                return;
            }
        };

        for convoy in convoys {
            if convoy.ready_count > 0 {
                let Some(first) = convoy.ready_issues.first() else { continue };
                let issue_id = BeadId::from_string(first);
                match self.rig_for(&issue_id) {
                    Some(rig) if rig.state.dispatchable() => {
                        if let Err(err) = self.cli.sling(issue_id.as_str(), &rig.name, true, None).await {
                            tracing::warn!(convoy = %convoy.id, error = %err, "sling dispatch failed");
                        }
                    }
                    Some(rig) => {
                        tracing::debug!(convoy = %convoy.id, rig = %rig.name, "rig not dispatchable, skipping");
                    }
                    None => {
                        tracing::warn!(convoy = %convoy.id, issue = %issue_id, "issue prefix resolves to no known rig");
                    }
                }
            } else if let Err(err) = self.cli.convoy_check(Some(&convoy.id)).await {
                tracing::warn!(convoy = %convoy.id, error = %err, "convoy check failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "convoy_manager_tests.rs"]
mod tests;
