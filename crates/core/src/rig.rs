// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! Rig registry: named source repositories enrolled in the town, and the
//! `routes` table that resolves a bead id's prefix to its owning store.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A rig's lifecycle state. Parked/docked rigs are skipped by dispatch but
/// never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RigState {
    Active,
    Parked,
    Docked,
    Removed,
}

crate::simple_display! {
    RigState {
        Active => "active",
        Parked => "parked",
        Docked => "docked",
        Removed => "removed",
    }
}

impl RigState {
    /// Whether the convoy manager and orchestrator may dispatch work to
    /// this rig.
    pub fn dispatchable(&self) -> bool {
        matches!(self, RigState::Active)
    }
}

/// A named source repository enrolled in the town.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rig {
    pub name: String,
    pub git_url: String,
    pub bead_prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_repo: Option<String>,
    pub added_at_ms: u64,
    #[serde(default = "default_rig_state")]
    pub state: RigState,
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

fn default_rig_state() -> RigState {
    RigState::Active
}

fn default_branch() -> String {
    "main".to_string()
}

#[cfg(any(test, feature = "test-support"))]
crate::builder! {
    pub struct RigBuilder => Rig {
        into {
            name: String = "demo",
            git_url: String = "https://example.invalid/demo.git",
            bead_prefix: String = "gt-",
            default_branch: String = "main",
        }
        set {
            local_repo: Option<String> = None,
            added_at_ms: u64 = 1_000_000,
            state: RigState = RigState::Active,
        }
    }
}

/// Maps a bead-id prefix to its owning rig. `routes` is the authoritative
/// prefix registry: an id with an unknown prefix is skipped, never crashed
/// on.
#[derive(Debug, Default, Clone)]
pub struct RigRegistry {
    by_prefix: HashMap<String, Rig>,
}

impl RigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update a rig. Errors if another rig already owns this
    /// prefix (prefixes are unique across a town).
    pub fn register(&mut self, rig: Rig) -> Result<(), RigRegistryError> {
        if let Some(existing) = self.by_prefix.get(&rig.bead_prefix) {
            if existing.name != rig.name {
                return Err(RigRegistryError::PrefixConflict {
                    prefix: rig.bead_prefix.clone(),
                    existing: existing.name.clone(),
                });
            }
        }
        self.by_prefix.insert(rig.bead_prefix.clone(), rig);
        Ok(())
    }

    /// Resolve a bead id to its owning rig via its prefix. Returns `None`
    /// for an unknown prefix rather than an error — callers log and skip.
    pub fn resolve(&self, id: &crate::bead::BeadId) -> Option<&Rig> {
        self.by_prefix
            .values()
            .find(|rig| id.as_str().starts_with(rig.bead_prefix.as_str()))
    }

    pub fn by_name(&self, name: &str) -> Option<&Rig> {
        self.by_prefix.values().find(|r| r.name == name)
    }

    pub fn active_rigs(&self) -> impl Iterator<Item = &Rig> {
        self.by_prefix.values().filter(|r| r.state == RigState::Active)
    }

    pub fn all(&self) -> impl Iterator<Item = &Rig> {
        self.by_prefix.values()
    }

    pub fn len(&self) -> usize {
        self.by_prefix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_prefix.is_empty()
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RigRegistryError {
    #[error("bead prefix {prefix:?} is already registered to rig {existing:?}")]
    PrefixConflict { prefix: String, existing: String },
}

#[cfg(test)]
#[path = "rig_tests.rs"]
mod tests;
