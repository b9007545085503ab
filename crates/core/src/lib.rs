// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

//! oj-core: the data model shared by every other crate in the town —
//! beads, rigs, the scheduler-metadata wire format, store events, and
//! town configuration. Carries no knowledge of tokio, storage backends,
//! or session hosts.

pub mod macros;

pub mod bead;
pub mod clock;
pub mod config;
pub mod event;
pub mod id;
pub mod rig;
pub mod scheduler_metadata;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use bead::{
    hq, AgentFields, AgentRole, Bead, BeadFields, BeadId, BeadStatus, BeadType, CleanupStatus,
    ConvoyFields, DependencyEdge, DependencyEdgeType, GateFields, GateKind, MergeStrategy, MrFields,
    Priority,
};
#[cfg(any(test, feature = "test-support"))]
pub use bead::BeadBuilder;
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{ConfigError, ConvoyConfig, GateConfig, HeartbeatConfig, MergeConfig, TownConfig};
pub use event::{EventId, EventKind, StoreEvent};
pub use id::{short, IdBuf};
pub use rig::{Rig, RigRegistry, RigRegistryError, RigState};
#[cfg(any(test, feature = "test-support"))]
pub use rig::RigBuilder;
pub use scheduler_metadata::{MergeMode, SchedulerMetadata, DELIMITER, LEGACY_DELIMITER};
