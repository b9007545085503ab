// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! Town-level configuration: tick intervals, staleness timeouts, and merge
//! scoring constants. Every field defaults so an absent config file is
//! valid — the least-specific layer always has a compiled-in default,
//! mirroring the config-bead layering in §6.4.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TownConfig {
    pub heartbeat: HeartbeatConfig,
    pub convoy: ConvoyConfig,
    pub merge: MergeConfig,
    pub gate: GateConfig,
}

impl Default for TownConfig {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatConfig::default(),
            convoy: ConvoyConfig::default(),
            merge: MergeConfig::default(),
            gate: GateConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub interval_secs: u64,
    pub nudge_after_secs: u64,
    pub kill_after_secs: u64,
    pub kill_cooldown_secs: u64,
    pub startup_grace_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: 180,
            nudge_after_secs: 300,
            kill_after_secs: 600,
            kill_cooldown_secs: 300,
            startup_grace_secs: 300,
        }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
    pub fn nudge_after(&self) -> Duration {
        Duration::from_secs(self.nudge_after_secs)
    }
    pub fn kill_after(&self) -> Duration {
        Duration::from_secs(self.kill_after_secs)
    }
    pub fn kill_cooldown(&self) -> Duration {
        Duration::from_secs(self.kill_cooldown_secs)
    }
    pub fn startup_grace(&self) -> Duration {
        Duration::from_secs(self.startup_grace_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvoyConfig {
    pub event_poll_interval_secs: u64,
    pub stranded_scan_interval_secs: u64,
}

impl Default for ConvoyConfig {
    fn default() -> Self {
        Self { event_poll_interval_secs: 5, stranded_scan_interval_secs: 30 }
    }
}

impl ConvoyConfig {
    pub fn event_poll_interval(&self) -> Duration {
        Duration::from_secs(self.event_poll_interval_secs)
    }

    /// `<= 0` falls back to the 30 s default (boundary behavior in §8).
    pub fn stranded_scan_interval(&self) -> Duration {
        let secs = if self.stranded_scan_interval_secs == 0 { 30 } else { self.stranded_scan_interval_secs };
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub claim_ttl_secs: u64,
    pub max_push_retries: u32,
    pub merge_slot_backoff_base_ms: u64,
    pub merge_slot_backoff_max_ms: u64,
    /// Scoring constants matching the formula in §4.3.
    pub base_score: i64,
    pub starvation_weight_per_hour: i64,
    pub priority_weight: i64,
    pub retry_penalty_per_retry: i64,
    pub retry_penalty_cap: i64,
    pub fifo_weight_per_hour: i64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            claim_ttl_secs: 600,
            max_push_retries: 3,
            merge_slot_backoff_base_ms: 250,
            merge_slot_backoff_max_ms: 30_000,
            base_score: 1000,
            starvation_weight_per_hour: 10,
            priority_weight: 100,
            retry_penalty_per_retry: 50,
            retry_penalty_cap: 300,
            fifo_weight_per_hour: 1,
        }
    }
}

impl MergeConfig {
    pub fn claim_ttl(&self) -> Duration {
        Duration::from_secs(self.claim_ttl_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub poll_interval_secs: u64,
    pub done_intent_stuck_secs: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self { poll_interval_secs: 60, done_intent_stuck_secs: 60 }
    }
}

impl GateConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse town config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl TownConfig {
    /// Parse a TOML document, falling back to compiled-in defaults for any
    /// field the document omits.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
