// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! The daemon (§4.1): supervises patrol sessions, never contains policy.
//! One dedicated task per long-lived subtask — heartbeat reconciliation,
//! convoy event poll, convoy stranded scan — collected into a `JoinSet`
//! and joined on shutdown, the async analogue of a wait group. `start()`
//! and `stop()` are each idempotent via a compare-and-swap flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use oj_adapters::SessionHost;
use oj_core::{Clock, HeartbeatConfig, RigRegistry, SystemClock};
use oj_engine::ConvoyManager;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::heartbeat::HeartbeatReconciler;
use crate::session_registry::SessionRegistry;

/// Shutdown must complete within this bound regardless of subprocess
/// state (§4.1 "Failure semantics").
pub const SHUTDOWN_BOUND: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("shutdown did not complete within {0:?}")]
    ShutdownTimedOut(Duration),
}

/// Everything the daemon's background tasks need, gathered so `start()`
/// takes one argument instead of a handful of unrelated ones.
pub struct DaemonDeps {
    pub store: Arc<dyn oj_storage::BeadsStore>,
    pub rig_stores: std::collections::HashMap<String, Arc<dyn oj_storage::BeadsStore>>,
    pub sessions: Arc<dyn SessionHost>,
    pub cli: Arc<dyn oj_adapters::CliRunner>,
    pub registry: RigRegistry,
    pub heartbeat: HeartbeatConfig,
    pub convoy_event_poll_interval: Duration,
    pub convoy_stranded_scan_interval: Duration,
}

/// Supervises the daemon's long-lived tasks. Carries no policy of its
/// own — every decision lives in `oj-engine`; this struct only starts,
/// monitors, and stops the tasks that run it.
pub struct Daemon {
    running: AtomicBool,
    cancel: CancellationToken,
    tasks: Mutex<JoinSet<()>>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self { running: AtomicBool::new(false), cancel: CancellationToken::new(), tasks: Mutex::new(JoinSet::new()) }
    }
}

impl Daemon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Idempotent: a second call while already running is a no-op.
    pub fn start(&self, deps: DaemonDeps) {
        if self.running.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return;
        }
        info!("daemon starting");

        let registry = Arc::new(deps.registry);
        let convoy_manager = Arc::new(ConvoyManager::new(
            (*registry).clone(),
            deps.store.clone(),
            deps.rig_stores.clone(),
            deps.cli.clone(),
        ));

        let mut tasks = self.tasks.lock();

        {
            let convoy_manager = convoy_manager.clone();
            let cancel = self.cancel.clone();
            let interval = deps.convoy_event_poll_interval;
            tasks.spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => convoy_manager.event_poll_tick().await,
                        _ = cancel.cancelled() => break,
                    }
                }
            });
        }

        {
            let convoy_manager = convoy_manager.clone();
            let cancel = self.cancel.clone();
            let interval = deps.convoy_stranded_scan_interval;
            tasks.spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => convoy_manager.stranded_scan_tick().await,
                        _ = cancel.cancelled() => break,
                    }
                }
            });
        }

        {
            let store = deps.store.clone();
            let sessions = deps.sessions.clone();
            let registry = registry.clone();
            let cancel = self.cancel.clone();
            let heartbeat_cfg = deps.heartbeat;
            let started_at_ms = SystemClock.epoch_ms();
            tasks.spawn(async move {
                let mut kill_registry = SessionRegistry::new();
                let mut ticker = tokio::time::interval(heartbeat_cfg.interval());
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let reconciler = HeartbeatReconciler {
                                store: store.as_ref(),
                                sessions: sessions.as_ref(),
                                registry: registry.as_ref(),
                                started_at_ms,
                            };
                            let now_ms = SystemClock.epoch_ms();
                            if let Err(err) = reconciler.tick(&mut kill_registry, &heartbeat_cfg, now_ms).await {
                                warn!(error = %err, "heartbeat tick failed");
                            }
                        }
                        _ = cancel.cancelled() => break,
                    }
                }
            });
        }

        info!("daemon started");
    }

    /// Idempotent and safe before `start()`. Cancels every long-lived
    /// task and waits for all of them to join, bounded by
    /// [`SHUTDOWN_BOUND`] regardless of subprocess state.
    pub async fn stop(&self) -> Result<(), DaemonError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        info!("daemon stopping");
        self.cancel.cancel();

        let mut join_set = {
            let mut tasks = self.tasks.lock();
            std::mem::replace(&mut *tasks, JoinSet::new())
        };
        let join_all = async move {
            while let Some(result) = join_set.join_next().await {
                if let Err(err) = result {
                    warn!(error = %err, "daemon task panicked during shutdown");
                }
            }
        };

        match tokio::time::timeout(SHUTDOWN_BOUND, join_all).await {
            Ok(()) => {
                info!("daemon stopped");
                Ok(())
            }
            Err(_) => {
                warn!("daemon shutdown exceeded bound, abandoning remaining tasks");
                Err(DaemonError::ShutdownTimedOut(SHUTDOWN_BOUND))
            }
        }
    }
}

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;
