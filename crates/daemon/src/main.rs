// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! Odd Jobs Daemon (ojd): the background process that supervises patrol
//! sessions — starting, nudging, and killing the orchestrator/monitor/
//! processor controllers per rig, and driving the convoy manager's event
//! poll and stranded-convoy sweeps. Policy lives in `oj-engine`; this
//! binary only wires up the real adapters and keeps the tasks running.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use oj_adapters::{ProcessCliRunner, ResolvedBinaries, TmuxSessionHost};
use oj_core::{RigRegistry, TownConfig};
use oj_daemon::{Daemon, DaemonDeps};
use oj_storage::{BeadsStore, InMemoryBeadsStore};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local/state")))
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("oddjobs")
}

fn config_path() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from("/tmp")).join("oddjobs").join("town.toml")
}

fn load_config() -> TownConfig {
    match std::fs::read_to_string(config_path()) {
        Ok(contents) => match TownConfig::from_toml_str(&contents) {
            Ok(cfg) => cfg,
            Err(err) => {
                warn!(error = %err, "failed to parse town config, using defaults");
                TownConfig::default()
            }
        },
        Err(_) => TownConfig::default(),
    }
}

fn setup_logging(log_dir: &std::path::Path) -> std::io::Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::never(log_dir, "ojd.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let state_dir = state_dir();
    let _log_guard = setup_logging(&state_dir.join("logs"))?;

    info!(version = env!("CARGO_PKG_VERSION"), "ojd starting");

    let config = load_config();

    let binaries = match ResolvedBinaries::resolve() {
        Ok(b) => b,
        Err(err) => {
            error!(error = %err, "failed to resolve gt/bd on PATH");
            return Err(err.into());
        }
    };

    let store: Arc<dyn BeadsStore> = Arc::new(InMemoryBeadsStore::new());
    let rig_stores: HashMap<String, Arc<dyn BeadsStore>> = HashMap::new();

    let deps = DaemonDeps {
        store,
        rig_stores,
        sessions: Arc::new(TmuxSessionHost::new()),
        cli: Arc::new(ProcessCliRunner::new(binaries)),
        registry: RigRegistry::new(),
        heartbeat: config.heartbeat,
        convoy_event_poll_interval: config.convoy.event_poll_interval(),
        convoy_stranded_scan_interval: config.convoy.stranded_scan_interval(),
    };

    let daemon = Daemon::new();
    daemon.start(deps);
    info!("ojd started");

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }

    info!("ojd received shutdown signal");
    if let Err(err) = daemon.stop().await {
        warn!(error = %err, "ojd shutdown exceeded its bound");
    }

    // Give the non-blocking log writer a moment to flush before exit.
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
