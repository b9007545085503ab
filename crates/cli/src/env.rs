// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! Shared filesystem locations, mirroring the daemon's own `state_dir()`
//! so the CLI's `daemon` subcommand agrees with `ojd` about where the pid
//! file and logs live.

use std::path::PathBuf;

use anyhow::{anyhow, Result};

pub fn state_dir() -> Result<PathBuf> {
    let dir = dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local/state")))
        .ok_or_else(|| anyhow!("could not determine a state directory for this platform"))?
        .join("oddjobs");
    Ok(dir)
}

pub fn pid_path() -> Result<PathBuf> {
    Ok(state_dir()?.join("daemon.pid"))
}

pub fn log_path() -> Result<PathBuf> {
    Ok(state_dir()?.join("logs").join("ojd.log"))
}
