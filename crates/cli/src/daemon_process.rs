// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! Out-of-process management of `ojd`: a pid file under the state
//! directory plus `kill -0`/`SIGTERM` for liveness and shutdown. `ojd`
//! itself has no control socket in scope (§4.1) — the CLI's daemon
//! subcommand only starts/stops/checks the process, it does not query
//! live daemon state over IPC.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::env::pid_path;

/// The pid recorded in the pid file, if the file exists and parses.
pub fn read_pid(pid_path: &Path) -> Option<i32> {
    std::fs::read_to_string(pid_path).ok()?.trim().parse().ok()
}

/// Whether a pid still names a live process (`kill(pid, 0)`, no signal
/// actually delivered).
pub fn process_alive(pid: i32) -> bool {
    kill(Pid::from_raw(pid), None).is_ok()
}

/// Find the `ojd` binary: next to the running `oj` executable first (a
/// dev or install-tree sibling), falling back to a PATH lookup.
pub fn find_ojd_binary() -> PathBuf {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("ojd");
            if sibling.exists() {
                return sibling;
            }
        }
    }
    PathBuf::from("ojd")
}

/// Spawn `ojd` detached in the background and record its pid. Returns an
/// error if a still-live daemon's pid file already exists.
pub fn start_background() -> Result<u32> {
    let pid_file = pid_path()?;
    if let Some(pid) = read_pid(&pid_file) {
        if process_alive(pid) {
            return Err(anyhow!("daemon already running (pid {pid})"));
        }
    }

    if let Some(parent) = pid_file.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let child = Command::new(find_ojd_binary())
        .spawn()
        .with_context(|| "failed to spawn ojd".to_string())?;
    std::fs::write(&pid_file, child.id().to_string())?;
    Ok(child.id())
}

/// Send `SIGTERM` to a running daemon and remove its pid file. Returns
/// `false` if no daemon was recorded as running.
pub fn stop() -> Result<bool> {
    let pid_file = pid_path()?;
    let Some(pid) = read_pid(&pid_file) else {
        return Ok(false);
    };
    if !process_alive(pid) {
        let _ = std::fs::remove_file(&pid_file);
        return Ok(false);
    }

    kill(Pid::from_raw(pid), Signal::SIGTERM).with_context(|| format!("failed to signal pid {pid}"))?;
    let _ = std::fs::remove_file(&pid_file);
    Ok(true)
}

/// `Some(pid)` if the pid file names a live process.
pub fn running_pid() -> Result<Option<i32>> {
    let pid_file = pid_path()?;
    Ok(read_pid(&pid_file).filter(|pid| process_alive(*pid)))
}

#[cfg(test)]
#[path = "daemon_process_tests.rs"]
mod tests;
