// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! Process-group-aware subprocess supervision (§4.1 "Failure semantics",
//! §5 "Cancellation"): every subprocess the daemon launches runs under the
//! daemon's shutdown context; cancellation kills the whole process group
//! (not just the direct child) so stuck grandchildren never orphan.

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::process::Output;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum KillError {
    #[error("failed to spawn subprocess: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to collect subprocess output: {0}")]
    Wait(#[source] std::io::Error),

    #[error("subprocess cancelled before completion")]
    Cancelled,
}

/// Run `cmd` to completion, or kill its entire process group and return
/// [`KillError::Cancelled`] if `cancel` fires first. Every child is made
/// its own process-group leader via [`std::os::unix::process::CommandExt::process_group`]
/// so the kill below reaches stray grandchildren too.
pub async fn run_killable(mut cmd: Command, cancel: &CancellationToken) -> Result<Output, KillError> {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(KillError::Spawn)?;
    let pid = child.id();

    tokio::select! {
        output = child.wait_with_output() => output.map_err(KillError::Wait),
        _ = cancel.cancelled() => {
            if let Some(pid) = pid {
                let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
            }
            Err(KillError::Cancelled)
        }
    }
}

#[cfg(test)]
#[path = "subprocess_killer_tests.rs"]
mod tests;
