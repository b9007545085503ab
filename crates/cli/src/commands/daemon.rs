// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! `oj daemon` — start, stop, and check `ojd`.

use anyhow::Result;
use clap::Subcommand;

use crate::daemon_process;

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Start the daemon in the background.
    Start,
    /// Stop the daemon.
    Stop,
    /// Report whether the daemon is running.
    Status,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    match command {
        DaemonCommand::Start => start(),
        DaemonCommand::Stop => stop(),
        DaemonCommand::Status => status(),
    }
}

fn start() -> Result<()> {
    let pid = daemon_process::start_background()?;
    println!("daemon started (pid {pid})");
    Ok(())
}

fn stop() -> Result<()> {
    if daemon_process::stop()? {
        println!("daemon stopped");
    } else {
        println!("daemon not running");
    }
    Ok(())
}

fn status() -> Result<()> {
    match daemon_process::running_pid()? {
        Some(pid) => println!("running (pid {pid})"),
        None => println!("not running"),
    }
    Ok(())
}
