// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! `oj`: operator-facing inspection and control for the town. Thin by
//! design — the daemon and its engine own all policy. `daemon`/`convoy`
//! start/stop `ojd` and shell the same `gt`/`bd` subprocess surface
//! (§6.3) the daemon's own controllers drive automatically; `refinery`
//! drives the merge-processor pipeline (§4.3) directly against a JSON
//! bead snapshot, since that pipeline has no `gt`/`bd` surface to shell.

mod commands;
mod daemon_process;
mod env;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{convoy, daemon, refinery};

#[derive(Parser)]
#[command(name = "oj", version, about = "Odd Jobs town control plane")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Control the `ojd` background process.
    Daemon {
        #[command(subcommand)]
        command: daemon::DaemonCommand,
    },
    /// Inspect and nudge convoys.
    Convoy {
        #[command(subcommand)]
        command: convoy::ConvoyCommand,
    },
    /// Operator-triggered merge-queue actions.
    Refinery {
        #[command(subcommand)]
        command: refinery::RefineryCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Daemon { command } => daemon::run(command),
        Command::Convoy { command } => convoy::run(command).await,
        Command::Refinery { command } => refinery::run(command).await,
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
