// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! `oj convoy` — inspect and nudge convoys via the `gt` subprocess
//! surface (§6.3), the same one the daemon's convoy manager drives.

use anyhow::{Context, Result};
use clap::Subcommand;
use oj_adapters::{CliRunner, ProcessCliRunner, ResolvedBinaries};

#[derive(Subcommand)]
pub enum ConvoyCommand {
    /// List convoys whose tracked issues are all ready to check.
    Stranded,
    /// Run a convoy-completion check, optionally scoped to one convoy.
    Check {
        /// Convoy id to check. Checks every stranded convoy when omitted.
        convoy_id: Option<String>,
    },
}

pub async fn run(command: ConvoyCommand) -> Result<()> {
    let runner = ProcessCliRunner::new(ResolvedBinaries::resolve().context("resolving gt/bd on PATH")?);
    match command {
        ConvoyCommand::Stranded => stranded(&runner).await,
        ConvoyCommand::Check { convoy_id } => check(&runner, convoy_id).await,
    }
}

async fn stranded(runner: &ProcessCliRunner) -> Result<()> {
    let convoys = runner.convoy_stranded().await.context("gt convoy stranded --json")?;
    if convoys.is_empty() {
        println!("no stranded convoys");
        return Ok(());
    }
    for convoy in convoys {
        println!("{}  ready={}  issues={}", convoy.id, convoy.ready_count, convoy.ready_issues.join(","));
    }
    Ok(())
}

async fn check(runner: &ProcessCliRunner, convoy_id: Option<String>) -> Result<()> {
    runner.convoy_check(convoy_id.as_deref()).await.context("gt convoy check")?;
    match convoy_id {
        Some(id) => println!("checked convoy {id}"),
        None => println!("checked all stranded convoys"),
    }
    Ok(())
}
