// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! `oj refinery` — operator-triggered merge-queue actions (§4.3). Each
//! invocation loads the same JSON bead snapshot the daemon would
//! checkpoint, drives one step of [`oj_engine::MergeProcessor`] against a
//! real git checkout and quality gates, then writes the snapshot back.
//! `prepare`/`merge`/`reject` here are the exact pipeline steps the
//! merge-processor's patrol loop (§4.4) runs automatically; this command
//! exists so an operator can single-step it by hand.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use oj_adapters::{GateCommands, RealGitOps, ShellGateRunner};
use oj_core::{BeadId, Clock, MergeConfig, SystemClock};
use oj_engine::{GateFailureVerdict, MergeProcessor, MergeSlot, PrepareOutcome};
use oj_storage::InMemoryBeadsStore;

/// Flags shared by every `refinery` subcommand: which rig's queue to act
/// on and where its checkout and quality-gate commands live.
#[derive(clap::Args)]
pub struct RigOpts {
    /// Rig name, used to find this rig's lifecycle monitor mailbox.
    #[arg(long, default_value = "gt")]
    rig: String,
    /// Bead-id prefix minted for beads this rig creates.
    #[arg(long, default_value = "gt-")]
    bead_prefix: String,
    /// The rig's default branch; merges to it also close the source issue.
    #[arg(long, default_value = "main")]
    default_branch: String,
    /// Path to the rig's long-lived git checkout.
    #[arg(long)]
    repo: PathBuf,
    #[arg(long)]
    setup_cmd: Option<String>,
    #[arg(long)]
    typecheck_cmd: Option<String>,
    #[arg(long)]
    lint_cmd: Option<String>,
    #[arg(long)]
    build_cmd: Option<String>,
    #[arg(long)]
    test_cmd: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Verdict {
    BranchRegression,
    PreExisting,
}

impl From<Verdict> for GateFailureVerdict {
    fn from(v: Verdict) -> Self {
        match v {
            Verdict::BranchRegression => GateFailureVerdict::BranchRegression,
            Verdict::PreExisting => GateFailureVerdict::PreExisting,
        }
    }
}

#[derive(Subcommand)]
pub enum RefineryCommand {
    /// Prepare the next merge request (claim, rebase, run gates).
    Prepare {
        #[command(flatten)]
        opts: RigOpts,
    },
    /// Merge the given merge request, which this processor must still hold
    /// a live claim on (normally from a prior `prepare`).
    Merge {
        mr_id: String,
        #[command(flatten)]
        opts: RigOpts,
    },
    /// Reject a claimed merge request with a verdict and reason.
    Reject {
        mr_id: String,
        verdict: Verdict,
        reason: String,
        #[command(flatten)]
        opts: RigOpts,
    },
}

pub async fn run(command: RefineryCommand) -> Result<()> {
    match command {
        RefineryCommand::Prepare { opts } => prepare(opts).await,
        RefineryCommand::Merge { mr_id, opts } => merge(&mr_id, opts).await,
        RefineryCommand::Reject { mr_id, verdict, reason, opts } => reject(&mr_id, verdict, &reason, opts).await,
    }
}

fn snapshot_path() -> Result<PathBuf> {
    Ok(crate::env::state_dir()?.join("beads.json"))
}

fn load_store() -> Result<InMemoryBeadsStore> {
    let path = snapshot_path()?;
    match std::fs::read_to_string(&path) {
        Ok(contents) => InMemoryBeadsStore::from_json(&contents).with_context(|| format!("parsing {}", path.display())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(InMemoryBeadsStore::new()),
        Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
    }
}

fn save_store(store: &InMemoryBeadsStore) -> Result<()> {
    let path = snapshot_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, store.to_json()?).with_context(|| format!("writing {}", path.display()))
}

fn gate_commands(opts: &RigOpts) -> GateCommands {
    GateCommands {
        setup: opts.setup_cmd.clone(),
        typecheck: opts.typecheck_cmd.clone(),
        lint: opts.lint_cmd.clone(),
        build: opts.build_cmd.clone(),
        test: opts.test_cmd.clone(),
    }
}

async fn prepare(opts: RigOpts) -> Result<()> {
    let store = load_store()?;
    let git = RealGitOps::new(opts.repo.clone());
    let gates = ShellGateRunner::new(gate_commands(&opts));
    let slot = MergeSlot::new();
    let processor = MergeProcessor::new(
        &store,
        &git,
        &gates,
        &slot,
        MergeConfig::default(),
        BeadId::from_string(format!("{}cli-operator", opts.bead_prefix)),
        opts.rig,
        opts.bead_prefix,
        opts.default_branch,
        opts.repo,
    );

    let now_ms = SystemClock.epoch_ms();
    let outcome = processor.prepare(now_ms).await.context("refinery prepare")?;
    let label = match outcome {
        PrepareOutcome::Ok => "ok",
        PrepareOutcome::Conflict => "conflict",
        PrepareOutcome::GateFail => "gate-fail",
        PrepareOutcome::Empty => "empty",
        PrepareOutcome::Infra => "infra",
    };
    save_store(&store)?;
    println!("prepare: {label}");
    if let Some(mr_id) = processor.current_claim() {
        println!("claimed: {}", mr_id.as_str());
    }
    Ok(())
}

async fn merge(mr_id: &str, opts: RigOpts) -> Result<()> {
    let store = load_store()?;
    let git = RealGitOps::new(opts.repo.clone());
    let gates = ShellGateRunner::new(gate_commands(&opts));
    let slot = MergeSlot::new();
    let processor = MergeProcessor::new(
        &store,
        &git,
        &gates,
        &slot,
        MergeConfig::default(),
        BeadId::from_string(format!("{}cli-operator", opts.bead_prefix)),
        opts.rig,
        opts.bead_prefix,
        opts.default_branch,
        opts.repo,
    );

    processor.resume_claim(BeadId::from_string(mr_id)).context("this processor holds no live claim on that MR")?;
    processor.merge().await.context("refinery merge")?;
    save_store(&store)?;
    println!("merged {mr_id}");
    Ok(())
}

async fn reject(mr_id: &str, verdict: Verdict, reason: &str, opts: RigOpts) -> Result<()> {
    let store = load_store()?;
    let git = RealGitOps::new(opts.repo.clone());
    let gates = ShellGateRunner::new(gate_commands(&opts));
    let slot = MergeSlot::new();
    let processor = MergeProcessor::new(
        &store,
        &git,
        &gates,
        &slot,
        MergeConfig::default(),
        BeadId::from_string(format!("{}cli-operator", opts.bead_prefix)),
        opts.rig,
        opts.bead_prefix,
        opts.default_branch,
        opts.repo,
    );

    let now_ms = SystemClock.epoch_ms();
    processor.resume_claim(BeadId::from_string(mr_id)).context("this processor holds no live claim on that MR")?;
    processor.reject(verdict.into(), reason, now_ms).context("refinery reject")?;
    save_store(&store)?;
    println!("rejected {mr_id}: {reason}");
    Ok(())
}
