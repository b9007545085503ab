// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! The external-subprocess surface (§6.3): the small CLI the convoy
//! manager and orchestrator invoke. Resolved binary paths are captured at
//! startup (§4.2) so subprocesses are immune to PATH drift between boot
//! and a later invocation.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to resolve binary {0:?} on PATH: {1}")]
    BinaryNotFound(String, #[source] which::Error),

    #[error("subprocess {command} exited with code {code}: {stderr}")]
    NonZeroExit { command: String, code: i32, stderr: String },

    #[error("failed to spawn subprocess {0:?}: {1}")]
    SpawnFailed(String, #[source] std::io::Error),

    #[error("failed to parse subprocess JSON output: {0}")]
    BadJson(#[from] serde_json::Error),
}

/// One entry of `convoy stranded --json`'s output array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StrandedConvoy {
    pub id: String,
    pub ready_count: u32,
    pub ready_issues: Vec<String>,
}

/// The CLI surface invoked by the convoy manager and orchestrator (§6.3). Each
/// call is expected to be context-cancellable by the caller's own timeout;
/// the trait itself carries no cancellation token since tokio's
/// `select!`/`timeout` wraps any of these calls without cooperation from
/// the implementation.
#[async_trait]
pub trait CliRunner: Send + Sync + 'static {
    async fn convoy_stranded(&self) -> Result<Vec<StrandedConvoy>, CliError>;

    async fn convoy_check(&self, convoy_id: Option<&str>) -> Result<(), CliError>;

    async fn sling(&self, issue_id: &str, rig: &str, no_boot: bool, agent: Option<&str>) -> Result<(), CliError>;
}

/// Resolved absolute paths to the binaries this process shells out to,
/// captured once at startup per §4.2.
#[derive(Debug, Clone)]
pub struct ResolvedBinaries {
    pub gt: PathBuf,
    pub bd: PathBuf,
}

impl ResolvedBinaries {
    pub fn resolve() -> Result<Self, CliError> {
        Ok(Self {
            gt: which::which("gt").map_err(|e| CliError::BinaryNotFound("gt".to_string(), e))?,
            bd: which::which("bd").map_err(|e| CliError::BinaryNotFound("bd".to_string(), e))?,
        })
    }
}

/// Real [`CliRunner`] backed by `tokio::process::Command` against
/// [`ResolvedBinaries`].
pub struct ProcessCliRunner {
    binaries: ResolvedBinaries,
}

impl ProcessCliRunner {
    pub fn new(binaries: ResolvedBinaries) -> Self {
        Self { binaries }
    }

    async fn run(&self, binary: &PathBuf, args: &[&str]) -> Result<std::process::Output, CliError> {
        tokio::process::Command::new(binary)
            .args(args)
            .output()
            .await
            .map_err(|e| CliError::SpawnFailed(binary.display().to_string(), e))
    }

    fn ok_or_nonzero(output: &std::process::Output, command: &str) -> Result<(), CliError> {
        if output.status.success() {
            Ok(())
        } else {
            Err(CliError::NonZeroExit {
                command: command.to_string(),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}

#[async_trait]
impl CliRunner for ProcessCliRunner {
    async fn convoy_stranded(&self) -> Result<Vec<StrandedConvoy>, CliError> {
        let output = self.run(&self.binaries.gt, &["convoy", "stranded", "--json"]).await?;
        Self::ok_or_nonzero(&output, "convoy stranded --json")?;
        Ok(serde_json::from_slice(&output.stdout)?)
    }

    async fn convoy_check(&self, convoy_id: Option<&str>) -> Result<(), CliError> {
        let mut args = vec!["convoy", "check"];
        if let Some(id) = convoy_id {
            args.push(id);
        }
        let output = self.run(&self.binaries.gt, &args).await?;
        Self::ok_or_nonzero(&output, "convoy check")
    }

    async fn sling(&self, issue_id: &str, rig: &str, no_boot: bool, agent: Option<&str>) -> Result<(), CliError> {
        let mut args = vec!["sling", issue_id, rig];
        if no_boot {
            args.push("--no-boot");
        }
        if let Some(a) = agent {
            args.push("--agent");
            args.push(a);
        }
        let output = self.run(&self.binaries.gt, &args).await?;
        Self::ok_or_nonzero(&output, "sling")
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone, Default)]
    pub struct FakeCliRunnerState {
        pub stranded: Vec<StrandedConvoy>,
        pub checked: Vec<Option<String>>,
        pub slung: Vec<(String, String, bool, Option<String>)>,
    }

    /// Scripted [`CliRunner`] for tests. Records every invocation and
    /// returns whatever the test pre-loaded via [`FakeCliRunner::state`].
    #[derive(Clone, Default)]
    pub struct FakeCliRunner {
        state: Arc<Mutex<FakeCliRunnerState>>,
    }

    impl FakeCliRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_stranded(&self, convoys: Vec<StrandedConvoy>) {
            self.state.lock().stranded = convoys;
        }

        pub fn state(&self) -> FakeCliRunnerState {
            self.state.lock().clone()
        }
    }

    #[async_trait]
    impl CliRunner for FakeCliRunner {
        async fn convoy_stranded(&self) -> Result<Vec<StrandedConvoy>, CliError> {
            Ok(self.state.lock().stranded.clone())
        }

        async fn convoy_check(&self, convoy_id: Option<&str>) -> Result<(), CliError> {
            self.state.lock().checked.push(convoy_id.map(str::to_string));
            Ok(())
        }

        async fn sling(&self, issue_id: &str, rig: &str, no_boot: bool, agent: Option<&str>) -> Result<(), CliError> {
            self.state.lock().slung.push((
                issue_id.to_string(),
                rig.to_string(),
                no_boot,
                agent.map(str::to_string),
            ));
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeCliRunner, FakeCliRunnerState};

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
