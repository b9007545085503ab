// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! The quality-gate pipeline the merge processor runs before a merge
//! (§4.3 step e): `setup -> typecheck -> lint -> build -> test`, stopping at
//! the first failure. Each gate's command is configured per rig rather than
//! assumed, since the pipeline is language-agnostic by design.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use tokio::process::Command;

/// One stage of the quality-gate pipeline, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QualityGateKind {
    Setup,
    Typecheck,
    Lint,
    Build,
    Test,
}

pub const QUALITY_GATE_ORDER: [QualityGateKind; 5] = [
    QualityGateKind::Setup,
    QualityGateKind::Typecheck,
    QualityGateKind::Lint,
    QualityGateKind::Build,
    QualityGateKind::Test,
];

impl QualityGateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityGateKind::Setup => "setup",
            QualityGateKind::Typecheck => "typecheck",
            QualityGateKind::Lint => "lint",
            QualityGateKind::Build => "build",
            QualityGateKind::Test => "test",
        }
    }
}

#[derive(Debug, Error)]
pub enum GateRunError {
    #[error("failed to spawn gate {gate}: {source}")]
    SpawnFailed { gate: &'static str, #[source] source: std::io::Error },
}

/// Per-gate shell command, keyed by rig (a rig's repository is one
/// language/toolchain; commands are opaque strings run via `sh -c`). A gate
/// with no configured command is treated as passing.
#[derive(Debug, Clone, Default)]
pub struct GateCommands {
    pub setup: Option<String>,
    pub typecheck: Option<String>,
    pub lint: Option<String>,
    pub build: Option<String>,
    pub test: Option<String>,
}

impl GateCommands {
    fn command_for(&self, kind: QualityGateKind) -> Option<&str> {
        match kind {
            QualityGateKind::Setup => self.setup.as_deref(),
            QualityGateKind::Typecheck => self.typecheck.as_deref(),
            QualityGateKind::Lint => self.lint.as_deref(),
            QualityGateKind::Build => self.build.as_deref(),
            QualityGateKind::Test => self.test.as_deref(),
        }
    }
}

/// Runs one named quality gate against a working directory.
#[async_trait]
pub trait QualityGateRunner: Send + Sync + 'static {
    async fn run(&self, gate: QualityGateKind, workdir: &Path) -> Result<bool, GateRunError>;
}

/// Real [`QualityGateRunner`] that shells each configured gate command via
/// `sh -c` in the given working directory.
pub struct ShellGateRunner {
    pub commands: GateCommands,
}

impl ShellGateRunner {
    pub fn new(commands: GateCommands) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl QualityGateRunner for ShellGateRunner {
    async fn run(&self, gate: QualityGateKind, workdir: &Path) -> Result<bool, GateRunError> {
        let Some(command) = self.commands.command_for(gate) else { return Ok(true) };
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(workdir)
            .output()
            .await
            .map_err(|source| GateRunError::SpawnFailed { gate: gate.as_str(), source })?;
        if !output.status.success() {
            tracing::warn!(gate = gate.as_str(), stderr = %String::from_utf8_lossy(&output.stderr), "quality gate failed");
        }
        Ok(output.status.success())
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Scripted [`QualityGateRunner`] for tests. Every gate passes unless
    /// explicitly set to fail.
    #[derive(Clone, Default)]
    pub struct FakeGateRunner {
        results: Arc<Mutex<HashMap<&'static str, bool>>>,
    }

    impl FakeGateRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set(&self, gate: QualityGateKind, pass: bool) {
            self.results.lock().insert(gate.as_str(), pass);
        }
    }

    #[async_trait]
    impl QualityGateRunner for FakeGateRunner {
        async fn run(&self, gate: QualityGateKind, _workdir: &Path) -> Result<bool, GateRunError> {
            Ok(*self.results.lock().get(gate.as_str()).unwrap_or(&true))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeGateRunner;
