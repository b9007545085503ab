// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! External collaborators (§6.2, §6.3): the session host, the CLI
//! subprocess surface, and the merge pipeline's git/quality-gate seams. All
//! are specified as opaque traits; production wiring picks the real
//! implementation, tests use the fakes.

pub mod gate_runner;
pub mod git;
mod session_host;
mod subprocess;

pub use gate_runner::{GateCommands, GateRunError, QualityGateKind, QualityGateRunner, ShellGateRunner, QUALITY_GATE_ORDER};
pub use git::{GitError, GitOps, RealGitOps, RebaseOutcome, GIT_TIMEOUT};
pub use session_host::{PaneLiveness, SessionHost, SessionHostError, SessionInfo, TmuxSessionHost};
pub use subprocess::{CliError, CliRunner, ProcessCliRunner, ResolvedBinaries, StrandedConvoy};

#[cfg(any(test, feature = "test-support"))]
pub use gate_runner::FakeGateRunner;
#[cfg(any(test, feature = "test-support"))]
pub use git::{FakeGitOps, FakeGitOpsState};
#[cfg(any(test, feature = "test-support"))]
pub use session_host::FakeSessionHost;
#[cfg(any(test, feature = "test-support"))]
pub use subprocess::{FakeCliRunner, FakeCliRunnerState};
