// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! Git working-tree operations for the merge pipeline (§4.3 steps b-g): a
//! thin seam over `git` shelled the same way the rest of this crate's
//! subprocess surface is — no libgit2 binding, just `tokio::process::Command`
//! under a timeout.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Bound on any single git invocation.
pub const GIT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git {args} timed out after {timeout:?}")]
    TimedOut { args: String, timeout: Duration },

    #[error("failed to spawn git {args}: {source}")]
    SpawnFailed { args: String, #[source] source: std::io::Error },

    #[error("git {args} failed: {stderr}")]
    NonZeroExit { args: String, stderr: String },
}

async fn run(repo_root: &Path, args: &[&str]) -> Result<std::process::Output, GitError> {
    let joined = args.join(" ");
    let mut cmd = Command::new("git");
    cmd.args(args).current_dir(repo_root).env_remove("GIT_DIR").env_remove("GIT_WORK_TREE");
    match tokio::time::timeout(GIT_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(source)) => Err(GitError::SpawnFailed { args: joined, source }),
        Err(_) => Err(GitError::TimedOut { args: joined, timeout: GIT_TIMEOUT }),
    }
}

fn ok_or_nonzero(output: std::process::Output, args: &str) -> Result<std::process::Output, GitError> {
    if output.status.success() {
        Ok(output)
    } else {
        Err(GitError::NonZeroExit { args: args.to_string(), stderr: String::from_utf8_lossy(&output.stderr).into_owned() })
    }
}

/// Outcome of a rebase attempt (§4.3 step c).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebaseOutcome {
    Clean,
    Conflict { sha: String, files: Vec<String> },
}

/// Git operations the merge pipeline needs against a long-lived checkout of
/// the rig's repository (§4.3 steps b-g). One `GitOps` is scoped to one
/// repository root.
#[async_trait]
pub trait GitOps: Send + Sync + 'static {
    async fn fetch(&self, branch: &str) -> Result<(), GitError>;
    async fn checkout(&self, branch: &str) -> Result<(), GitError>;
    async fn rebase_onto(&self, target_branch: &str, squash: bool) -> Result<RebaseOutcome, GitError>;
    async fn abort_rebase(&self) -> Result<(), GitError>;
    async fn fast_forward_merge(&self, feature_branch: &str, target_branch: &str) -> Result<String, GitError>;
    async fn push(&self, branch: &str) -> Result<(), GitError>;
    async fn remote_sha(&self, branch: &str) -> Result<String, GitError>;
    async fn local_sha(&self, branch: &str) -> Result<String, GitError>;
    async fn delete_branch(&self, branch: &str) -> Result<(), GitError>;
}

/// Real [`GitOps`] backed by `tokio::process::Command::new("git")` against
/// a checked-out repository.
pub struct RealGitOps {
    pub repo_root: PathBuf,
}

impl RealGitOps {
    pub fn new(repo_root: PathBuf) -> Self {
        Self { repo_root }
    }
}

#[async_trait]
impl GitOps for RealGitOps {
    async fn fetch(&self, branch: &str) -> Result<(), GitError> {
        let out = run(&self.repo_root, &["fetch", "origin", branch]).await?;
        ok_or_nonzero(out, "fetch").map(|_| ())
    }

    async fn checkout(&self, branch: &str) -> Result<(), GitError> {
        let out = run(&self.repo_root, &["checkout", branch]).await?;
        ok_or_nonzero(out, "checkout").map(|_| ())
    }

    async fn rebase_onto(&self, target_branch: &str, squash: bool) -> Result<RebaseOutcome, GitError> {
        let args: Vec<&str> =
            if squash { vec!["rebase", "--autosquash", target_branch] } else { vec!["rebase", target_branch] };
        let out = run(&self.repo_root, &args).await?;
        if out.status.success() {
            return Ok(RebaseOutcome::Clean);
        }

        let status = run(&self.repo_root, &["diff", "--name-only", "--diff-filter=U"]).await?;
        let files = String::from_utf8_lossy(&status.stdout).lines().map(str::to_string).collect();
        let sha_out = run(&self.repo_root, &["rev-parse", "HEAD"]).await?;
        let sha = String::from_utf8_lossy(&sha_out.stdout).trim().to_string();
        Ok(RebaseOutcome::Conflict { sha, files })
    }

    async fn abort_rebase(&self) -> Result<(), GitError> {
        let out = run(&self.repo_root, &["rebase", "--abort"]).await?;
        ok_or_nonzero(out, "rebase --abort").map(|_| ())
    }

    async fn fast_forward_merge(&self, feature_branch: &str, target_branch: &str) -> Result<String, GitError> {
        let out = run(&self.repo_root, &["checkout", target_branch]).await?;
        ok_or_nonzero(out, "checkout target")?;
        let out = run(&self.repo_root, &["merge", "--ff-only", feature_branch]).await?;
        ok_or_nonzero(out, "merge --ff-only")?;
        let sha_out = run(&self.repo_root, &["rev-parse", "HEAD"]).await?;
        Ok(String::from_utf8_lossy(&sha_out.stdout).trim().to_string())
    }

    async fn push(&self, branch: &str) -> Result<(), GitError> {
        let out = run(&self.repo_root, &["push", "origin", branch]).await?;
        ok_or_nonzero(out, "push").map(|_| ())
    }

    async fn remote_sha(&self, branch: &str) -> Result<String, GitError> {
        let out = run(&self.repo_root, &["rev-parse", &format!("origin/{branch}")]).await?;
        ok_or_nonzero(out, "rev-parse origin").map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
    }

    async fn local_sha(&self, branch: &str) -> Result<String, GitError> {
        let out = run(&self.repo_root, &["rev-parse", branch]).await?;
        ok_or_nonzero(out, "rev-parse").map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
    }

    async fn delete_branch(&self, branch: &str) -> Result<(), GitError> {
        match run(&self.repo_root, &["branch", "-D", branch]).await.and_then(|o| ok_or_nonzero(o, "branch -D")) {
            Ok(_) => {}
            Err(err) => tracing::warn!(branch, error = %err, "failed to delete local branch"),
        }
        match run(&self.repo_root, &["push", "origin", "--delete", branch])
            .await
            .and_then(|o| ok_or_nonzero(o, "push --delete"))
        {
            Ok(_) => {}
            Err(err) => tracing::warn!(branch, error = %err, "failed to delete remote branch"),
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone, Default)]
    pub struct FakeGitOpsState {
        pub fetched: Vec<String>,
        pub rebase_outcome: Option<RebaseOutcome>,
        pub pushed: Vec<String>,
        pub deleted_branches: Vec<String>,
        pub remote_sha: Option<String>,
        pub local_sha: Option<String>,
        pub merge_sha: String,
    }

    /// Scripted [`GitOps`] for tests. Records every invocation and returns
    /// whatever the test pre-loaded.
    #[derive(Clone, Default)]
    pub struct FakeGitOps {
        state: Arc<Mutex<FakeGitOpsState>>,
    }

    impl FakeGitOps {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_rebase_outcome(&self, outcome: RebaseOutcome) {
            self.state.lock().rebase_outcome = Some(outcome);
        }

        /// Seed both local and remote shas to the same value, so a push
        /// verification in a test passes by default.
        pub fn set_shas(&self, sha: &str) {
            let mut state = self.state.lock();
            state.remote_sha = Some(sha.to_string());
            state.local_sha = Some(sha.to_string());
            state.merge_sha = sha.to_string();
        }

        pub fn set_remote_sha(&self, sha: &str) {
            self.state.lock().remote_sha = Some(sha.to_string());
        }

        pub fn state(&self) -> FakeGitOpsState {
            self.state.lock().clone()
        }
    }

    #[async_trait]
    impl GitOps for FakeGitOps {
        async fn fetch(&self, branch: &str) -> Result<(), GitError> {
            self.state.lock().fetched.push(branch.to_string());
            Ok(())
        }

        async fn checkout(&self, _branch: &str) -> Result<(), GitError> {
            Ok(())
        }

        async fn rebase_onto(&self, _target_branch: &str, _squash: bool) -> Result<RebaseOutcome, GitError> {
            Ok(self.state.lock().rebase_outcome.clone().unwrap_or(RebaseOutcome::Clean))
        }

        async fn abort_rebase(&self) -> Result<(), GitError> {
            Ok(())
        }

        async fn fast_forward_merge(&self, _feature_branch: &str, _target_branch: &str) -> Result<String, GitError> {
            Ok(self.state.lock().merge_sha.clone())
        }

        async fn push(&self, branch: &str) -> Result<(), GitError> {
            self.state.lock().pushed.push(branch.to_string());
            Ok(())
        }

        async fn remote_sha(&self, _branch: &str) -> Result<String, GitError> {
            Ok(self.state.lock().remote_sha.clone().unwrap_or_default())
        }

        async fn local_sha(&self, _branch: &str) -> Result<String, GitError> {
            Ok(self.state.lock().local_sha.clone().unwrap_or_default())
        }

        async fn delete_branch(&self, branch: &str) -> Result<(), GitError> {
            self.state.lock().deleted_branches.push(branch.to_string());
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeGitOps, FakeGitOpsState};
