// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! The session host (§6.2): an opaque terminal-multiplexer surface the
//! heartbeat reconciler and worker lifecycle drive sessions through. No
//! assumption is made about the underlying implementation (tmux, screen,
//! a container runtime) — only the primitive set below.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionHostError {
    #[error("session {0} not found")]
    NotFound(String),

    #[error("session {0} already exists")]
    AlreadyExists(String),

    #[error("session host operation failed: {0}")]
    Failed(String),
}

/// A session's liveness as reported by the underlying pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneLiveness {
    Alive,
    Dead,
}

/// A session as the heartbeat reconciler sees it: just enough to drive the
/// TOCTOU-guarded kill decision in §5 ("Shared resources").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: String,
    pub created_at_ms: u64,
}

/// Opaque session-host primitives (§6.2): `Create`, `Kill`, `SendKeys`,
/// `SetEnv`, `HasSession`, `ListSessions`, `PaneLiveness`,
/// `SetPaneDiedHook`.
#[async_trait]
pub trait SessionHost: Send + Sync + 'static {
    async fn create(
        &self,
        session_id: &str,
        work_dir: &str,
        command: &str,
        env: &HashMap<String, String>,
    ) -> Result<(), SessionHostError>;

    async fn has_session(&self, id: &str) -> Result<bool, SessionHostError>;

    /// Kill a session. `graceful` requests the underlying host attempt a
    /// clean shutdown before a hard kill; callers in the heartbeat
    /// reconciler use this for the first kill attempt in a cooldown window.
    async fn kill(&self, id: &str, graceful: bool) -> Result<(), SessionHostError>;

    async fn send_keys(&self, id: &str, keys: &str) -> Result<(), SessionHostError>;

    async fn set_env(&self, id: &str, kv: &HashMap<String, String>) -> Result<(), SessionHostError>;

    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, SessionHostError>;

    async fn pane_liveness(&self, id: &str) -> Result<PaneLiveness, SessionHostError>;

    /// Register a hook fired (out of band, by the host) when a pane exits.
    /// Reference implementations below treat this as a no-op since they
    /// have no real pane process to watch.
    async fn set_pane_died_hook(&self, id: &str) -> Result<(), SessionHostError>;

    /// The TOCTOU guard in §5: before a destructive action taken on session
    /// `id` after an earlier `has_session` observation, confirm the
    /// session's creation timestamp still matches what was recorded then.
    /// A mismatch means the session was killed and replaced between
    /// detection and action — the caller must not act on the stale one.
    async fn still_same_session(&self, id: &str, observed_created_at_ms: u64) -> Result<bool, SessionHostError> {
        let sessions = self.list_sessions().await?;
        Ok(sessions.iter().any(|s| s.id == id && s.created_at_ms == observed_created_at_ms))
    }
}

/// Real [`SessionHost`] backed by `tmux`, shelled out to via
/// `tokio::process::Command`. Session ids are tmux session names directly
/// — no further namespacing is applied.
pub struct TmuxSessionHost;

impl TmuxSessionHost {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output, SessionHostError> {
        tokio::process::Command::new("tmux")
            .args(args)
            .output()
            .await
            .map_err(|e| SessionHostError::Failed(format!("failed to run tmux: {e}")))
    }
}

impl Default for TmuxSessionHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionHost for TmuxSessionHost {
    async fn create(
        &self,
        session_id: &str,
        work_dir: &str,
        command: &str,
        env: &HashMap<String, String>,
    ) -> Result<(), SessionHostError> {
        let output = self.run(&["new-session", "-d", "-s", session_id, "-c", work_dir, command]).await?;
        if !output.status.success() {
            return Err(SessionHostError::Failed(format!(
                "tmux new-session -t {session_id} failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        if !env.is_empty() {
            self.set_env(session_id, env).await?;
        }
        Ok(())
    }

    async fn has_session(&self, id: &str) -> Result<bool, SessionHostError> {
        let output = self.run(&["has-session", "-t", id]).await?;
        Ok(output.status.success())
    }

    async fn kill(&self, id: &str, _graceful: bool) -> Result<(), SessionHostError> {
        let output = self.run(&["kill-session", "-t", id]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SessionHostError::NotFound(id.to_string()))
        }
    }

    async fn send_keys(&self, id: &str, keys: &str) -> Result<(), SessionHostError> {
        let output = self.run(&["send-keys", "-t", id, keys, "Enter"]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SessionHostError::NotFound(id.to_string()))
        }
    }

    async fn set_env(&self, id: &str, kv: &HashMap<String, String>) -> Result<(), SessionHostError> {
        for (key, value) in kv {
            let output = self.run(&["set-environment", "-t", id, key, value]).await?;
            if !output.status.success() {
                return Err(SessionHostError::NotFound(id.to_string()));
            }
        }
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, SessionHostError> {
        let output = self.run(&["list-sessions", "-F", "#{session_name}\t#{session_created}"]).await?;
        if !output.status.success() {
            // No server running means no sessions, not a failure.
            return Ok(Vec::new());
        }
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(text
            .lines()
            .filter_map(|line| {
                let (id, created) = line.split_once('\t')?;
                let created_at_ms = created.trim().parse::<u64>().ok()? * 1000;
                Some(SessionInfo { id: id.to_string(), created_at_ms })
            })
            .collect())
    }

    async fn pane_liveness(&self, id: &str) -> Result<PaneLiveness, SessionHostError> {
        if self.has_session(id).await? {
            Ok(PaneLiveness::Alive)
        } else {
            Ok(PaneLiveness::Dead)
        }
    }

    async fn set_pane_died_hook(&self, _id: &str) -> Result<(), SessionHostError> {
        // tmux has no first-class pane-exit hook wired up here; liveness
        // is instead polled via `pane_liveness`.
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    #[allow(dead_code)]
    struct FakeSession {
        created_at_ms: u64,
        work_dir: String,
        command: String,
        env: HashMap<String, String>,
        sent_keys: Vec<String>,
        liveness: PaneLiveness,
    }

    #[derive(Default)]
    struct State {
        sessions: HashMap<String, FakeSession>,
        next_created_at_ms: u64,
    }

    /// An in-memory [`SessionHost`] for tests. Sessions never really run a
    /// process; `pane_liveness` defaults to `Alive` until explicitly marked
    /// dead via [`FakeSessionHost::kill_pane`].
    #[derive(Clone)]
    pub struct FakeSessionHost {
        state: Arc<Mutex<State>>,
    }

    impl Default for FakeSessionHost {
        fn default() -> Self {
            Self { state: Arc::new(Mutex::new(State { next_created_at_ms: 1, ..Default::default() })) }
        }
    }

    impl FakeSessionHost {
        pub fn new() -> Self {
            Self::default()
        }

        /// Force a session's pane to report dead without killing the
        /// session record, exercising staleness-detection paths.
        pub fn kill_pane(&self, id: &str) {
            if let Some(s) = self.state.lock().sessions.get_mut(id) {
                s.liveness = PaneLiveness::Dead;
            }
        }

        pub fn created_at_ms(&self, id: &str) -> Option<u64> {
            self.state.lock().sessions.get(id).map(|s| s.created_at_ms)
        }

        pub fn sent_keys(&self, id: &str) -> Vec<String> {
            self.state.lock().sessions.get(id).map(|s| s.sent_keys.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl SessionHost for FakeSessionHost {
        async fn create(
            &self,
            session_id: &str,
            work_dir: &str,
            command: &str,
            env: &HashMap<String, String>,
        ) -> Result<(), SessionHostError> {
            let mut state = self.state.lock();
            if state.sessions.contains_key(session_id) {
                return Err(SessionHostError::AlreadyExists(session_id.to_string()));
            }
            let created_at_ms = state.next_created_at_ms;
            state.next_created_at_ms += 1;
            state.sessions.insert(
                session_id.to_string(),
                FakeSession {
                    created_at_ms,
                    work_dir: work_dir.to_string(),
                    command: command.to_string(),
                    env: env.clone(),
                    sent_keys: Vec::new(),
                    liveness: PaneLiveness::Alive,
                },
            );
            Ok(())
        }

        async fn has_session(&self, id: &str) -> Result<bool, SessionHostError> {
            Ok(self.state.lock().sessions.contains_key(id))
        }

        async fn kill(&self, id: &str, _graceful: bool) -> Result<(), SessionHostError> {
            self.state.lock().sessions.remove(id).ok_or_else(|| SessionHostError::NotFound(id.to_string()))?;
            Ok(())
        }

        async fn send_keys(&self, id: &str, keys: &str) -> Result<(), SessionHostError> {
            let mut state = self.state.lock();
            let session = state.sessions.get_mut(id).ok_or_else(|| SessionHostError::NotFound(id.to_string()))?;
            session.sent_keys.push(keys.to_string());
            Ok(())
        }

        async fn set_env(&self, id: &str, kv: &HashMap<String, String>) -> Result<(), SessionHostError> {
            let mut state = self.state.lock();
            let session = state.sessions.get_mut(id).ok_or_else(|| SessionHostError::NotFound(id.to_string()))?;
            session.env.extend(kv.clone());
            Ok(())
        }

        async fn list_sessions(&self) -> Result<Vec<SessionInfo>, SessionHostError> {
            Ok(self
                .state
                .lock()
                .sessions
                .iter()
                .map(|(id, s)| SessionInfo { id: id.clone(), created_at_ms: s.created_at_ms })
                .collect())
        }

        async fn pane_liveness(&self, id: &str) -> Result<PaneLiveness, SessionHostError> {
            self.state
                .lock()
                .sessions
                .get(id)
                .map(|s| s.liveness)
                .ok_or_else(|| SessionHostError::NotFound(id.to_string()))
        }

        async fn set_pane_died_hook(&self, id: &str) -> Result<(), SessionHostError> {
            if self.state.lock().sessions.contains_key(id) {
                Ok(())
            } else {
                Err(SessionHostError::NotFound(id.to_string()))
            }
        }
    }

}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeSessionHost;

#[cfg(test)]
#[path = "session_host_tests.rs"]
mod tests;
