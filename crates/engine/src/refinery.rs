// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! The merge-processor patrol formula (§4.4): thin by design. The actual
//! claim/rebase/gate pipeline (§4.3) lives in [`crate::merge_processor`];
//! this controller only chains the three deterministic operations and
//! makes the single LLM-judgment call on gate failure (branch regression
//! vs. pre-existing breakage).

use crate::merge_processor::{GateFailureVerdict, MergeError, MergeProcessor, PrepareOutcome};
use async_trait::async_trait;
use std::time::Duration;

/// Diagnoses a gate failure. In production this is an LLM judgment call
/// reading gate output against target-branch history; [`FixedVerdict`]
/// below is a deterministic stand-in for tests.
#[async_trait]
pub trait GateFailureClassifier: Send + Sync {
    async fn classify(&self) -> GateFailureVerdict;
}

/// Always returns the same verdict — exercises both branches of the
/// formula deterministically in tests.
pub struct FixedVerdict(pub GateFailureVerdict);

#[async_trait]
impl GateFailureClassifier for FixedVerdict {
    async fn classify(&self) -> GateFailureVerdict {
        self.0
    }
}

/// What one `prepare` cycle of the formula did, for callers that want to
/// observe progress (tests, the patrol wrapper's backoff decision).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Merged,
    Rejected,
    LoopAgain,
    RetryAfterInfra,
}

/// Runs one cycle of the formula: `prepare`, then dispatch on its exit
/// code. `0=ok -> merge`, `2=gate-fail -> classify, reject`, `1`/`3` loop,
/// `4` retries with backoff.
pub async fn run_merge_cycle(
    processor: &MergeProcessor<'_>,
    classifier: &dyn GateFailureClassifier,
    now_ms: u64,
    backoff_delay: Duration,
) -> Result<CycleOutcome, MergeError> {
    let outcome = processor.prepare(now_ms).await?;

    match outcome {
        PrepareOutcome::Ok => {
            processor.merge().await?;
            Ok(CycleOutcome::Merged)
        }
        PrepareOutcome::GateFail => {
            let verdict = classifier.classify().await;
            processor.reject(verdict, verdict.reason(), now_ms)?;
            Ok(CycleOutcome::Rejected)
        }
        PrepareOutcome::Conflict | PrepareOutcome::Empty => Ok(CycleOutcome::LoopAgain),
        PrepareOutcome::Infra => {
            tokio::time::sleep(backoff_delay).await;
            Ok(CycleOutcome::RetryAfterInfra)
        }
    }
}

#[cfg(test)]
#[path = "refinery_tests.rs"]
mod tests;
