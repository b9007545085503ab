// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! Merge-request scoring (§4.3): a starvation-free priority function the
//! merge processor uses to pick the next MR to claim.

use oj_core::Priority;

/// Inputs to the scoring formula, already converted to hours so the
/// formula itself stays a pure function of plain numbers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MrScoreInputs {
    pub priority: Priority,
    pub retry_count: u32,
    pub hours_since_convoy_created: f64,
    pub hours_since_mr_created: f64,
}

/// `score = 1000 + 10*hours_since(convoy_created_at) + 100*(4-priority) -
/// min(50*retry_count, 300) + 1*hours_since(mr_created_at)` (§4.3).
pub fn score(inputs: MrScoreInputs) -> f64 {
    let anti_starvation = 10.0 * inputs.hours_since_convoy_created;
    let priority_bonus = 100.0 * (4 - inputs.priority.get() as i64) as f64;
    let thrash_penalty = (50.0 * inputs.retry_count as f64).min(300.0);
    let fifo_tiebreaker = inputs.hours_since_mr_created;

    1000.0 + anti_starvation + priority_bonus - thrash_penalty + fifo_tiebreaker
}

/// Pick the highest-scoring entry, preferring the first in iteration order
/// on an exact tie (stable FIFO behavior when all other inputs match).
pub fn highest_scoring<T>(candidates: impl IntoIterator<Item = (T, MrScoreInputs)>) -> Option<T> {
    candidates
        .into_iter()
        .map(|(item, inputs)| (item, score(inputs)))
        .fold(None, |best: Option<(T, f64)>, (item, s)| match best {
            Some((_, best_score)) if best_score >= s => best,
            _ => Some((item, s)),
        })
        .map(|(item, _)| item)
}

#[cfg(test)]
#[path = "scoring_tests.rs"]
mod tests;
