// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! oj-engine: the policy layer. Scoring, gate evaluation, the convoy
//! manager, the universal patrol-loop shape, and the three patrol
//! controllers (orchestrator, lifecycle monitor, merge-processor) that run
//! it against the store/adapters contracts from `oj-storage`/`oj-adapters`.

pub mod convoy_manager;
pub mod gates;
pub mod lifecycle_monitor;
pub mod merge_processor;
pub mod merge_slot;
pub mod orchestrator;
pub mod patrol;
pub mod refinery;
pub mod scoring;

pub use convoy_manager::{normalize_issue_id, ConvoyManager, ConvoyManagerError};
pub use gates::{evaluate_gates, ClosedGate, ExternalGateChecker, GateEvalError};
pub use lifecycle_monitor::{
    survey_verdict, InboxAction, LifecycleError, LifecycleMonitor, SurveyVerdict, DIRECTED_NUDGE_IDLE_MS,
    GENTLE_NUDGE_IDLE_MS,
};
pub use merge_processor::{ConflictTaskInfo, GateFailureVerdict, MergeError, MergeProcessor, PrepareOutcome};
pub use merge_slot::MergeSlot;
pub use orchestrator::{
    dog_pool_action, expired_wisps, file_death_warrant, needs_health_check, send_message, CycleReport,
    DogPoolAction, Orchestrator, OrchestratorError, DOG_IDLE_RETIRE_MS, MAX_TOTAL_DOGS, MIN_IDLE_DOGS, WISP_TTL_MS,
};
pub use patrol::{run_cycle, AwaitSignalBackoff, CyclePhase, PatrolController};
pub use refinery::{run_merge_cycle, CycleOutcome, FixedVerdict, GateFailureClassifier};
pub use scoring::{highest_scoring, score, MrScoreInputs};
