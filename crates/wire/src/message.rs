// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! The in-band protocol mailbox codec (§6.5). Messages are routed through a
//! mailbox bead, one per agent id, and encoded as a human-readable
//! `Key: Value` body with one tag per line.

use std::collections::BTreeMap;
use std::fmt;

/// Subjects a protocol message may carry, each with its own required-field
/// table (§6.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Subject {
    WorkerDone,
    MergeReady,
    Merged,
    MergeFailed,
    ReworkRequest,
    HealthCheck,
}

impl Subject {
    pub fn as_wire_token(self) -> &'static str {
        match self {
            Subject::WorkerDone => "WORKER_DONE",
            Subject::MergeReady => "MERGE_READY",
            Subject::Merged => "MERGED",
            Subject::MergeFailed => "MERGE_FAILED",
            Subject::ReworkRequest => "REWORK_REQUEST",
            Subject::HealthCheck => "HEALTH_CHECK",
        }
    }

    pub fn from_wire_token(token: &str) -> Option<Self> {
        Some(match token {
            "WORKER_DONE" => Subject::WorkerDone,
            "MERGE_READY" => Subject::MergeReady,
            "MERGED" => Subject::Merged,
            "MERGE_FAILED" => Subject::MergeFailed,
            "REWORK_REQUEST" => Subject::ReworkRequest,
            "HEALTH_CHECK" => Subject::HealthCheck,
            _ => return None,
        })
    }

    /// Required payload field names for this subject, per the §6.5 table.
    /// `To`/`From`/`Subject` are routing fields, required for every subject,
    /// and are not repeated here.
    fn required_fields(self) -> &'static [&'static str] {
        match self {
            Subject::WorkerDone => &["worker", "branch", "issue", "cleanup_status"],
            Subject::MergeReady => &["mr", "worker", "issue"],
            Subject::Merged => &["mr", "branch", "merge_commit", "target_branch", "worker"],
            Subject::MergeFailed => &["mr", "failure_type", "error"],
            Subject::ReworkRequest => &["mr", "branch", "conflict_files"],
            Subject::HealthCheck => &["target"],
        }
    }
}

/// A parse failure against the required-field table. Non-fatal: the caller
/// is expected to log this and bump the recipient's parse-failure counter,
/// not stall the pipeline (§6.5 Validation).
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("message body has no recognizable `Key: Value` lines")]
    Empty,

    #[error("unknown subject {0:?}")]
    UnknownSubject(String),

    #[error("missing required routing field {0:?}")]
    MissingRouting(&'static str),

    #[error("missing required field {0:?} for subject {1:?}")]
    MissingField(&'static str, String),
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolMessage {
    pub to: String,
    pub from: String,
    pub subject: Subject,
    /// Payload fields beyond the three routing fields, in the order they
    /// appeared on the wire. Field names are lowercased on parse; unknown
    /// fields are preserved.
    pub fields: BTreeMap<String, String>,
}

impl ProtocolMessage {
    pub fn new(to: impl Into<String>, from: impl Into<String>, subject: Subject) -> Self {
        Self { to: to.into(), from: from.into(), subject, fields: BTreeMap::new() }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Encode as the `Key: Value` body stored in the mailbox bead.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("To: {}\n", self.to));
        out.push_str(&format!("From: {}\n", self.from));
        out.push_str(&format!("Subject: {}\n", self.subject.as_wire_token()));
        for (k, v) in &self.fields {
            out.push_str(&format!("{k}: {v}\n"));
        }
        out
    }

    /// Parse a `Key: Value` body, validating required fields for the
    /// decoded subject. A missing required field is a hard parse error
    /// (§6.5 Validation) — the caller logs it and bumps a counter rather
    /// than propagating a crash.
    pub fn parse(body: &str) -> Result<Self, ParseError> {
        let mut raw: BTreeMap<String, String> = BTreeMap::new();
        for line in body.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else { continue };
            raw.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
        if raw.is_empty() {
            return Err(ParseError::Empty);
        }

        let to = raw.remove("to").ok_or(ParseError::MissingRouting("to"))?;
        let from = raw.remove("from").ok_or(ParseError::MissingRouting("from"))?;
        let subject_token = raw.remove("subject").ok_or(ParseError::MissingRouting("subject"))?;
        let subject = Subject::from_wire_token(&subject_token)
            .ok_or_else(|| ParseError::UnknownSubject(subject_token.clone()))?;

        for required in subject.required_fields() {
            if !raw.contains_key(*required) {
                return Err(ParseError::MissingField(required, subject_token.clone()));
            }
        }

        Ok(Self { to, from, subject, fields: raw })
    }
}

impl fmt::Display for ProtocolMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
