// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Odd Jobs Project

//! Scheduler-metadata block: a delimiter-fenced key:value structure embedded
//! in a bead's `description`, carrying dispatch instructions (target rig,
//! formula, args, convoy membership, ...).
//!
//! Keys are forward-compatible: unknown keys round-trip untouched. A second
//! occurrence of the delimiter on the same bead terminates parsing, which
//! — combined with escaping embedded newlines — is what keeps an
//! attacker-controlled field value from being reinterpreted as a second
//! metadata block.

use std::fmt;

pub const DELIMITER: &str = "---gt:scheduler:v1---";
pub const LEGACY_DELIMITER: &str = "---gt:queue:v1---";

/// `merge:` field: whether a worker merges directly or files a merge
/// request bead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    Direct,
    Mr,
}

crate::simple_display! {
    MergeMode {
        Direct => "direct",
        Mr => "mr",
    }
}

impl MergeMode {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(MergeMode::Direct),
            "mr" => Some(MergeMode::Mr),
            _ => None,
        }
    }
}

/// A parsed scheduler-metadata block, plus the free-form preamble that
/// preceded it in the bead description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerMetadata {
    pub preamble: String,
    pub target_rig: Option<String>,
    pub formula: Option<String>,
    pub args: Option<String>,
    pub vars: Vec<(String, String)>,
    pub enqueued_at: Option<String>,
    pub merge: Option<String>,
    pub convoy: Option<String>,
    pub base_branch: Option<String>,
    pub no_merge: Option<bool>,
    pub account: Option<String>,
    pub agent: Option<String>,
    pub hook_raw_bead: Option<bool>,
    pub owned: Option<bool>,
    pub mode: Option<String>,
    pub dispatch_failures: Option<u32>,
    pub last_failure: Option<String>,
    /// Keys not recognized by this implementation, preserved verbatim in
    /// their original order for forward-compatible round-tripping.
    pub unknown: Vec<(String, String)>,
    /// Set when the block that was parsed used the legacy delimiter. Never
    /// set when formatting — the legacy delimiter is read-accepted, never
    /// written.
    pub was_legacy: bool,
}

impl SchedulerMetadata {
    pub fn merge_mode(&self) -> Option<MergeMode> {
        self.merge.as_deref().and_then(MergeMode::parse)
    }

    /// Parse a bead description. Returns `None` if neither delimiter is
    /// present as its own line.
    pub fn parse(description: &str) -> Option<Self> {
        let lines: Vec<&str> = description.lines().collect();
        let delim_idx = lines.iter().position(|l| *l == DELIMITER || *l == LEGACY_DELIMITER)?;
        let was_legacy = lines[delim_idx] == LEGACY_DELIMITER;

        let preamble = lines[..delim_idx].join("\n");
        let mut meta = SchedulerMetadata { preamble, was_legacy, ..Default::default() };

        for line in &lines[delim_idx + 1..] {
            // A second delimiter terminates parsing entirely — this is the
            // injection guard: nothing after it is interpreted.
            if *line == DELIMITER || *line == LEGACY_DELIMITER {
                break;
            }
            let Some((key, raw_value)) = line.split_once(": ") else { continue };
            let value = unescape(raw_value);
            match key {
                "target_rig" => meta.target_rig = Some(value),
                "formula" => meta.formula = Some(value),
                "args" => meta.args = Some(value),
                "var" => {
                    if let Some((k, v)) = value.split_once('=') {
                        meta.vars.push((k.to_string(), v.to_string()));
                    }
                }
                "enqueued_at" => meta.enqueued_at = Some(value),
                "merge" => meta.merge = Some(value),
                "convoy" => meta.convoy = Some(value),
                "base_branch" => meta.base_branch = Some(value),
                "no_merge" => meta.no_merge = parse_bool(&value),
                "account" => meta.account = Some(value),
                "agent" => meta.agent = Some(value),
                "hook_raw_bead" => meta.hook_raw_bead = parse_bool(&value),
                "owned" => meta.owned = parse_bool(&value),
                "mode" => meta.mode = Some(value),
                "dispatch_failures" => meta.dispatch_failures = value.parse().ok(),
                "last_failure" => meta.last_failure = Some(value),
                _ => meta.unknown.push((key.to_string(), value)),
            }
        }

        Some(meta)
    }

    /// Render back into a bead description. Always writes the current
    /// delimiter, never the legacy one, regardless of which was parsed.
    pub fn format(&self) -> String {
        let mut out = String::new();
        if !self.preamble.is_empty() {
            out.push_str(&self.preamble);
            out.push('\n');
        }
        out.push_str(DELIMITER);
        out.push('\n');

        let mut push = |key: &str, value: &str| {
            out.push_str(key);
            out.push_str(": ");
            out.push_str(&escape(value));
            out.push('\n');
        };

        if let Some(v) = &self.target_rig {
            push("target_rig", v);
        }
        if let Some(v) = &self.formula {
            push("formula", v);
        }
        if let Some(v) = &self.args {
            push("args", v);
        }
        for (k, v) in &self.vars {
            push("var", &format!("{k}={v}"));
        }
        if let Some(v) = &self.enqueued_at {
            push("enqueued_at", v);
        }
        if let Some(v) = &self.merge {
            push("merge", v);
        }
        if let Some(v) = &self.convoy {
            push("convoy", v);
        }
        if let Some(v) = &self.base_branch {
            push("base_branch", v);
        }
        if let Some(v) = self.no_merge {
            push("no_merge", if v { "true" } else { "false" });
        }
        if let Some(v) = &self.account {
            push("account", v);
        }
        if let Some(v) = &self.agent {
            push("agent", v);
        }
        if let Some(v) = self.hook_raw_bead {
            push("hook_raw_bead", if v { "true" } else { "false" });
        }
        if let Some(v) = self.owned {
            push("owned", if v { "true" } else { "false" });
        }
        if let Some(v) = &self.mode {
            push("mode", v);
        }
        if let Some(v) = self.dispatch_failures {
            push("dispatch_failures", &v.to_string());
        }
        if let Some(v) = &self.last_failure {
            push("last_failure", v);
        }
        for (k, v) in &self.unknown {
            push(k, v);
        }

        // Trailing newline from the loop above already separates lines;
        // strip the final one so callers control description trailing ws.
        if out.ends_with('\n') {
            out.pop();
        }
        out
    }
}

impl fmt::Display for SchedulerMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Escape backslashes and newlines so a value can never introduce a new
/// line (and therefore never masquerade as a delimiter line).
fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\n', "\\n")
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some('n') => {
                    out.push('\n');
                    chars.next();
                }
                Some('\\') => {
                    out.push('\\');
                    chars.next();
                }
                _ => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
#[path = "scheduler_metadata_tests.rs"]
mod tests;
