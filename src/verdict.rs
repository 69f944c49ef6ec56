use std::collections::HashMap;

use serde::Serialize;

use crate::predicate::{Capture, Predicate};

/// Captured text is quoted up to this many characters in reasons.
pub const EXCERPT_LIMIT: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    /// The server's behaviour could not be classified either way.
    Indeterminate,
}

impl Outcome {
    /// Console tag.
    pub fn label(self) -> &'static str {
        match self {
            Outcome::Pass => "PASS",
            Outcome::Fail => "FAIL",
            Outcome::Indeterminate => "WARN",
        }
    }
}

/// Terminal result of one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub outcome: Outcome,
    pub reason: String,
}

impl Verdict {
    pub fn pass(reason: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Pass,
            reason: reason.into(),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Fail,
            reason: reason.into(),
        }
    }

    pub fn indeterminate(reason: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Indeterminate,
            reason: reason.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        self.outcome == Outcome::Pass
    }
}

/// How a mismatch counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Mismatch fails the scenario.
    Required,
    /// Mismatch only makes it indeterminate. For behaviour the protocol
    /// leaves open.
    Advisory,
}

/// A predicate bound to the actor whose capture it inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectation {
    pub actor: String,
    pub predicate: Predicate,
    pub severity: Severity,
}

impl Expectation {
    pub fn required(actor: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            actor: actor.into(),
            predicate,
            severity: Severity::Required,
        }
    }

    pub fn advisory(actor: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            actor: actor.into(),
            predicate,
            severity: Severity::Advisory,
        }
    }
}

/// Quote the head of a capture for a reason string.
pub fn excerpt(text: &str) -> String {
    let head: String = text.chars().take(EXCERPT_LIMIT).collect();
    format!("{head:?}")
}

/// Combine all expectations into one verdict.
///
/// Any required mismatch fails. Otherwise advisory mismatches, or an
/// expectation naming an actor that captured nothing, are indeterminate.
pub fn judge(expectations: &[Expectation], captures: &HashMap<String, Capture>) -> Verdict {
    if expectations.is_empty() {
        return Verdict::pass("script completed");
    }

    let mut failures = Vec::new();
    let mut doubts = Vec::new();
    let mut met = Vec::new();

    for expectation in expectations {
        let Some(capture) = captures.get(&expectation.actor) else {
            doubts.push(format!("{}: no capture (actor never ran)", expectation.actor));
            continue;
        };
        if expectation.predicate.holds(capture) {
            met.push(format!("{}: {}", expectation.actor, expectation.predicate));
            continue;
        }
        let reason = format!(
            "{}: expected {}, got {}{}",
            expectation.actor,
            expectation.predicate,
            excerpt(&capture.text),
            if capture.disconnected { " (disconnected)" } else { "" },
        );
        match expectation.severity {
            Severity::Required => failures.push(reason),
            Severity::Advisory => doubts.push(reason),
        }
    }

    if !failures.is_empty() {
        Verdict::fail(failures.join("; "))
    } else if !doubts.is_empty() {
        Verdict::indeterminate(doubts.join("; "))
    } else {
        Verdict::pass(met.join("; "))
    }
}
