//! Shared deterministic types for the creator core.
//!
//! These types define stable contracts between the orchestration loop, the
//! agents and the run records. They must not depend on external state or I/O.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Participant in a creation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The operator that starts the run (and answers in human input mode).
    User,
    /// Condenses the paper description before generation.
    Interpreter,
    /// Relays requests to the coder and executes the code it produces.
    Commander,
    /// Writes the model source.
    Coder,
    /// Reviews the model source against the description.
    Critics,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Interpreter => "interpreter",
            Role::Commander => "commander",
            Role::Coder => "coder",
            Role::Critics => "critics",
        }
    }

    /// Display name used in run logs and trace spans.
    pub fn display_name(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Interpreter => "Interpreter",
            Role::Commander => "Commander",
            Role::Coder => "Coder",
            Role::Critics => "Critics",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Stage of the run a conversation turn belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Optional interpretation pre-pass.
    Interpret,
    /// First generation of the artifact.
    Bootstrap,
    /// Critique/revise round (1-indexed).
    Round(u32),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Interpret => f.write_str("interpret"),
            Phase::Bootstrap => f.write_str("bootstrap"),
            Phase::Round(round) => write!(f, "round {round}"),
        }
    }
}

/// Reviewer decision extracted from a critique reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// The reply carried the approval sentinel.
    Approved,
    /// Anything else; the reply text is forwarded to the coder.
    Feedback,
}

/// Reason why the critique/revise loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum LoopStop {
    /// Critics approved the artifact on `round`.
    Approved { round: u32 },
    /// `max_iter` rounds ran without approval (`rounds` may be zero).
    Exhausted { rounds: u32 },
}

impl LoopStop {
    pub fn approved(&self) -> bool {
        matches!(self, LoopStop::Approved { .. })
    }
}

/// Coarse outcome attached to a trace span when the reply reports an exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpanStatus {
    Success,
    Error,
}

/// Category of a trace span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    Agent,
    Chain,
    Tool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_serializes_round_index() {
        let json = serde_json::to_string(&Phase::Round(2)).expect("serialize");
        assert_eq!(json, r#"{"round":2}"#);
        let json = serde_json::to_string(&Phase::Bootstrap).expect("serialize");
        assert_eq!(json, r#""bootstrap""#);
    }

    #[test]
    fn loop_stop_is_tagged_by_reason() {
        let json = serde_json::to_string(&LoopStop::Approved { round: 3 }).expect("serialize");
        assert_eq!(json, r#"{"reason":"approved","round":3}"#);
        assert!(!LoopStop::Exhausted { rounds: 0 }.approved());
    }

    #[test]
    fn span_status_uses_upper_case() {
        let json = serde_json::to_string(&SpanStatus::Success).expect("serialize");
        assert_eq!(json, r#""SUCCESS""#);
    }
}
