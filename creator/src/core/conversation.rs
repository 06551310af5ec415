//! Orchestrator-owned conversation log.
//!
//! Every message exchanged during a run is appended here, tagged with the
//! phase it belongs to. Agents never keep their own history: the chat
//! history for an agent/peer pair is derived from this log on demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::{Phase, Role};

/// One message from `sender` to `recipient`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Position in the log (0-indexed, strictly increasing).
    pub index: usize,
    pub phase: Phase,
    pub sender: Role,
    pub recipient: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Whether the turn was exchanged between `a` and `b`, in either direction.
    pub fn involves_pair(&self, a: Role, b: Role) -> bool {
        (self.sender == a && self.recipient == b) || (self.sender == b && self.recipient == a)
    }

    pub fn involves(&self, role: Role) -> bool {
        self.sender == role || self.recipient == role
    }
}

/// Append-only list of turns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationLog {
    turns: Vec<Turn>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn and return it.
    pub fn append(
        &mut self,
        phase: Phase,
        sender: Role,
        recipient: Role,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> &Turn {
        let index = self.turns.len();
        self.turns.push(Turn {
            index,
            phase,
            sender,
            recipient,
            content: content.into(),
            timestamp,
        });
        &self.turns[index]
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Turns between two roles, in insertion order.
    pub fn between(&self, a: Role, b: Role) -> impl DoubleEndedIterator<Item = &Turn> + '_ {
        self.turns.iter().filter(move |t| t.involves_pair(a, b))
    }

    /// Turns of `phase` that `role` sent or received.
    pub fn in_phase(&self, phase: Phase, role: Role) -> impl Iterator<Item = &Turn> + '_ {
        self.turns
            .iter()
            .filter(move |t| t.phase == phase && t.involves(role))
    }

    /// Most recent message from `sender` to `recipient`.
    pub fn last_message(&self, sender: Role, recipient: Role) -> Option<&Turn> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.sender == sender && t.recipient == recipient)
    }
}
