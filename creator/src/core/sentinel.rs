//! Approval detection for critique replies.
//!
//! Approval is a case-sensitive, unanchored substring match on a fixed
//! marker. A critique that merely quotes the marker counts as approval.

use crate::core::types::Verdict;

/// Marker the critics prompt asks for when the code needs no changes.
pub const DEFAULT_SENTINEL: &str = "NO_ISSUES";

/// Classify a critique reply.
pub fn review_verdict(reply: &str, sentinel: &str) -> Verdict {
    if reply.contains(sentinel) {
        Verdict::Approved
    } else {
        Verdict::Feedback
    }
}
