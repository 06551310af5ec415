//! Critique requests sent by the commander.

use anyhow::Result;
use tracing::info;

use crate::agents::Agent;
use crate::agents::session::{Session, ask};
use crate::core::sentinel::review_verdict;
use crate::core::types::{Role, Verdict};
use crate::io::llm::ChatBackend;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Critique {
    pub reply: String,
    pub verdict: Verdict,
}

/// Send `request` to the critics and classify the reply against `sentinel`.
///
/// Empty or unhelpful replies still count as feedback.
pub fn review<B: ChatBackend>(
    session: &mut Session,
    backend: &B,
    critics: &Agent,
    request: &str,
    sentinel: &str,
) -> Result<Critique> {
    let reply = ask(session, backend, Role::Commander, critics, request)?;
    let verdict = review_verdict(&reply, sentinel);
    info!(phase = %session.phase, ?verdict, "critique received");
    Ok(Critique { reply, verdict })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::run_log::RunLog;
    use crate::test_support::{ScriptedBackend, test_agents};

    #[test]
    fn verdict_follows_sentinel() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agents = test_agents();
        let backend = ScriptedBackend::new();
        backend.push(Role::Critics, "The code matches. NO_ISSUES");
        backend.push(Role::Critics, "no_issues");
        backend.push(Role::Critics, "");

        let mut session = Session::new(temp.path(), RunLog::disabled());
        let verdicts: Vec<_> = (0..3)
            .map(|_| {
                review(&mut session, &backend, &agents.critics, "check", "NO_ISSUES")
                    .expect("review")
                    .verdict
            })
            .collect();
        assert_eq!(
            verdicts,
            vec![Verdict::Approved, Verdict::Feedback, Verdict::Feedback]
        );
    }
}
