//! Commander/coder exchange: relay a request, execute the code that comes back.

use anyhow::Result;
use tracing::{debug, info, instrument};

use crate::agents::Agent;
use crate::agents::session::{Session, respond};
use crate::core::code_blocks::{CodeBlock, extract_code_blocks};
use crate::core::termination::is_termination_msg;
use crate::core::types::{Role, SpanKind};
use crate::io::config::CommanderConfig;
use crate::io::llm::ChatBackend;
use crate::io::sandbox::Sandbox;

/// What happened during one [`CodingExchange::delegate`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeSummary {
    pub coder_replies: u32,
    pub auto_replies: u32,
    pub executions: u32,
    /// The exchange ended on a `TERMINATE` message rather than the reply cap.
    pub terminated: bool,
}

pub struct CodingExchange<'a, S: Sandbox> {
    commander: &'a Agent,
    coder: &'a Agent,
    sandbox: &'a S,
    settings: CommanderConfig,
}

impl<'a, S: Sandbox> CodingExchange<'a, S> {
    pub fn new(commander: &'a Agent, coder: &'a Agent, sandbox: &'a S, settings: CommanderConfig) -> Self {
        Self {
            commander,
            coder,
            sandbox,
            settings,
        }
    }

    /// Send `message` to the coder and keep the exchange going until the coder
    /// terminates or the commander runs out of auto-replies.
    #[instrument(skip_all, fields(phase = %session.phase))]
    pub fn delegate<B: ChatBackend>(
        &self,
        session: &mut Session,
        backend: &B,
        message: &str,
    ) -> Result<ExchangeSummary> {
        let mut summary = ExchangeSummary::default();
        session.post(Role::Commander, Role::Coder, message);

        loop {
            let reply = respond(session, backend, self.coder, Role::Commander)?;
            summary.coder_replies += 1;
            if is_termination_msg(&reply) {
                summary.terminated = true;
                break;
            }
            if summary.auto_replies >= self.settings.max_consecutive_auto_reply {
                debug!(limit = summary.auto_replies, "commander auto-reply limit reached");
                break;
            }
            summary.auto_replies += 1;

            let answer = match self.pending_code(session) {
                Some((received, blocks)) => {
                    summary.executions += 1;
                    self.execute(session, &received, &blocks)?
                }
                None => respond(session, backend, self.commander, Role::Coder)?,
            };
            if is_termination_msg(&answer) {
                summary.terminated = true;
                break;
            }
        }

        info!(
            coder_replies = summary.coder_replies,
            executions = summary.executions,
            terminated = summary.terminated,
            "coding exchange finished"
        );
        Ok(summary)
    }

    /// Code blocks of the newest of the last `last_n_messages` coder messages
    /// in the current phase that has any.
    fn pending_code(&self, session: &Session) -> Option<(String, Vec<CodeBlock>)> {
        let coder_messages: Vec<_> = session
            .conversation
            .in_phase(session.phase, Role::Coder)
            .filter(|t| t.sender == Role::Coder && t.recipient == Role::Commander)
            .collect();
        coder_messages
            .iter()
            .rev()
            .take(self.settings.last_n_messages)
            .find_map(|turn| {
                let blocks = extract_code_blocks(&turn.content);
                (!blocks.is_empty()).then(|| (turn.content.clone(), blocks))
            })
    }

    fn execute(&self, session: &mut Session, received: &str, blocks: &[CodeBlock]) -> Result<String> {
        let span = session.start_span(Role::Commander.display_name(), SpanKind::Tool);
        let report = self.sandbox.execute(session.work_dir(), blocks)?;
        let answer = report.render();
        session.finish_exchange(span, received, &answer);
        session.post(Role::Commander, Role::Coder, answer.as_str());
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::core::types::Phase;
    use crate::io::run_log::RunLog;
    use crate::test_support::{FileOnlySandbox, ScriptedBackend, coder_writes, test_agents};

    fn settings(max_auto: u32) -> CommanderConfig {
        CommanderConfig {
            max_consecutive_auto_reply: max_auto,
            last_n_messages: 3,
        }
    }

    #[test]
    fn executes_code_then_stops_on_terminate() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agents = test_agents();
        let backend = ScriptedBackend::new();
        backend.push(Role::Coder, coder_writes("model.py", "import torch"));
        backend.push(Role::Coder, "Saved to model.py. TERMINATE");

        let mut session = Session::new(temp.path(), RunLog::disabled());
        let exchange =
            CodingExchange::new(&agents.commander, &agents.coder, &FileOnlySandbox, settings(5));
        let summary = exchange
            .delegate(&mut session, &backend, "build a cnn")
            .expect("delegate");

        assert_eq!(
            summary,
            ExchangeSummary {
                coder_replies: 2,
                auto_replies: 1,
                executions: 1,
                terminated: true,
            }
        );
        assert_eq!(
            fs::read_to_string(temp.path().join("model.py")).expect("read"),
            "# filename: model.py\nimport torch"
        );
        let execution = &session.conversation.turns()[2];
        assert_eq!(execution.sender, Role::Commander);
        assert!(execution.content.starts_with("exitcode: 0 (execution succeeded)"));
        assert_eq!(backend.calls(Role::Commander), 0);
    }

    #[test]
    fn commander_answers_with_llm_when_no_code() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agents = test_agents();
        let backend = ScriptedBackend::new();
        backend.push(Role::Coder, "What framework should I use?");
        backend.push(Role::Commander, "PyTorch.");
        backend.push(Role::Coder, "Understood. TERMINATE");

        let mut session = Session::new(temp.path(), RunLog::disabled());
        let exchange =
            CodingExchange::new(&agents.commander, &agents.coder, &FileOnlySandbox, settings(5));
        let summary = exchange
            .delegate(&mut session, &backend, "build a cnn")
            .expect("delegate");

        assert_eq!(summary.executions, 0);
        assert_eq!(backend.calls(Role::Commander), 1);
        assert!(summary.terminated);
    }

    #[test]
    fn auto_reply_cap_ends_exchange() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agents = test_agents();
        let backend = ScriptedBackend::new();
        for _ in 0..3 {
            backend.push(Role::Coder, coder_writes("model.py", "x = 1"));
        }

        let mut session = Session::new(temp.path(), RunLog::disabled());
        let exchange =
            CodingExchange::new(&agents.commander, &agents.coder, &FileOnlySandbox, settings(2));
        let summary = exchange
            .delegate(&mut session, &backend, "build")
            .expect("delegate");

        assert_eq!(summary.coder_replies, 3);
        assert_eq!(summary.auto_replies, 2);
        assert!(!summary.terminated);
    }

    #[test]
    fn code_from_earlier_phases_is_not_rerun() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agents = test_agents();
        let backend = ScriptedBackend::new();
        backend.push(Role::Coder, coder_writes("model.py", "v1"));
        backend.push(Role::Coder, "TERMINATE");
        backend.push(Role::Coder, "Nothing to change.");
        backend.push(Role::Commander, "Nothing to run. TERMINATE");

        let mut session = Session::new(temp.path(), RunLog::disabled());
        let exchange =
            CodingExchange::new(&agents.commander, &agents.coder, &FileOnlySandbox, settings(5));
        exchange
            .delegate(&mut session, &backend, "build")
            .expect("bootstrap");

        session.phase = Phase::Round(1);
        let summary = exchange
            .delegate(&mut session, &backend, "improve")
            .expect("round");
        assert_eq!(summary.executions, 0);
        assert!(summary.terminated);
    }
}
