//! Run-scoped state shared by every exchange.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Utc;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::agents::Agent;
use crate::core::conversation::ConversationLog;
use crate::core::types::{Phase, Role, SpanKind};
use crate::io::llm::ChatBackend;
use crate::io::run_log::RunLog;
use crate::io::trace::{SpanId, Tracer, field};

/// Conversation log, run log and trace for one run.
///
/// `phase` tags every posted turn; `parent_span` is the span new exchange
/// spans attach to.
pub struct Session {
    pub conversation: ConversationLog,
    pub run_log: RunLog,
    pub tracer: Tracer,
    pub phase: Phase,
    pub parent_span: Option<SpanId>,
    work_dir: PathBuf,
}

impl Session {
    pub fn new(work_dir: &Path, run_log: RunLog) -> Self {
        Self {
            conversation: ConversationLog::new(),
            run_log,
            tracer: Tracer::new(),
            phase: Phase::Bootstrap,
            parent_span: None,
            work_dir: work_dir.to_path_buf(),
        }
    }

    /// Directory code is saved and executed in.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Append a turn to the conversation and the run log.
    pub fn post(&mut self, sender: Role, recipient: Role, content: impl Into<String>) {
        let turn = self
            .conversation
            .append(self.phase, sender, recipient, content, Utc::now());
        debug!(index = turn.index, phase = %turn.phase, %sender, %recipient, "turn posted");
        self.run_log.record(turn);
    }

    /// Start a child span of the current parent.
    pub fn start_span(&mut self, name: &str, kind: SpanKind) -> SpanId {
        self.tracer.start(name, kind, self.parent_span)
    }

    /// Close a span with the message it received and the reply it produced.
    pub fn finish_exchange(&mut self, span: SpanId, received: &str, reply: &str) {
        self.tracer.finish(
            span,
            field("receive_message", received),
            field("reply_message", reply),
        );
    }
}

/// Have `agent` answer `peer`'s latest message and post the reply.
pub fn respond<B: ChatBackend>(
    session: &mut Session,
    backend: &B,
    agent: &Agent,
    peer: Role,
) -> Result<String> {
    let span = session.start_span(agent.role.display_name(), SpanKind::Agent);
    session
        .tracer
        .set_metadata(span, "system_prompt", agent.system_message.as_str());
    session.tracer.set_metadata(span, "llm_config", llm_metadata(agent));

    let received = session
        .conversation
        .last_message(peer, agent.role)
        .map(|t| t.content.clone())
        .unwrap_or_default();
    let reply = match agent.generate_reply(backend, &session.conversation, peer) {
        Ok(reply) => reply,
        Err(err) => {
            session
                .tracer
                .finish(span, field("receive_message", received), Map::new());
            return Err(err);
        }
    };
    session.finish_exchange(span, &received, &reply);
    session.post(agent.role, peer, reply.as_str());
    Ok(reply)
}

/// Send `message` from `sender` to `agent` and wait for its reply.
pub fn ask<B: ChatBackend>(
    session: &mut Session,
    backend: &B,
    sender: Role,
    agent: &Agent,
    message: &str,
) -> Result<String> {
    session.post(sender, agent.role, message);
    respond(session, backend, agent, sender)
}

fn llm_metadata(agent: &Agent) -> Value {
    json!({
        "model": agent.profile.model,
        "max_tokens": agent.profile.max_tokens,
        "temperature": agent.profile.temperature,
        "multimodal": agent.profile.multimodal,
    })
}
