//! LLM-backed agents and the exchanges between them.
//!
//! An [`Agent`] is stateless: a role, a system prompt and an LLM profile. Its
//! chat history is rebuilt from the run's [`ConversationLog`] on every call.

use anyhow::{Context, Result};

use crate::core::conversation::ConversationLog;
use crate::core::types::Role;
use crate::io::config::CreatorConfig;
use crate::io::llm::{ChatBackend, ChatMessage, ChatRequest, message_content};
use crate::io::prompt::PromptEngine;

pub mod commander;
pub mod critics;
pub mod interpreter;
pub mod session;

/// Model settings for one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmProfile {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    /// Expand `<img path>` tags into image parts.
    pub multimodal: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub role: Role,
    pub system_message: String,
    pub profile: LlmProfile,
}

impl Agent {
    /// Chat request for replying to `peer`, built from their shared history.
    pub fn build_request(&self, log: &ConversationLog, peer: Role) -> Result<ChatRequest> {
        let mut messages = Vec::new();
        if !self.system_message.is_empty() {
            messages.push(ChatMessage::system(self.system_message.as_str()));
        }
        for turn in log.between(self.role, peer) {
            if turn.sender == self.role {
                messages.push(ChatMessage::assistant(turn.content.as_str()));
            } else {
                let content = message_content(&turn.content, self.profile.multimodal)
                    .with_context(|| format!("build message {} for {}", turn.index, self.role))?;
                messages.push(ChatMessage::user(content));
            }
        }
        Ok(ChatRequest {
            agent: self.role,
            model: self.profile.model.clone(),
            messages,
            max_tokens: self.profile.max_tokens,
            temperature: self.profile.temperature,
        })
    }

    /// Ask the backend for this agent's next message to `peer`.
    pub fn generate_reply<B: ChatBackend>(
        &self,
        backend: &B,
        log: &ConversationLog,
        peer: Role,
    ) -> Result<String> {
        let request = self.build_request(log, peer)?;
        let reply = backend
            .complete(&request)
            .with_context(|| format!("{} reply to {peer}", self.role))?;
        Ok(reply.content)
    }
}

/// The four agents of a creation run.
#[derive(Debug, Clone)]
pub struct AgentSet {
    pub commander: Agent,
    pub coder: Agent,
    pub critics: Agent,
    pub interpreter: Agent,
}

impl AgentSet {
    /// Text agents use `llm.model`; the critics and interpreter see images.
    pub fn new(cfg: &CreatorConfig, engine: &PromptEngine) -> Result<Self> {
        let text = LlmProfile {
            model: cfg.llm.model.clone(),
            max_tokens: cfg.llm.max_tokens,
            temperature: cfg.llm.temperature,
            multimodal: false,
        };
        let vision = LlmProfile {
            model: cfg.llm.vision_model.clone(),
            multimodal: true,
            ..text.clone()
        };
        let agent = |role: Role, profile: &LlmProfile| -> Result<Agent> {
            Ok(Agent {
                role,
                system_message: engine.system_prompt(role, &cfg.artifact_name, &cfg.sentinel)?,
                profile: profile.clone(),
            })
        };
        Ok(Self {
            commander: agent(Role::Commander, &text)?,
            coder: agent(Role::Coder, &text)?,
            critics: agent(Role::Critics, &vision)?,
            interpreter: agent(Role::Interpreter, &vision)?,
        })
    }
}
