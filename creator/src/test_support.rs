//! Test-only doubles for the chat backend, sandbox and operator.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::agents::AgentSet;
use crate::core::code_blocks::CodeBlock;
use crate::core::types::Role;
use crate::io::config::{CreatorConfig, PromptOverrides};
use crate::io::data::SCRIPT_FILE;
use crate::io::human::HumanInput;
use crate::io::llm::{ChatBackend, ChatReply, ChatRequest};
use crate::io::prompt::PromptEngine;
use crate::io::sandbox::{ExecutionReport, Sandbox, SaveOutcome, save_block};

/// Backend returning queued replies per agent role.
///
/// Every request is recorded; an empty queue is an error.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: RefCell<HashMap<Role, VecDeque<String>>>,
    requests: RefCell<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, role: Role, reply: impl Into<String>) {
        self.replies
            .borrow_mut()
            .entry(role)
            .or_default()
            .push_back(reply.into());
    }

    /// Requests made on behalf of `role`.
    pub fn calls(&self, role: Role) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|r| r.agent == role)
            .count()
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.borrow().clone()
    }

    /// Replies still queued across all roles.
    pub fn pending(&self) -> usize {
        self.replies.borrow().values().map(VecDeque::len).sum()
    }
}

impl ChatBackend for ScriptedBackend {
    fn complete(&self, request: &ChatRequest) -> Result<ChatReply> {
        self.requests.borrow_mut().push(request.clone());
        let content = self
            .replies
            .borrow_mut()
            .get_mut(&request.agent)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| anyhow!("no scripted reply for {}", request.agent))?;
        Ok(ChatReply {
            content,
            model: request.model.clone(),
            usage: None,
        })
    }
}

/// Sandbox that saves code blocks without running them.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileOnlySandbox;

impl Sandbox for FileOnlySandbox {
    fn execute(&self, work_dir: &Path, blocks: &[CodeBlock]) -> Result<ExecutionReport> {
        for block in blocks {
            if let SaveOutcome::Rejected(reason) = save_block(work_dir, block)? {
                return Ok(ExecutionReport {
                    exit_code: 1,
                    output: reason,
                });
            }
        }
        Ok(ExecutionReport {
            exit_code: 0,
            output: String::new(),
        })
    }
}

/// Operator answering from a fixed list.
#[derive(Debug, Default)]
pub struct ScriptedHuman {
    answers: RefCell<VecDeque<String>>,
    asked: Cell<usize>,
}

impl ScriptedHuman {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: RefCell::new(answers.into_iter().map(Into::into).collect()),
            asked: Cell::new(0),
        }
    }

    pub fn remaining(&self) -> usize {
        self.answers.borrow().len()
    }

    pub fn asked(&self) -> usize {
        self.asked.get()
    }
}

impl HumanInput for ScriptedHuman {
    fn ask(&self, _prompt: &str) -> Result<String> {
        self.asked.set(self.asked.get() + 1);
        Ok(self.answers.borrow_mut().pop_front().unwrap_or_default())
    }
}

/// Agents built from the default config and built-in prompts.
pub fn test_agents() -> AgentSet {
    let cfg = CreatorConfig::default();
    AgentSet::new(&cfg, &PromptEngine::new(&PromptOverrides::default()))
        .expect("default agents should build")
}

/// A coder reply with one python block saved as `filename`.
pub fn coder_writes(filename: &str, code: &str) -> String {
    format!("Here is the model.\n```python\n# filename: {filename}\n{code}\n```")
}

/// Queue a full coder exchange: write `model.py`, then terminate.
pub fn script_coder(backend: &ScriptedBackend, code: &str) {
    backend.push(Role::Coder, coder_writes("model.py", code));
    backend.push(Role::Coder, "The code is saved in `model.py`. TERMINATE");
}

/// Data and output directories for an end-to-end run.
pub struct TestPaper {
    _temp: TempDir,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl TestPaper {
    /// Create `<tmp>/<name>/script.txt` with `script` and a placeholder image.
    pub fn new(name: &str, script: &str) -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let data_dir = temp.path().join(name);
        fs::create_dir_all(&data_dir)?;
        fs::write(data_dir.join(SCRIPT_FILE), script)?;
        fs::write(data_dir.join("figure.png"), b"\x89PNG\r\n\x1a\n")?;
        let output_dir = temp.path().join("output");
        Ok(Self {
            _temp: temp,
            data_dir,
            output_dir,
        })
    }
}
