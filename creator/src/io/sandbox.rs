//! Code execution for the commander.
//!
//! The [`Sandbox`] trait decouples the commander from actually running code.
//! [`LocalSandbox`] saves and runs blocks in the run directory; tests use
//! sandboxes that only save files.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::code_blocks::{CodeBlock, Language};
use crate::core::digest::content_hash;
use crate::io::config::SandboxConfig;
use crate::io::process::{ProcessLimits, run_bounded};

/// Result of executing a reply's code blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Exit code of the last block run (non-zero stops execution).
    pub exit_code: i32,
    /// Concatenated output of every block run.
    pub output: String,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// Message the commander sends back to the coder.
    pub fn render(&self) -> String {
        let outcome = if self.succeeded() {
            "execution succeeded"
        } else {
            "execution failed"
        };
        format!(
            "exitcode: {} ({outcome})\nCode output: {}",
            self.exit_code, self.output
        )
    }
}

/// Abstraction over code execution backends.
pub trait Sandbox {
    /// Execute `blocks` in order inside `work_dir`, stopping at the first failure.
    fn execute(&self, work_dir: &Path, blocks: &[CodeBlock]) -> Result<ExecutionReport>;
}

/// Runs blocks with local interpreters (no container isolation).
#[derive(Debug, Clone)]
pub struct LocalSandbox {
    python: String,
    limits: ProcessLimits,
}

impl LocalSandbox {
    pub fn from_config(cfg: &SandboxConfig) -> Self {
        Self {
            python: cfg.python.clone(),
            limits: ProcessLimits {
                timeout: Duration::from_secs(cfg.timeout_secs),
                output_limit_bytes: cfg.output_limit_bytes,
            },
        }
    }

    fn run_block(&self, work_dir: &Path, block: &CodeBlock) -> Result<(i32, String)> {
        let program = match block.language() {
            Language::Python => self.python.as_str(),
            Language::Shell => "sh",
            Language::Unknown(lang) => {
                warn!(lang = %lang, "refusing to run unknown language");
                return Ok((1, format!("unknown language {lang}")));
            }
        };
        let script = match save_block(work_dir, block)? {
            SaveOutcome::Saved(path) => path,
            SaveOutcome::Rejected(reason) => return Ok((1, reason)),
        };

        let mut cmd = Command::new(program);
        cmd.arg(&script).current_dir(work_dir);
        let output = run_bounded(cmd, self.limits)
            .with_context(|| format!("run {program} {}", script.display()))?;
        if !output.succeeded() {
            debug!(
                script = %script.display(),
                exit_code = ?output.exit_code,
                timed_out = output.timed_out,
                "code block failed"
            );
        }
        let code = if output.timed_out {
            124
        } else {
            output.exit_code.unwrap_or(1)
        };
        Ok((code, output.combined_text()))
    }
}

impl Sandbox for LocalSandbox {
    #[instrument(skip_all, fields(work_dir = %work_dir.display(), blocks = blocks.len()))]
    fn execute(&self, work_dir: &Path, blocks: &[CodeBlock]) -> Result<ExecutionReport> {
        let mut output = String::new();
        let mut exit_code = 0;
        for (i, block) in blocks.iter().enumerate() {
            debug!(block = i, lang = %block.lang, "executing code block");
            let (code, text) = self.run_block(work_dir, block)?;
            output.push_str(&text);
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            exit_code = code;
            if code != 0 {
                break;
            }
        }
        info!(exit_code, "code execution finished");
        Ok(ExecutionReport { exit_code, output })
    }
}

/// Where a block ended up on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(PathBuf),
    /// The declared filename points outside the work dir.
    Rejected(String),
}

/// Write a block to its declared filename, or to a content-addressed scratch file.
pub fn save_block(work_dir: &Path, block: &CodeBlock) -> Result<SaveOutcome> {
    let relative = match block.filename() {
        Some(name) if !is_contained(Path::new(name)) => {
            warn!(filename = %name, "rejecting filename outside the work dir");
            return Ok(SaveOutcome::Rejected(format!(
                "filename {name} is outside the working directory"
            )));
        }
        Some(name) => PathBuf::from(name),
        None => PathBuf::from(format!(
            "tmp_code_{}.{}",
            content_hash(&block.code),
            scratch_extension(block)
        )),
    };
    let path = work_dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(&path, &block.code).with_context(|| format!("write {}", path.display()))?;
    debug!(path = %path.display(), "saved code block");
    Ok(SaveOutcome::Saved(path))
}

fn scratch_extension(block: &CodeBlock) -> &'static str {
    match block.language() {
        Language::Shell => "sh",
        _ => "py",
    }
}

fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
