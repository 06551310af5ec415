//! Creator configuration (TOML).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::sentinel::DEFAULT_SENTINEL;

/// Top-level run configuration.
///
/// This file is intended to be edited by humans. Missing fields default to
/// the values used by the reference experiments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CreatorConfig {
    /// Upper bound on critique/revise rounds after the first generation.
    pub max_iter: u32,

    /// Run the interpreter pre-pass on the raw description.
    pub use_interpreter: bool,

    /// Let a human answer the interpreter instead of ending after one reply.
    pub human_input_mode: bool,

    /// Marker in a critique reply that means "approved".
    pub sentinel: String,

    /// Filename of the generated artifact inside the run directory.
    pub artifact_name: String,

    pub prompts: PromptOverrides,
    pub llm: LlmConfig,
    pub commander: CommanderConfig,
    pub sandbox: SandboxConfig,
}

/// Replacement instruction templates. Empty strings keep the built-ins.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromptOverrides {
    pub commander: String,
    pub coder: String,
    pub critics: String,
    pub interpreter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible API root.
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Text model used by the commander and coder.
    pub model: String,
    /// Multimodal model used by the critics and interpreter.
    pub vision_model: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Seed of the on-disk response cache. `None` disables caching.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_seed: Option<u64>,
    pub cache_dir: String,
    pub timeout_secs: u64,
    /// Extra attempts after a transport error, HTTP 429 or HTTP 5xx.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "gpt-4-1106-preview".to_string(),
            vision_model: "gpt-4-vision-preview".to_string(),
            max_tokens: 2000,
            temperature: None,
            cache_seed: Some(42),
            cache_dir: ".cache".to_string(),
            timeout_secs: 120,
            max_retries: 3,
            retry_backoff_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommanderConfig {
    /// Auto-replies the commander may send per exchange before yielding.
    pub max_consecutive_auto_reply: u32,
    /// Messages scanned (newest first) for code to execute.
    pub last_n_messages: usize,
}

impl Default for CommanderConfig {
    fn default() -> Self {
        Self {
            max_consecutive_auto_reply: 5,
            last_n_messages: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Interpreter for Python code blocks.
    pub python: String,
    /// Wall-clock budget per executed block.
    pub timeout_secs: u64,
    /// Truncate captured output beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            timeout_secs: 60,
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for CreatorConfig {
    fn default() -> Self {
        Self {
            max_iter: 3,
            use_interpreter: false,
            human_input_mode: false,
            sentinel: DEFAULT_SENTINEL.to_string(),
            artifact_name: "model.py".to_string(),
            prompts: PromptOverrides::default(),
            llm: LlmConfig::default(),
            commander: CommanderConfig::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl CreatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sentinel.is_empty() {
            return Err(anyhow!("sentinel must be non-empty"));
        }
        let artifact = Path::new(&self.artifact_name);
        if self.artifact_name.trim().is_empty() || artifact.file_stem().is_none() {
            return Err(anyhow!("artifact_name must be a file name"));
        }
        if artifact.components().count() != 1 {
            return Err(anyhow!("artifact_name must not contain directories"));
        }
        if self.llm.model.trim().is_empty() || self.llm.vision_model.trim().is_empty() {
            return Err(anyhow!("llm.model and llm.vision_model must be non-empty"));
        }
        if self.llm.max_tokens == 0 {
            return Err(anyhow!("llm.max_tokens must be > 0"));
        }
        if self.llm.timeout_secs == 0 {
            return Err(anyhow!("llm.timeout_secs must be > 0"));
        }
        if self.sandbox.timeout_secs == 0 {
            return Err(anyhow!("sandbox.timeout_secs must be > 0"));
        }
        if self.sandbox.output_limit_bytes == 0 {
            return Err(anyhow!("sandbox.output_limit_bytes must be > 0"));
        }
        if self.sandbox.python.trim().is_empty() {
            return Err(anyhow!("sandbox.python must be non-empty"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `CreatorConfig::default()`.
pub fn load_config(path: &Path) -> Result<CreatorConfig> {
    if !path.exists() {
        let cfg = CreatorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: CreatorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &CreatorConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
