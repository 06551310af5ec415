//! Fenced code block extraction from agent replies.
//!
//! Coder replies carry code in Markdown fences. A first line of the form
//! `# filename: model.py` asks the commander to save the block under that
//! name before running it.

use std::sync::LazyLock;

use regex::Regex;

static CODE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*([\w+-]*)[ \t]*\r?\n(.*?)\r?\n[ \t]*```").unwrap()
});

static FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:#|//)\s*filename:\s*(\S+)\s*$").unwrap()
});

/// Interpreter chosen for a code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Language {
    Python,
    Shell,
    Unknown(String),
}

/// One fenced block from a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// Fence info string, lowercased (empty when omitted).
    pub lang: String,
    pub code: String,
}

impl CodeBlock {
    pub fn language(&self) -> Language {
        match self.lang.as_str() {
            "" | "python" | "py" | "python3" => Language::Python,
            "sh" | "bash" | "shell" | "console" => Language::Shell,
            other => Language::Unknown(other.to_string()),
        }
    }

    /// Target filename declared on the first line, if any.
    pub fn filename(&self) -> Option<&str> {
        let first = self.code.lines().next()?;
        FILENAME_RE
            .captures(first)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

/// Extract every fenced block in order of appearance.
pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    CODE_BLOCK_RE
        .captures_iter(text)
        .map(|caps| CodeBlock {
            lang: caps
                .get(1)
                .map(|m| m.as_str().to_ascii_lowercase())
                .unwrap_or_default(),
            code: caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
        })
        .collect()
}
