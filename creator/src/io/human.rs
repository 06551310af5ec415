//! Operator input for the interactive interpretation pre-pass.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};

/// Source of human replies.
pub trait HumanInput {
    /// Show `prompt` and return the reply without its line terminator.
    fn ask(&self, prompt: &str) -> Result<String>;
}

/// Reads replies from stdin, prompting on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinHuman;

impl HumanInput for StdinHuman {
    fn ask(&self, prompt: &str) -> Result<String> {
        let mut stderr = io::stderr().lock();
        write!(stderr, "{prompt}").context("write prompt")?;
        stderr.flush().context("flush prompt")?;

        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .context("read operator reply")?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Whether an operator reply ends the dialogue.
pub fn ends_dialogue(reply: &str) -> bool {
    let reply = reply.trim();
    reply.is_empty() || reply.eq_ignore_ascii_case("exit")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_or_exit_ends_dialogue() {
        assert!(ends_dialogue(""));
        assert!(ends_dialogue("  \n"));
        assert!(ends_dialogue("exit"));
        assert!(ends_dialogue("EXIT "));
        assert!(!ends_dialogue("focus on the encoder"));
    }
}
