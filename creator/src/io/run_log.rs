//! Human-readable transcript of a run.
//!
//! Every conversation turn is appended to `chat_log_<timestamp>.log` in the
//! run directory and optionally echoed to stdout. The log is product output
//! and is unaffected by `RUST_LOG`; write failures only produce a warning.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing::{debug, warn};

use crate::core::conversation::Turn;

/// Format of the timestamp in the log file name.
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

pub struct RunLog {
    path: Option<PathBuf>,
    file: Option<BufWriter<File>>,
    echo: bool,
}

impl RunLog {
    /// Create `chat_log_<started_at>.log` inside `dir`.
    pub fn create(dir: &Path, started_at: DateTime<Local>, echo: bool) -> Result<Self> {
        let path = dir.join(log_file_name(started_at));
        let file = File::options()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("create {}", path.display()))?;
        debug!(path = %path.display(), "run log opened");
        Ok(Self {
            path: Some(path),
            file: Some(BufWriter::new(file)),
            echo,
        })
    }

    /// A log that records nothing.
    pub fn disabled() -> Self {
        Self {
            path: None,
            file: None,
            echo: false,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record(&mut self, turn: &Turn) {
        let entry = format_turn(turn);
        if self.echo {
            let mut stdout = io::stdout().lock();
            if let Err(err) = stdout.write_all(entry.as_bytes()) {
                warn!(err = %err, "failed to echo turn");
            }
        }
        if let Some(file) = &mut self.file {
            if let Err(err) = file.write_all(entry.as_bytes()) {
                warn!(err = %err, "failed to write run log");
            }
        }
    }

    /// Flush and close the file. Later records are only echoed.
    pub fn close(&mut self) {
        if let Some(mut file) = self.file.take() {
            if let Err(err) = file.flush() {
                warn!(err = %err, "failed to flush run log");
            }
        }
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        self.close();
    }
}

pub fn log_file_name(started_at: DateTime<Local>) -> String {
    format!("chat_log_{}.log", started_at.format(LOG_TIMESTAMP_FORMAT))
}

/// `Sender (to Recipient):` header, blank line, content, separator.
pub fn format_turn(turn: &Turn) -> String {
    format!(
        "{} (to {}):\n\n{}\n\n{}\n",
        turn.sender,
        turn.recipient,
        turn.content,
        "-".repeat(80)
    )
}
