//! Live artifact and per-round snapshots.
//!
//! The coder's code is saved to a fixed path (`model.py`) and rewritten on
//! every revision. At the end of each round the live file is copied to
//! `<stem>_<round>.<ext>`; snapshots are created exclusively and never
//! overwritten.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

/// Paths of the generated artifact for one run.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    work_dir: PathBuf,
    live_path: PathBuf,
    stem: String,
    extension: Option<String>,
}

impl ArtifactStore {
    pub fn new(work_dir: &Path, artifact_name: &str) -> Result<Self> {
        let name = Path::new(artifact_name);
        let stem = name
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow!("artifact name {artifact_name} has no file stem"))?
            .to_string();
        let extension = name
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_string);
        Ok(Self {
            work_dir: work_dir.to_path_buf(),
            live_path: work_dir.join(name),
            stem,
            extension,
        })
    }

    /// The file the coder rewrites.
    pub fn live_path(&self) -> &Path {
        &self.live_path
    }

    /// Read the live artifact. A missing file is an error.
    pub fn read_current(&self) -> Result<String> {
        fs::read_to_string(&self.live_path)
            .with_context(|| format!("read artifact {}", self.live_path.display()))
    }

    pub fn snapshot_path(&self, round: u32) -> PathBuf {
        let name = match &self.extension {
            Some(ext) => format!("{}_{round}.{ext}", self.stem),
            None => format!("{}_{round}", self.stem),
        };
        self.work_dir.join(name)
    }

    /// Copy the live artifact to the snapshot for `round`.
    ///
    /// Fails if the live file is missing or the snapshot already exists.
    #[instrument(skip(self), fields(live = %self.live_path.display()))]
    pub fn snapshot(&self, round: u32) -> Result<PathBuf> {
        let contents = self.read_current()?;
        let path = self.snapshot_path(round);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("create snapshot {}", path.display()))?;
        file.write_all(contents.as_bytes())
            .with_context(|| format!("write snapshot {}", path.display()))?;
        debug!(path = %path.display(), bytes = contents.len(), "snapshot written");
        Ok(path)
    }
}
