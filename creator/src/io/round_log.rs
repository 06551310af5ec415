//! Per-round records under `<run_dir>/rounds/<n>/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::Verdict;

#[derive(Debug, Clone, Serialize)]
pub struct RoundMeta {
    pub round: u32,
    pub verdict: Verdict,
    pub snapshot: PathBuf,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RoundPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub critique_path: PathBuf,
}

impl RoundPaths {
    pub fn new(run_dir: &Path, round: u32) -> Self {
        let dir = run_dir.join("rounds").join(round.to_string());
        Self {
            meta_path: dir.join("meta.json"),
            critique_path: dir.join("critique.md"),
            dir,
        }
    }
}

pub fn write_round(run_dir: &Path, meta: &RoundMeta, critique: &str) -> Result<RoundPaths> {
    let paths = RoundPaths::new(run_dir, meta.round);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create round dir {}", paths.dir.display()))?;

    write_json(&paths.meta_path, meta)?;
    write_text(&paths.critique_path, critique)?;
    Ok(paths)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_paths_are_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = RoundPaths::new(temp.path(), 3);
        assert!(paths.dir.ends_with(Path::new("rounds/3")));
        assert!(paths.meta_path.ends_with("meta.json"));
        assert!(paths.critique_path.ends_with("critique.md"));
    }

    #[test]
    fn writes_meta_and_critique() {
        let temp = tempfile::tempdir().expect("tempdir");
        let meta = RoundMeta {
            round: 2,
            verdict: Verdict::Approved,
            snapshot: temp.path().join("model_2.py"),
            started_at: None,
            ended_at: None,
            duration_ms: Some(12),
        };
        let paths = write_round(temp.path(), &meta, "NO_ISSUES").expect("write");

        let meta_json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths.meta_path).expect("read"))
                .expect("json");
        assert_eq!(meta_json["round"], 2);
        assert_eq!(meta_json["verdict"], "approved");
        assert_eq!(
            fs::read_to_string(&paths.critique_path).expect("read"),
            "NO_ISSUES"
        );
    }
}
