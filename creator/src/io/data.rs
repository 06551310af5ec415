//! Paper input loading and run directory layout.

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Local};
use tracing::{debug, instrument, warn};

use crate::core::description::{image_paths, rewrite_image_tags};

/// Description file inside a data directory.
pub const SCRIPT_FILE: &str = "script.txt";
/// Timestamp format of a run directory name.
pub const RUN_DIR_FORMAT: &str = "%Y_%m_%d-%H_%M_%S";
const MAX_RUN_DIR_SUFFIX: u32 = 100;

/// A paper description ready to be sent to the agents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperInput {
    /// Data directory name; names the output subdirectory.
    pub name: String,
    pub data_dir: PathBuf,
    /// `script.txt` with every `<img ...>` path made absolute.
    pub description: String,
}

/// Load `script.txt` from `data_dir`, resolving image tags against it.
#[instrument(skip_all, fields(data_dir = %data_dir.display()))]
pub fn load_paper(data_dir: &Path) -> Result<PaperInput> {
    let data_dir = std::path::absolute(data_dir)
        .map(|dir| normalize_lexically(&dir))
        .with_context(|| format!("resolve data dir {}", data_dir.display()))?;
    let name = data_dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("data dir {} has no name", data_dir.display()))?
        .to_string();
    let script_path = data_dir.join(SCRIPT_FILE);
    let raw = fs::read_to_string(&script_path)
        .with_context(|| format!("read {}", script_path.display()))?;

    let description = rewrite_image_tags(&raw, |relative| {
        normalize_lexically(&data_dir.join(relative))
            .display()
            .to_string()
    });
    for image in image_paths(&description) {
        if !Path::new(image).is_file() {
            warn!(image = %image, "referenced image does not exist");
        }
    }
    debug!(name = %name, bytes = description.len(), "paper loaded");
    Ok(PaperInput {
        name,
        data_dir,
        description,
    })
}

/// Resolve `.` and `..` components without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out
}

/// `<output_dir>/<name>/<timestamp>`.
pub fn run_dir(output_dir: &Path, name: &str, started_at: DateTime<Local>) -> PathBuf {
    output_dir
        .join(name)
        .join(started_at.format(RUN_DIR_FORMAT).to_string())
}

/// Create a fresh run directory. Runs started in the same second get a
/// `-<n>` suffix instead of sharing a directory.
pub fn create_run_dir(
    output_dir: &Path,
    name: &str,
    started_at: DateTime<Local>,
) -> Result<PathBuf> {
    let base = run_dir(output_dir, name, started_at);
    if let Some(parent) = base.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let mut candidate = base.clone();
    for n in 1..=MAX_RUN_DIR_SUFFIX {
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                let mut suffixed = base.as_os_str().to_os_string();
                suffixed.push(format!("-{n}"));
                candidate = PathBuf::from(suffixed);
            }
            Err(err) => {
                return Err(err).with_context(|| format!("create run dir {}", candidate.display()));
            }
        }
    }
    Err(anyhow!(
        "no free run dir for {} after {MAX_RUN_DIR_SUFFIX} attempts",
        base.display()
    ))
}
