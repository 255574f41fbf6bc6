//! Where recordings go and what they are called.

use crate::error::{RecordError, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

pub const CONTAINER_EXTENSION: &str = "avi";
pub const FALLBACK_DIR_NAME: &str = "ScreenRecordings";
const FILE_STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Volume recordings go to when it is mounted.
pub fn default_preferred_root() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("D:\\")
    } else {
        PathBuf::from("/mnt/recordings")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFolder {
    pub path: PathBuf,
    /// True when the preferred root was absent.
    pub fallback: bool,
}

/// Post-recording state of the output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStatus {
    Ok(u64),
    Missing,
    Empty,
}

pub struct OutputManager {
    preferred_root: PathBuf,
    fallback_root: PathBuf,
}

impl OutputManager {
    /// Falls back to the user's documents folder (or `~/Documents`).
    pub fn new(preferred_root: impl Into<PathBuf>) -> Self {
        let documents = dirs::document_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join("Documents")))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::with_fallback_root(preferred_root, documents)
    }

    pub fn with_fallback_root(
        preferred_root: impl Into<PathBuf>,
        documents: impl Into<PathBuf>,
    ) -> Self {
        Self {
            preferred_root: preferred_root.into(),
            fallback_root: documents.into().join(FALLBACK_DIR_NAME),
        }
    }

    pub fn resolve_folder(&self, identity: &str) -> Result<ResolvedFolder> {
        let fallback = !self.preferred_root.is_dir();
        let root = if fallback {
            &self.fallback_root
        } else {
            &self.preferred_root
        };
        let path = root.join(identity);
        fs_extra::dir::create_all(&path, false).map_err(|e| RecordError::Folder {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Ok(ResolvedFolder { path, fallback })
    }
}

/// `{identity}_{YYYY-MM-DD_HH-MM-SS}.avi`
pub fn name_file(identity: &str, timestamp: &DateTime<Local>) -> String {
    format!(
        "{}_{}.{}",
        identity,
        timestamp.format(FILE_STAMP_FORMAT),
        CONTAINER_EXTENSION
    )
}

pub fn verify(path: &Path) -> OutputStatus {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => OutputStatus::Ok(meta.len()),
        Ok(_) => OutputStatus::Empty,
        Err(_) => OutputStatus::Missing,
    }
}

/// Login name of the current OS user.
pub fn current_identity() -> String {
    ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|name| !name.trim().is_empty())
        .or_else(|| {
            dirs::home_dir()
                .and_then(|home| home.file_name().map(|n| n.to_string_lossy().into_owned()))
        })
        .unwrap_or_else(|| "unknown".to_string())
}
