//! Persisted picker state and the validation applied when reading it back.
//!
//! Everything in the state file is treated as untrusted input: paths are
//! stored as raw strings and only become `PathBuf`s after passing
//! [`validate_root_path`] or [`validate_video_path`].

use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{PathValidationError, PersistenceError};
use crate::location::StateLocation;

pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub recent_roots: Vec<String>,
    #[serde(default)]
    pub shown: Vec<String>,
    #[serde(default)]
    pub recent_videos: Vec<String>,
}

/// State that survived validation. Every path here exists and, for videos,
/// lies inside `root`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoredState {
    pub root: Option<PathBuf>,
    pub recent_roots: Vec<PathBuf>,
    pub shown: Vec<PathBuf>,
    pub recent_videos: Vec<PathBuf>,
    pub rejected: usize,
}

pub struct StateStore {
    location: StateLocation,
}

impl StateStore {
    pub fn new(location: StateLocation) -> Self {
        Self { location }
    }

    pub fn path(&self) -> &Path {
        &self.location.state_file
    }

    /// Writes the state through a temporary file in the same directory so a
    /// crash never leaves a half-written state file behind.
    pub fn save(&self, state: &PersistedState) -> Result<(), PersistenceError> {
        let path = self.path();
        let io_err = |source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        };

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(io_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        serde_json::to_writer_pretty(&mut tmp, state).map_err(|source| {
            PersistenceError::Malformed {
                path: path.to_path_buf(),
                source,
            }
        })?;
        tmp.write_all(b"\n").map_err(io_err)?;
        tmp.persist(path).map_err(|err| io_err(err.error))?;
        debug!(path = %path.display(), shown = state.shown.len(), "state saved");
        Ok(())
    }

    /// Reads the raw file. A missing file is `Ok(None)`.
    pub fn load_raw(&self) -> Result<Option<PersistedState>, PersistenceError> {
        let path = self.path();
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| PersistenceError::Malformed {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Best-effort load. Unreadable files yield an empty state; invalid
    /// paths are dropped with a warning each.
    pub fn load(&self) -> RestoredState {
        match self.load_raw() {
            Ok(Some(raw)) => restore(&raw),
            Ok(None) => RestoredState::default(),
            Err(err) => {
                error!(error = %err, "failed to load state, starting fresh");
                RestoredState::default()
            }
        }
    }

    /// Removes the state file. Returns whether a file was removed.
    pub fn clear(&self) -> Result<bool, PersistenceError> {
        match fs::remove_file(self.path()) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(PersistenceError::Io {
                path: self.path().to_path_buf(),
                source,
            }),
        }
    }
}

/// Validates every path of a raw state.
pub fn restore(raw: &PersistedState) -> RestoredState {
    let mut out = RestoredState::default();

    if raw.version > STATE_VERSION {
        warn!(
            version = raw.version,
            "state file written by a newer version, reading known fields only"
        );
    }

    out.root = match raw.root.as_deref() {
        Some(root) => match validate_root_path(root) {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(path = root, error = %err, "dropping saved root");
                out.rejected += 1;
                None
            }
        },
        None => None,
    };

    for raw_root in &raw.recent_roots {
        match validate_root_path(raw_root) {
            Ok(path) if !out.recent_roots.contains(&path) => out.recent_roots.push(path),
            Ok(_) => {}
            Err(err) => {
                warn!(path = raw_root.as_str(), error = %err, "dropping recent root");
                out.rejected += 1;
            }
        }
    }

    match out.root.clone() {
        Some(base) => {
            out.shown = validate_videos(&raw.shown, &base, "shown", &mut out.rejected);
            out.recent_videos =
                validate_videos(&raw.recent_videos, &base, "recent", &mut out.rejected);
        }
        None => {
            let dropped = raw.shown.len() + raw.recent_videos.len();
            if dropped > 0 {
                warn!(dropped, "no valid root in state, dropping saved video paths");
                out.rejected += dropped;
            }
        }
    }

    info!(
        root = ?out.root,
        shown = out.shown.len(),
        rejected = out.rejected,
        "state restored"
    );
    out
}

fn validate_videos(
    raw: &[String],
    base: &Path,
    kind: &'static str,
    rejected: &mut usize,
) -> Vec<PathBuf> {
    let mut out = Vec::with_capacity(raw.len());
    for raw_path in raw {
        match validate_video_path(raw_path, base) {
            Ok(path) if !out.contains(&path) => out.push(path),
            Ok(_) => {}
            Err(err) => {
                warn!(kind, path = raw_path.as_str(), error = %err, "skipping invalid video path");
                *rejected += 1;
            }
        }
    }
    out
}

fn has_parent_segment(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::ParentDir))
}

/// A saved root must be absolute, free of `..` segments and an existing
/// directory. Returns the canonical path.
pub fn validate_root_path(raw: &str) -> Result<PathBuf, PathValidationError> {
    let path = Path::new(raw);
    if has_parent_segment(path) {
        return Err(PathValidationError::Traversal);
    }
    if raw.is_empty() || !path.is_absolute() {
        return Err(PathValidationError::NotAbsolute);
    }
    let canonical = fs::canonicalize(path).map_err(PathValidationError::Unresolvable)?;
    if !canonical.is_dir() {
        return Err(PathValidationError::NotADirectory);
    }
    Ok(canonical)
}

/// A saved video path must be free of `..` segments, resolve (after
/// following links) to a location under the canonical `base`, and be a
/// regular file. Relative paths are taken relative to `base`.
pub fn validate_video_path(raw: &str, base: &Path) -> Result<PathBuf, PathValidationError> {
    let path = Path::new(raw);
    if raw.is_empty() {
        return Err(PathValidationError::NotAbsolute);
    }
    if has_parent_segment(path) {
        return Err(PathValidationError::Traversal);
    }

    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    let canonical = fs::canonicalize(&joined).map_err(PathValidationError::Unresolvable)?;
    if !canonical.starts_with(base) {
        return Err(PathValidationError::OutsideBase {
            base: base.to_path_buf(),
        });
    }
    if !canonical.is_file() {
        return Err(PathValidationError::NotAFile);
    }
    Ok(canonical)
}
