use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// A discovered video file. `path` is absolute and rooted at the canonical
/// scan root, which makes it the identity of the entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoEntry {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified_at: Option<SystemTime>,
}

impl VideoEntry {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }
}

/// Result of asking the session for another video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pick {
    Video(VideoEntry),
    /// Every discovered entry has been shown (or none were discovered).
    Exhausted,
}

/// What to do when the unseen pool runs dry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustionPolicy {
    /// Clear the shown set and draw again from the full pool.
    AutoReset,
    /// Report exhaustion and leave the session untouched.
    Stop,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionProgress {
    pub shown: usize,
    pub total: usize,
    pub rounds_completed: u32,
}

impl SessionProgress {
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.shown as f64 / self.total as f64 * 100.0
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VideoMetadata {
    pub duration: Option<Duration>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub codec: Option<String>,
}

impl VideoMetadata {
    pub fn is_empty(&self) -> bool {
        self.duration.is_none()
            && self.width.is_none()
            && self.height.is_none()
            && self.codec.is_none()
    }

    pub fn resolution(&self) -> Option<(u32, u32)> {
        Some((self.width?, self.height?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub bytes: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
}

/// Typed reason a preview stage produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreviewFailure {
    ProbeTimeout,
    ThumbnailTimeout,
    ToolUnavailable,
    InvalidInput,
    ProbeFailed,
    ThumbnailFailed,
}

impl std::fmt::Display for PreviewFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            PreviewFailure::ProbeTimeout => "probe timed out",
            PreviewFailure::ThumbnailTimeout => "thumbnail timed out",
            PreviewFailure::ToolUnavailable => "ffmpeg/ffprobe not available",
            PreviewFailure::InvalidInput => "file is missing or unreadable",
            PreviewFailure::ProbeFailed => "probe failed",
            PreviewFailure::ThumbnailFailed => "thumbnail generation failed",
        };
        f.write_str(text)
    }
}

pub type RequestId = u64;

/// A generated preview. Fields the tools could not produce stay `None`;
/// the matching `*_failure` records why.
#[derive(Debug, Clone)]
pub struct Preview {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified_at: Option<SystemTime>,
    pub metadata: VideoMetadata,
    pub thumbnail: Option<Thumbnail>,
    pub probe_failure: Option<PreviewFailure>,
    pub thumbnail_failure: Option<PreviewFailure>,
    pub generated_at: SystemTime,
    pub request_id: RequestId,
}

impl Preview {
    /// True when neither the probe nor the thumbnailer produced anything.
    pub fn is_blank(&self) -> bool {
        self.thumbnail.is_none() && self.metadata.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub files_seen: u64,
    pub videos_found: u64,
    pub dirs_seen: u64,
    pub current_path: PathBuf,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub files_seen: u64,
    pub videos_found: u64,
    pub entries_skipped: u64,
}
