use std::ffi::OsString;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::{PreviewFailure, Thumbnail, VideoMetadata};
use crate::process::{launch_with_timeout, run_with_timeout, ToolError};

/// Prefix of every temporary thumbnail this crate writes.
pub const THUMBNAIL_PREFIX: &str = "reelpick-thumb-";

#[derive(Debug, Clone, Copy)]
pub struct ThumbnailRequest {
    pub seek: Duration,
    pub size: (u32, u32),
    pub timeout: Duration,
}

/// External metadata probe and frame grabber.
///
/// Implementations are shared across worker threads and must not keep
/// per-call mutable state: each call owns its subprocess and output file.
pub trait PreviewTool: Send + Sync {
    fn probe(&self, path: &Path, timeout: Duration) -> Result<VideoMetadata, PreviewFailure>;

    fn thumbnail(&self, path: &Path, request: &ThumbnailRequest)
        -> Result<Thumbnail, PreviewFailure>;
}

/// `ffprobe` + `ffmpeg` found on `PATH` (or at explicit locations).
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    ffprobe: OsString,
    ffmpeg: OsString,
    temp_dir: PathBuf,
}

impl Default for FfmpegTool {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegTool {
    pub fn new() -> Self {
        Self::with_programs("ffprobe", "ffmpeg")
    }

    pub fn with_programs(ffprobe: impl Into<OsString>, ffmpeg: impl Into<OsString>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
            ffmpeg: ffmpeg.into(),
            temp_dir: std::env::temp_dir(),
        }
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }
}

impl PreviewTool for FfmpegTool {
    fn probe(&self, path: &Path, timeout: Duration) -> Result<VideoMetadata, PreviewFailure> {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args([
            "-v",
            "quiet",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,codec_name:format=duration",
            "-of",
            "json",
        ])
        .arg(path);

        let stdout = run_with_timeout(cmd, timeout).map_err(|err| {
            debug!(path = %path.display(), error = %err, "ffprobe failed");
            match err {
                ToolError::NotFound => PreviewFailure::ToolUnavailable,
                ToolError::TimedOut(_) => PreviewFailure::ProbeTimeout,
                ToolError::Failed(_) | ToolError::Io(_) => PreviewFailure::ProbeFailed,
            }
        })?;

        parse_probe_output(&stdout).ok_or(PreviewFailure::ProbeFailed)
    }

    fn thumbnail(
        &self,
        path: &Path,
        request: &ThumbnailRequest,
    ) -> Result<Thumbnail, PreviewFailure> {
        // One temp file per call; concurrent workers never share an output.
        let out = tempfile::Builder::new()
            .prefix(THUMBNAIL_PREFIX)
            .suffix(".jpg")
            .tempfile_in(&self.temp_dir)
            .map_err(|err| {
                warn!(dir = %self.temp_dir.display(), error = %err, "cannot create thumbnail file");
                PreviewFailure::ThumbnailFailed
            })?;

        let (width, height) = request.size;
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error", "-ss"])
            .arg(format!("{:.3}", request.seek.as_secs_f64()))
            .arg("-i")
            .arg(path)
            .args(["-frames:v", "1", "-q:v", "2", "-vf"])
            .arg(format!("scale={width}:{height}"))
            .arg("-y")
            .arg(out.path());

        launch_with_timeout(cmd, request.timeout).map_err(|err| {
            debug!(path = %path.display(), error = %err, "ffmpeg failed");
            match err {
                ToolError::NotFound => PreviewFailure::ToolUnavailable,
                ToolError::TimedOut(_) => PreviewFailure::ThumbnailTimeout,
                ToolError::Failed(_) | ToolError::Io(_) => PreviewFailure::ThumbnailFailed,
            }
        })?;

        let bytes = fs::read(out.path()).map_err(|_| PreviewFailure::ThumbnailFailed)?;
        decode_thumbnail(bytes).ok_or(PreviewFailure::ThumbnailFailed)
    }
}

/// Checks that `bytes` hold a decodable image and records its dimensions.
pub fn decode_thumbnail(bytes: Vec<u8>) -> Option<Thumbnail> {
    if bytes.is_empty() {
        return None;
    }
    let (width, height) = image::io::Reader::new(Cursor::new(&bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()?;
    Some(Thumbnail {
        bytes: Arc::from(bytes),
        width,
        height,
    })
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    codec_name: Option<String>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parses `ffprobe -of json` output. Missing fields stay `None`.
pub fn parse_probe_output(stdout: &[u8]) -> Option<VideoMetadata> {
    let parsed: ProbeOutput = serde_json::from_slice(stdout).ok()?;
    let mut metadata = VideoMetadata::default();

    if let Some(stream) = parsed.streams.into_iter().next() {
        metadata.width = stream.width.filter(|w| *w > 0);
        metadata.height = stream.height.filter(|h| *h > 0);
        metadata.codec = stream.codec_name.filter(|c| !c.is_empty());
    }
    metadata.duration = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(Duration::from_secs_f64);

    Some(metadata)
}

/// Deletes thumbnails left behind by earlier runs that are older than
/// `max_age`. Returns how many were removed.
pub fn sweep_stale_thumbnails(dir: &Path, max_age: Duration) -> usize {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "thumbnail sweep skipped");
            return 0;
        }
    };

    let now = SystemTime::now();
    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(THUMBNAIL_PREFIX) {
            continue;
        }
        let Ok(md) = entry.metadata() else { continue };
        let age = md
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if !md.is_file() || age <= max_age {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => {
                debug!(path = %entry.path().display(), "removed stale thumbnail");
                removed += 1;
            }
            Err(err) => {
                warn!(path = %entry.path().display(), error = %err, "failed to remove stale thumbnail");
            }
        }
    }
    removed
}
