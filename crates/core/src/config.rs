use std::path::Path;
use std::time::Duration;

use crate::models::ExhaustionPolicy;

/// Extensions (lowercase, without the dot) that count as playable video.
pub const SUPPORTED_VIDEO_EXTENSIONS: [&str; 7] = ["mp4", "avi", "mkv", "mov", "wmv", "flv", "webm"];

pub const MAX_CACHE_SIZE: usize = 50;
pub const CACHE_EVICTION_COUNT: usize = 25;
pub const THUMBNAIL_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
pub const THUMBNAIL_TIMEOUT: Duration = Duration::from_secs(3);
pub const PLAYER_TIMEOUT: Duration = Duration::from_secs(30);
pub const THUMBNAIL_SEEK: Duration = Duration::from_secs(20);
pub const THUMBNAIL_SIZE: (u32, u32) = (160, 120);
pub const MAX_RECENT_VIDEOS: usize = 10;
pub const MAX_RECENT_ROOTS: usize = 8;

pub fn is_supported_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_VIDEO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct PreviewConfig {
    pub capacity: usize,
    pub eviction_count: usize,
    pub max_age: Duration,
    pub probe_timeout: Duration,
    pub thumbnail_timeout: Duration,
    pub thumbnail_seek: Duration,
    pub thumbnail_size: (u32, u32),
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            capacity: MAX_CACHE_SIZE,
            eviction_count: CACHE_EVICTION_COUNT,
            max_age: THUMBNAIL_MAX_AGE,
            probe_timeout: PROBE_TIMEOUT,
            thumbnail_timeout: THUMBNAIL_TIMEOUT,
            thumbnail_seek: THUMBNAIL_SEEK,
            thumbnail_size: THUMBNAIL_SIZE,
        }
    }
}

/// Picker settings. The exhaustion policy has no default; callers pick one.
#[derive(Debug, Clone)]
pub struct PickerConfig {
    pub exhaustion: ExhaustionPolicy,
    pub max_recent_videos: usize,
    pub max_recent_roots: usize,
}

impl PickerConfig {
    pub fn new(exhaustion: ExhaustionPolicy) -> Self {
        Self {
            exhaustion,
            max_recent_videos: MAX_RECENT_VIDEOS,
            max_recent_roots: MAX_RECENT_ROOTS,
        }
    }
}
