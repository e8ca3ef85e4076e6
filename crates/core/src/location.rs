use std::path::{Path, PathBuf};

use crate::error::Result;

/// File whose presence beside the executable switches to portable storage.
pub const PORTABLE_MARKER: &str = ".portable";
pub const PORTABLE_DIR: &str = ".random_video_picker";
pub const PORTABLE_STATE_FILE: &str = "state.json";
pub const HOME_STATE_FILE: &str = ".random_video_picker.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Home,
    Portable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLocation {
    pub mode: StorageMode,
    pub state_file: PathBuf,
}

impl StateLocation {
    /// Picks the state file for an application living in `app_dir`. Only the
    /// marker's existence matters; its content is never read.
    pub fn resolve(app_dir: &Path) -> Self {
        if app_dir.join(PORTABLE_MARKER).exists() {
            return Self {
                mode: StorageMode::Portable,
                state_file: app_dir.join(PORTABLE_DIR).join(PORTABLE_STATE_FILE),
            };
        }

        let home = dirs::home_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            mode: StorageMode::Home,
            state_file: home.join(HOME_STATE_FILE),
        }
    }

    /// Resolves relative to the directory holding the running executable.
    pub fn for_current_exe() -> Result<Self> {
        let exe = std::env::current_exe()?;
        let app_dir = exe
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self::resolve(&app_dir))
    }

    pub fn at(state_file: impl Into<PathBuf>) -> Self {
        Self {
            mode: StorageMode::Home,
            state_file: state_file.into(),
        }
    }
}
