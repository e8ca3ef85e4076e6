use std::path::Path;
use std::process::Command;
use std::time::Duration;

use tracing::{error, info};

use crate::config::PLAYER_TIMEOUT;
use crate::error::{Error, Result};
use crate::process::{launch_with_timeout, ToolError};

/// "Play this file" capability.
pub trait Player {
    fn play(&self, path: &Path) -> Result<()>;
}

/// Hands the file to the desktop's default application. Only the launcher
/// is time-boxed; playback itself is not waited on.
#[derive(Debug, Clone)]
pub struct SystemPlayer {
    timeout: Duration,
}

impl Default for SystemPlayer {
    fn default() -> Self {
        Self {
            timeout: PLAYER_TIMEOUT,
        }
    }
}

impl SystemPlayer {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn launcher(path: &Path) -> Result<Command> {
        if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", "start", ""]).arg(path);
            Ok(cmd)
        } else if cfg!(target_os = "macos") {
            let mut cmd = Command::new("open");
            cmd.arg(path);
            Ok(cmd)
        } else if cfg!(unix) {
            let mut cmd = Command::new("xdg-open");
            cmd.arg(path);
            Ok(cmd)
        } else {
            Err(Error::Player {
                path: path.to_path_buf(),
                reason: format!("unsupported operating system: {}", std::env::consts::OS),
            })
        }
    }
}

impl Player for SystemPlayer {
    fn play(&self, path: &Path) -> Result<()> {
        let cmd = Self::launcher(path)?;
        launch_with_timeout(cmd, self.timeout).map_err(|err| {
            error!(path = %path.display(), error = %err, "player launch failed");
            let reason = match err {
                ToolError::TimedOut(t) => {
                    format!("launcher took longer than {}s", t.as_secs())
                }
                ToolError::NotFound => "no launcher program available".to_string(),
                other => other.to_string(),
            };
            Error::Player {
                path: path.to_path_buf(),
                reason,
            }
        })?;
        info!(path = %path.display(), "player launched");
        Ok(())
    }
}
