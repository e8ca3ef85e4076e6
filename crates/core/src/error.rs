use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid root {}: {reason}", path.display())]
    InvalidRoot {
        path: PathBuf,
        reason: InvalidRootReason,
    },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("failed to launch player for {}: {reason}", path.display())]
    Player { path: PathBuf, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("scan cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidRootReason {
    NotFound,
    NotADirectory,
    Unreadable,
}

impl std::fmt::Display for InvalidRootReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            InvalidRootReason::NotFound => "folder does not exist",
            InvalidRootReason::NotADirectory => "path is not a directory",
            InvalidRootReason::Unreadable => "folder cannot be read, check permissions",
        };
        f.write_str(text)
    }
}

/// Failure to read, write or remove the persisted state file.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("state file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state file {} is malformed: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Reason a path read back from the state file was not admitted.
#[derive(Debug, Error)]
pub enum PathValidationError {
    #[error("path contains parent-directory segments")]
    Traversal,

    #[error("path escapes {}", base.display())]
    OutsideBase { base: PathBuf },

    #[error("path cannot be resolved: {0}")]
    Unresolvable(#[source] std::io::Error),

    #[error("path is not a regular file")]
    NotAFile,

    #[error("path is not a directory")]
    NotADirectory,

    #[error("path is empty or relative")]
    NotAbsolute,
}
