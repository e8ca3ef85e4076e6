use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Receiver, TryRecvError},
    Arc,
};
use std::thread::JoinHandle;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::is_supported_video;
use crate::error::{Error, InvalidRootReason, Result};
use crate::models::{ScanProgress, ScanStats, VideoEntry};
use crate::session::ScanSession;

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub root: PathBuf,
    pub recursive: bool,
}

impl ScanConfig {
    pub fn for_folder(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            recursive: true,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ScanCancelToken {
    cancelled: Arc<AtomicBool>,
}

impl ScanCancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Canonical form of the requested root.
    pub root: PathBuf,
    /// Entries in discovery order (directory walk sorted by file name).
    pub entries: Vec<VideoEntry>,
    pub stats: ScanStats,
}

impl ScanOutcome {
    pub fn into_session(self) -> ScanSession {
        ScanSession::new(self.root, self.entries)
    }
}

/// Checks that `root` exists, is a directory and can be listed, and returns
/// its canonical form. This runs before any walk work starts.
pub fn validate_root(root: &Path) -> Result<PathBuf> {
    let invalid = |reason| Error::InvalidRoot {
        path: root.to_path_buf(),
        reason,
    };

    let md = match fs::metadata(root) {
        Ok(md) => md,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(invalid(InvalidRootReason::NotFound))
        }
        Err(_) => return Err(invalid(InvalidRootReason::Unreadable)),
    };
    if !md.is_dir() {
        return Err(invalid(InvalidRootReason::NotADirectory));
    }

    // Permission probe: the listing must open and yield its first entry.
    match fs::read_dir(root) {
        Ok(mut entries) => {
            if let Some(Err(_)) = entries.next() {
                return Err(invalid(InvalidRootReason::Unreadable));
            }
        }
        Err(_) => return Err(invalid(InvalidRootReason::Unreadable)),
    }

    fs::canonicalize(root).map_err(|_| invalid(InvalidRootReason::Unreadable))
}

pub fn scan_videos(config: &ScanConfig) -> Result<ScanOutcome> {
    scan_videos_with_progress(config, None, |_| {})
}

pub fn scan_videos_with_progress<F>(
    config: &ScanConfig,
    cancel: Option<&ScanCancelToken>,
    on_progress: F,
) -> Result<ScanOutcome>
where
    F: FnMut(&ScanProgress),
{
    let root = validate_root(&config.root)?;
    walk_root(root, config.recursive, cancel, on_progress)
}

fn walk_root<F>(
    root: PathBuf,
    recursive: bool,
    cancel: Option<&ScanCancelToken>,
    mut on_progress: F,
) -> Result<ScanOutcome>
where
    F: FnMut(&ScanProgress),
{
    let mut walker = WalkDir::new(&root).follow_links(false).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut stats = ScanStats::default();
    let mut dirs_seen = 0u64;
    let mut entries = Vec::new();

    for entry in walker {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            info!(root = %root.display(), "scan cancelled");
            return Err(Error::Cancelled);
        }

        let entry = match entry {
            Ok(v) => v,
            Err(err) => {
                debug!(error = %err, "skipping unreadable entry");
                stats.entries_skipped += 1;
                continue;
            }
        };

        if entry.file_type().is_dir() {
            dirs_seen += 1;
            on_progress(&ScanProgress {
                files_seen: stats.files_seen,
                videos_found: stats.videos_found,
                dirs_seen,
                current_path: entry.path().to_path_buf(),
            });
            continue;
        }

        if !entry.file_type().is_file() {
            continue;
        }

        stats.files_seen += 1;
        if !is_supported_video(entry.path()) {
            continue;
        }

        let md = match entry.metadata() {
            Ok(v) => v,
            Err(err) => {
                warn!(path = %entry.path().display(), error = %err, "cannot stat video, skipping");
                stats.entries_skipped += 1;
                continue;
            }
        };

        stats.videos_found += 1;
        entries.push(VideoEntry {
            path: entry.path().to_path_buf(),
            size_bytes: md.len(),
            modified_at: md.modified().ok(),
        });

        on_progress(&ScanProgress {
            files_seen: stats.files_seen,
            videos_found: stats.videos_found,
            dirs_seen,
            current_path: entry.path().to_path_buf(),
        });
    }

    info!(
        root = %root.display(),
        videos = stats.videos_found,
        files = stats.files_seen,
        skipped = stats.entries_skipped,
        "scan complete"
    );
    Ok(ScanOutcome {
        root,
        entries,
        stats,
    })
}

pub enum ScanEvent {
    Progress(ScanProgress),
    Finished(Result<ScanOutcome>),
}

/// A walk running on its own thread. Progress and the final outcome arrive
/// on a channel the owner polls or blocks on.
pub struct ScanHandle {
    root: PathBuf,
    events: Receiver<ScanEvent>,
    cancel: ScanCancelToken,
    worker: Option<JoinHandle<()>>,
}

/// Validates the root synchronously, then walks it on a background thread.
/// An invalid root is reported here, before any thread is started.
pub fn spawn_scan(config: ScanConfig) -> Result<ScanHandle> {
    let root = validate_root(&config.root)?;
    let cancel = ScanCancelToken::new();
    let (tx, rx) = mpsc::channel();

    let worker_root = root.clone();
    let worker_cancel = cancel.clone();
    let worker = std::thread::Builder::new()
        .name("reelpick-scan".to_string())
        .spawn(move || {
            let progress_tx = tx.clone();
            let result = walk_root(
                worker_root,
                config.recursive,
                Some(&worker_cancel),
                |progress| {
                    let _ = progress_tx.send(ScanEvent::Progress(progress.clone()));
                },
            );
            let _ = tx.send(ScanEvent::Finished(result));
        })?;

    Ok(ScanHandle {
        root,
        events: rx,
        cancel,
        worker: Some(worker),
    })
}

impl ScanHandle {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Non-blocking poll for the next event. Polling again after
    /// `Finished` was returned yields a worker-gone error.
    pub fn try_next(&self) -> Option<ScanEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(ScanEvent::Finished(Err(worker_gone()))),
        }
    }

    pub fn wait(self) -> Result<ScanOutcome> {
        self.wait_with_progress(|_| {})
    }

    pub fn wait_with_progress<F>(mut self, mut on_progress: F) -> Result<ScanOutcome>
    where
        F: FnMut(&ScanProgress),
    {
        let result = loop {
            match self.events.recv() {
                Ok(ScanEvent::Progress(progress)) => on_progress(&progress),
                Ok(ScanEvent::Finished(result)) => break result,
                Err(_) => break Err(worker_gone()),
            }
        };
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        result
    }
}

fn worker_gone() -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::Other,
        "scan worker exited without a result",
    ))
}
