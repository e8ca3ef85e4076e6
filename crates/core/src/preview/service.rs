use std::collections::HashMap;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use tracing::{debug, error, warn};

use crate::config::PreviewConfig;
use crate::models::{Preview, PreviewFailure, RequestId, VideoMetadata};
use crate::preview::cache::{Claim, PreviewCache};
use crate::video::{PreviewTool, ThumbnailRequest};

/// A logical place a preview is shown in, e.g. the main preview pane.
/// Supersession is tracked per slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewSlot(String);

impl PreviewSlot {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn primary() -> Self {
        Self::new("primary")
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRequest {
    pub id: RequestId,
    pub slot: PreviewSlot,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Issued,
    Probing,
    Thumbnailing,
    Completed,
    /// A newer request for the same slot was issued; the result was dropped.
    Superseded,
    Failed(PreviewFailure),
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Completed | RequestState::Superseded | RequestState::Failed(_)
        )
    }
}

/// Shared view of one request's state machine.
#[derive(Debug, Clone)]
pub struct RequestTracker(Arc<Mutex<RequestState>>);

impl RequestTracker {
    fn new(state: RequestState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    pub fn get(&self) -> RequestState {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, state: RequestState) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

#[derive(Debug, Clone)]
pub enum PreviewHandle {
    /// Served from cache; no event follows.
    Ready {
        request: PreviewRequest,
        preview: Arc<Preview>,
    },
    /// Being generated; exactly one event follows unless superseded.
    Pending {
        request: PreviewRequest,
        tracker: RequestTracker,
    },
    /// The path is not a readable file; nothing was scheduled.
    Rejected {
        request: PreviewRequest,
        reason: PreviewFailure,
    },
}

impl PreviewHandle {
    pub fn request(&self) -> &PreviewRequest {
        match self {
            PreviewHandle::Ready { request, .. }
            | PreviewHandle::Pending { request, .. }
            | PreviewHandle::Rejected { request, .. } => request,
        }
    }

    pub fn state(&self) -> RequestState {
        match self {
            PreviewHandle::Ready { .. } => RequestState::Completed,
            PreviewHandle::Pending { tracker, .. } => tracker.get(),
            PreviewHandle::Rejected { reason, .. } => RequestState::Failed(*reason),
        }
    }
}

#[derive(Debug, Clone)]
pub enum PreviewOutcome {
    Completed(Arc<Preview>),
    /// Nothing usable was produced. The blank preview is still cached.
    Failed {
        reason: PreviewFailure,
        preview: Arc<Preview>,
    },
}

impl PreviewOutcome {
    pub fn preview(&self) -> &Arc<Preview> {
        match self {
            PreviewOutcome::Completed(preview) | PreviewOutcome::Failed { preview, .. } => preview,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreviewEvent {
    pub request: PreviewRequest,
    pub outcome: PreviewOutcome,
}

pub(crate) struct Waiter {
    request: PreviewRequest,
    tracker: RequestTracker,
}

#[derive(Default)]
struct SlotState {
    latest: RequestId,
    applied: Option<(RequestId, Arc<Preview>)>,
}

struct Shared {
    cache: PreviewCache,
    tool: Arc<dyn PreviewTool>,
    config: PreviewConfig,
    slots: Mutex<HashMap<PreviewSlot, SlotState>>,
    next_id: AtomicU64,
    events: Sender<PreviewEvent>,
}

impl Shared {
    fn slots(&self) -> MutexGuard<'_, HashMap<PreviewSlot, SlotState>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies a result to its slot if the request is still the newest one
    /// issued there. Returns false when it was superseded.
    fn apply(&self, request: &PreviewRequest, preview: &Arc<Preview>) -> bool {
        let mut slots = self.slots();
        let state = slots.entry(request.slot.clone()).or_default();
        if state.latest != request.id {
            return false;
        }
        state.applied = Some((request.id, preview.clone()));
        true
    }

    /// Releases the claim on `key` without caching and fails every waiter.
    fn abandon(&self, key: &Path, request_id: RequestId, reason: PreviewFailure) {
        let blank = Arc::new(blank_preview(key, request_id, reason));
        for waiter in self.cache.abandon(key) {
            self.deliver(waiter, &blank, Some(reason));
        }
    }

    fn deliver(&self, waiter: Waiter, preview: &Arc<Preview>, failure: Option<PreviewFailure>) {
        let Waiter { request, tracker } = waiter;

        // Held across the send so a newer request cannot be issued between
        // the staleness check and the notification.
        let mut slots = self.slots();
        let state = slots.entry(request.slot.clone()).or_default();
        if state.latest != request.id {
            debug!(
                request = request.id,
                latest = state.latest,
                slot = request.slot.name(),
                "dropping superseded preview"
            );
            tracker.set(RequestState::Superseded);
            return;
        }
        state.applied = Some((request.id, preview.clone()));

        let outcome = match failure {
            None => {
                tracker.set(RequestState::Completed);
                PreviewOutcome::Completed(preview.clone())
            }
            Some(reason) => {
                tracker.set(RequestState::Failed(reason));
                PreviewOutcome::Failed {
                    reason,
                    preview: preview.clone(),
                }
            }
        };
        if self.events.send(PreviewEvent { request, outcome }).is_err() {
            debug!("preview receiver dropped");
        }
    }
}

/// Serves previews from the cache and generates missing ones on background
/// threads, one thread per outstanding generation.
///
/// Results arrive on the receiver returned by [`PreviewService::new`] in
/// completion order. A result is only delivered if its request is still the
/// newest one issued for its slot.
#[derive(Clone)]
pub struct PreviewService {
    shared: Arc<Shared>,
}

impl PreviewService {
    pub fn new(tool: Arc<dyn PreviewTool>, config: PreviewConfig) -> (Self, Receiver<PreviewEvent>) {
        let (tx, rx) = mpsc::channel();
        let cache = PreviewCache::new(config.capacity, config.eviction_count, config.max_age);
        let shared = Shared {
            cache,
            tool,
            config,
            slots: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            events: tx,
        };
        (
            Self {
                shared: Arc::new(shared),
            },
            rx,
        )
    }

    pub fn cache(&self) -> &PreviewCache {
        &self.shared.cache
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.shared.config
    }

    fn issue(&self, slot: &PreviewSlot, path: &Path) -> PreviewRequest {
        let mut slots = self.shared.slots();
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let state = slots.entry(slot.clone()).or_default();
        state.latest = id;
        state.applied = None;
        PreviewRequest {
            id,
            slot: slot.clone(),
            path: path.to_path_buf(),
        }
    }

    /// Returns a cached preview for `path`, or schedules generation and
    /// returns a pending handle. Issuing a request supersedes every earlier
    /// request for the same slot.
    pub fn get_or_generate(&self, slot: &PreviewSlot, path: &Path) -> PreviewHandle {
        let key = match fs::canonicalize(path) {
            Ok(key) if key.is_file() => key,
            _ => {
                let request = self.issue(slot, path);
                warn!(path = %path.display(), "preview requested for a missing file");
                return PreviewHandle::Rejected {
                    request,
                    reason: PreviewFailure::InvalidInput,
                };
            }
        };

        let request = self.issue(slot, &key);
        let tracker = RequestTracker::new(RequestState::Issued);
        let waiter = Waiter {
            request: request.clone(),
            tracker: tracker.clone(),
        };

        match self.shared.cache.lookup_or_claim(&key, waiter) {
            Claim::Hit(preview) => {
                debug!(path = %key.display(), request = request.id, "preview cache hit");
                self.shared.apply(&request, &preview);
                PreviewHandle::Ready { request, preview }
            }
            Claim::Joined => {
                debug!(path = %key.display(), request = request.id, "joined in-flight preview");
                PreviewHandle::Pending { request, tracker }
            }
            Claim::Generate => {
                debug!(path = %key.display(), request = request.id, "preview cache miss");
                self.spawn_worker(key, request.id, tracker.clone());
                PreviewHandle::Pending { request, tracker }
            }
        }
    }

    fn spawn_worker(&self, key: PathBuf, request_id: RequestId, tracker: RequestTracker) {
        let shared = self.shared.clone();
        let worker_key = key.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("reelpick-preview-{request_id}"))
            .spawn(move || run_job(&shared, worker_key, request_id, tracker));

        if let Err(err) = spawned {
            error!(path = %key.display(), error = %err, "cannot start preview worker");
            self.shared
                .abandon(&key, request_id, PreviewFailure::ToolUnavailable);
        }
    }

    /// Whether `request` is still the newest request of its slot.
    pub fn is_current(&self, request: &PreviewRequest) -> bool {
        self.shared
            .slots()
            .get(&request.slot)
            .is_some_and(|state| state.latest == request.id)
    }

    /// The preview applied for the newest request of `slot`, with that
    /// request's id. `None` while the newest request is pending or was
    /// rejected.
    pub fn current(&self, slot: &PreviewSlot) -> Option<(RequestId, Arc<Preview>)> {
        self.shared
            .slots()
            .get(slot)
            .and_then(|state| state.applied.clone())
    }

    /// Drops the cached preview for `path` so the next request regenerates
    /// it. Cached failures are otherwise never retried.
    pub fn refresh(&self, path: &Path) -> bool {
        let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.shared.cache.remove(&key)
    }
}

fn run_job(shared: &Shared, key: PathBuf, request_id: RequestId, tracker: RequestTracker) {
    // A tool that panics must still release the claim, or every later
    // request for this key would join a job that never finishes.
    let generated = panic::catch_unwind(AssertUnwindSafe(|| {
        generate(
            shared.tool.as_ref(),
            &shared.config,
            &key,
            request_id,
            &tracker,
        )
    }));
    let (preview, failure) = match generated {
        Ok(generated) => generated,
        Err(_) => {
            error!(path = %key.display(), request = request_id, "preview tool panicked");
            shared.abandon(&key, request_id, PreviewFailure::ToolUnavailable);
            return;
        }
    };
    let preview = Arc::new(preview);
    let (waiters, evicted) = shared.cache.complete(preview.clone());
    if !evicted.is_empty() {
        debug!(count = evicted.len(), "evicted oldest previews");
    }
    for waiter in waiters {
        shared.deliver(waiter, &preview, failure);
    }
}

/// Seek target for the thumbnail: the configured offset, or the midpoint of
/// videos shorter than that.
pub fn thumbnail_offset(duration: Option<Duration>, seek: Duration) -> Duration {
    match duration {
        Some(duration) if duration < seek => duration / 2,
        _ => seek,
    }
}

fn generate(
    tool: &dyn PreviewTool,
    config: &PreviewConfig,
    path: &Path,
    request_id: RequestId,
    tracker: &RequestTracker,
) -> (Preview, Option<PreviewFailure>) {
    let md = match fs::metadata(path) {
        Ok(md) if md.is_file() => md,
        _ => {
            warn!(path = %path.display(), "video vanished before preview");
            let preview = blank_preview(path, request_id, PreviewFailure::InvalidInput);
            return (preview, Some(PreviewFailure::InvalidInput));
        }
    };

    tracker.set(RequestState::Probing);
    let (metadata, probe_failure) = match tool.probe(path, config.probe_timeout) {
        Ok(metadata) => (metadata, None),
        Err(reason) => {
            warn!(path = %path.display(), %reason, "metadata unavailable");
            (VideoMetadata::default(), Some(reason))
        }
    };

    tracker.set(RequestState::Thumbnailing);
    let request = ThumbnailRequest {
        seek: thumbnail_offset(metadata.duration, config.thumbnail_seek),
        size: config.thumbnail_size,
        timeout: config.thumbnail_timeout,
    };
    let (thumbnail, thumbnail_failure) = match tool.thumbnail(path, &request) {
        Ok(thumbnail) => (Some(thumbnail), None),
        Err(reason) => {
            warn!(path = %path.display(), %reason, "thumbnail unavailable");
            (None, Some(reason))
        }
    };

    let preview = Preview {
        path: path.to_path_buf(),
        size_bytes: md.len(),
        modified_at: md.modified().ok(),
        metadata,
        thumbnail,
        probe_failure,
        thumbnail_failure,
        generated_at: SystemTime::now(),
        request_id,
    };
    let failure = if preview.is_blank() {
        thumbnail_failure.or(probe_failure)
    } else {
        None
    };
    (preview, failure)
}

fn blank_preview(path: &Path, request_id: RequestId, reason: PreviewFailure) -> Preview {
    Preview {
        path: path.to_path_buf(),
        size_bytes: 0,
        modified_at: None,
        metadata: VideoMetadata::default(),
        thumbnail: None,
        probe_failure: Some(reason),
        thumbnail_failure: Some(reason),
        generated_at: SystemTime::now(),
        request_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbnail_offset_uses_midpoint_for_short_videos() {
        let seek = Duration::from_secs(20);
        assert_eq!(thumbnail_offset(None, seek), seek);
        assert_eq!(thumbnail_offset(Some(Duration::from_secs(600)), seek), seek);
        assert_eq!(
            thumbnail_offset(Some(Duration::from_secs(8)), seek),
            Duration::from_secs(4)
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(!RequestState::Issued.is_terminal());
        assert!(!RequestState::Thumbnailing.is_terminal());
        assert!(RequestState::Superseded.is_terminal());
        assert!(RequestState::Failed(PreviewFailure::ProbeTimeout).is_terminal());
    }
}
