use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use reelpick_core::config::PreviewConfig;
use reelpick_core::preview::{
    PreviewEvent, PreviewHandle, PreviewOutcome, PreviewService, PreviewSlot, RequestState,
};
use reelpick_core::video::{PreviewTool, ThumbnailRequest};
use reelpick_core::{PreviewFailure, Thumbnail, VideoMetadata};
use tempfile::{tempdir, TempDir};

const WAIT: Duration = Duration::from_secs(5);

/// Blocks tool calls until opened.
#[derive(Clone, Default)]
struct Gate(Arc<(Mutex<bool>, Condvar)>);

impl Gate {
    fn opened() -> Self {
        let gate = Self::default();
        gate.open();
        gate
    }

    fn open(&self) {
        let (lock, cvar) = &*self.0;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }

    fn wait(&self) {
        let (lock, cvar) = &*self.0;
        let mut open = lock.lock().unwrap();
        while !*open {
            open = cvar.wait(open).unwrap();
        }
    }
}

#[derive(Clone, Copy)]
enum Behavior {
    Succeed,
    TimeOut,
    Panic,
}

struct FakeTool {
    behavior: Behavior,
    gate: Gate,
    /// When set, only probes of this path wait on the gate.
    gated_path: Option<PathBuf>,
    probes: AtomicUsize,
    seeks: Mutex<Vec<Duration>>,
}

impl FakeTool {
    fn new(behavior: Behavior, gate: Gate) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            gate,
            gated_path: None,
            probes: AtomicUsize::new(0),
            seeks: Mutex::new(Vec::new()),
        })
    }

    fn gated_on(behavior: Behavior, gate: Gate, path: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            gate,
            gated_path: Some(path),
            probes: AtomicUsize::new(0),
            seeks: Mutex::new(Vec::new()),
        })
    }

    fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl PreviewTool for FakeTool {
    fn probe(&self, path: &Path, _timeout: Duration) -> Result<VideoMetadata, PreviewFailure> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.gated_path.as_deref().map_or(true, |gated| gated == path) {
            self.gate.wait();
        }
        match self.behavior {
            Behavior::Succeed => Ok(VideoMetadata {
                duration: Some(Duration::from_secs(8)),
                width: Some(640),
                height: Some(360),
                codec: Some("h264".to_string()),
            }),
            Behavior::TimeOut => Err(PreviewFailure::ProbeTimeout),
            Behavior::Panic => panic!("ffprobe wrapper blew up"),
        }
    }

    fn thumbnail(
        &self,
        _path: &Path,
        request: &ThumbnailRequest,
    ) -> Result<Thumbnail, PreviewFailure> {
        self.seeks.lock().unwrap().push(request.seek);
        match self.behavior {
            Behavior::Succeed => Ok(Thumbnail {
                bytes: Arc::from(vec![0xff, 0xd8, 0xff]),
                width: request.size.0,
                height: request.size.1,
            }),
            Behavior::TimeOut => Err(PreviewFailure::ThumbnailTimeout),
            Behavior::Panic => panic!("ffmpeg wrapper blew up"),
        }
    }
}

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
}

impl Fixture {
    fn new(videos: &[&str]) -> Self {
        let dir = tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        for name in videos {
            fs::write(root.join(name), b"video").unwrap();
        }
        Self { _dir: dir, root }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

fn service(tool: Arc<FakeTool>, config: PreviewConfig) -> (PreviewService, Receiver<PreviewEvent>) {
    PreviewService::new(tool, config)
}

fn wait_terminal(handle: &PreviewHandle) -> RequestState {
    let deadline = Instant::now() + WAIT;
    loop {
        let state = handle.state();
        if state.is_terminal() || Instant::now() > deadline {
            return state;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_generated_preview_is_served_from_cache() {
    let fx = Fixture::new(&["a.mp4"]);
    let tool = FakeTool::new(Behavior::Succeed, Gate::opened());
    let (svc, events) = service(tool.clone(), PreviewConfig::default());
    let slot = PreviewSlot::primary();

    let first = svc.get_or_generate(&slot, &fx.path("a.mp4"));
    assert!(matches!(first, PreviewHandle::Pending { .. }));
    let event = events.recv_timeout(WAIT).unwrap();
    assert_eq!(event.request.id, first.request().id);
    let PreviewOutcome::Completed(preview) = event.outcome else {
        panic!("expected a completed preview");
    };
    assert_eq!(preview.metadata.resolution(), Some((640, 360)));
    assert_eq!(preview.size_bytes, 5);
    assert_eq!(wait_terminal(&first), RequestState::Completed);
    // Short clip: the frame is taken from the middle.
    assert_eq!(*tool.seeks.lock().unwrap(), vec![Duration::from_secs(4)]);

    let second = svc.get_or_generate(&slot, &fx.path("a.mp4"));
    let PreviewHandle::Ready { preview: cached, .. } = &second else {
        panic!("expected a cache hit");
    };
    assert!(Arc::ptr_eq(cached, &preview));
    assert_eq!(tool.probes(), 1);
    assert!(events.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(svc.current(&slot).map(|(id, _)| id), Some(second.request().id));
}

#[test]
fn test_timeouts_yield_a_cached_blank_preview() {
    let fx = Fixture::new(&["slow.mkv"]);
    let tool = FakeTool::new(Behavior::TimeOut, Gate::opened());
    let (svc, events) = service(tool.clone(), PreviewConfig::default());
    let slot = PreviewSlot::primary();

    let handle = svc.get_or_generate(&slot, &fx.path("slow.mkv"));
    let event = events.recv_timeout(WAIT).unwrap();
    match event.outcome {
        PreviewOutcome::Failed { reason, preview } => {
            assert_eq!(reason, PreviewFailure::ThumbnailTimeout);
            assert!(preview.is_blank());
            assert_eq!(preview.probe_failure, Some(PreviewFailure::ProbeTimeout));
        }
        PreviewOutcome::Completed(_) => panic!("expected a failure"),
    }
    assert_eq!(
        wait_terminal(&handle),
        RequestState::Failed(PreviewFailure::ThumbnailTimeout)
    );

    // The blank entry is not retried automatically.
    let again = svc.get_or_generate(&slot, &fx.path("slow.mkv"));
    assert!(matches!(again, PreviewHandle::Ready { .. }));
    assert_eq!(tool.probes(), 1);

    assert!(svc.refresh(&fx.path("slow.mkv")));
    let retried = svc.get_or_generate(&slot, &fx.path("slow.mkv"));
    assert!(matches!(retried, PreviewHandle::Pending { .. }));
    events.recv_timeout(WAIT).unwrap();
    assert_eq!(tool.probes(), 2);
}

#[test]
fn test_newer_request_supersedes_older_one() {
    let fx = Fixture::new(&["a.mp4", "b.mp4"]);
    let gate = Gate::default();
    let tool = FakeTool::new(Behavior::Succeed, gate.clone());
    let (svc, events) = service(tool, PreviewConfig::default());
    let slot = PreviewSlot::primary();

    let a = svc.get_or_generate(&slot, &fx.path("a.mp4"));
    let b = svc.get_or_generate(&slot, &fx.path("b.mp4"));
    assert!(b.request().id > a.request().id);
    assert!(!svc.is_current(a.request()));
    assert!(svc.is_current(b.request()));
    gate.open();

    let event = events.recv_timeout(WAIT).unwrap();
    assert_eq!(event.request.id, b.request().id);
    assert_eq!(event.request.path, fx.path("b.mp4"));
    assert_eq!(wait_terminal(&a), RequestState::Superseded);
    assert!(events.recv_timeout(Duration::from_millis(200)).is_err());

    let (applied, preview) = svc.current(&slot).unwrap();
    assert_eq!(applied, b.request().id);
    assert_eq!(preview.path, fx.path("b.mp4"));
    // The superseded result is still cached.
    assert!(svc.cache().contains(&fx.path("a.mp4")));
}

#[test]
fn test_late_result_of_superseded_request_is_dropped() {
    let fx = Fixture::new(&["a.mp4", "b.mp4"]);
    let gate = Gate::default();
    let tool = FakeTool::gated_on(Behavior::Succeed, gate.clone(), fx.path("a.mp4"));
    let (svc, events) = service(tool, PreviewConfig::default());
    let slot = PreviewSlot::primary();

    let a = svc.get_or_generate(&slot, &fx.path("a.mp4"));
    let b = svc.get_or_generate(&slot, &fx.path("b.mp4"));

    // B finishes and is applied while A is still held back.
    let event = events.recv_timeout(WAIT).unwrap();
    assert_eq!(event.request.id, b.request().id);
    assert_eq!(wait_terminal(&b), RequestState::Completed);
    assert!(!a.state().is_terminal());

    gate.open();
    assert_eq!(wait_terminal(&a), RequestState::Superseded);
    assert!(events.recv_timeout(Duration::from_millis(200)).is_err());

    let (applied, preview) = svc.current(&slot).unwrap();
    assert_eq!(applied, b.request().id);
    assert_eq!(preview.path, fx.path("b.mp4"));
}

#[test]
fn test_rejected_request_clears_the_slot() {
    let fx = Fixture::new(&["a.mp4"]);
    let tool = FakeTool::new(Behavior::Succeed, Gate::opened());
    let (svc, events) = service(tool, PreviewConfig::default());
    let slot = PreviewSlot::primary();

    svc.get_or_generate(&slot, &fx.path("a.mp4"));
    events.recv_timeout(WAIT).unwrap();
    assert!(svc.current(&slot).is_some());

    let ghost = svc.get_or_generate(&slot, &fx.path("ghost.mp4"));
    assert_eq!(ghost.state(), RequestState::Failed(PreviewFailure::InvalidInput));
    assert!(svc.is_current(ghost.request()));
    assert!(svc.current(&slot).is_none());
}

#[test]
fn test_panicking_tool_releases_the_key() {
    let fx = Fixture::new(&["a.mp4"]);
    let tool = FakeTool::new(Behavior::Panic, Gate::opened());
    let (svc, events) = service(tool.clone(), PreviewConfig::default());
    let slot = PreviewSlot::primary();

    let first = svc.get_or_generate(&slot, &fx.path("a.mp4"));
    let event = events.recv_timeout(WAIT).unwrap();
    assert_eq!(event.request.id, first.request().id);
    match event.outcome {
        PreviewOutcome::Failed { reason, .. } => assert_eq!(reason, PreviewFailure::ToolUnavailable),
        PreviewOutcome::Completed(_) => panic!("expected a failure"),
    }
    assert_eq!(
        wait_terminal(&first),
        RequestState::Failed(PreviewFailure::ToolUnavailable)
    );
    assert!(!svc.cache().is_generating(&fx.path("a.mp4")));
    assert!(!svc.cache().contains(&fx.path("a.mp4")));

    // Nothing was cached, so the next request starts a fresh job and is
    // notified as well.
    let second = svc.get_or_generate(&slot, &fx.path("a.mp4"));
    assert!(matches!(second, PreviewHandle::Pending { .. }));
    let event = events.recv_timeout(WAIT).unwrap();
    assert_eq!(event.request.id, second.request().id);
    assert_eq!(tool.probes(), 2);
}

#[test]
fn test_same_path_requests_share_one_generation() {
    let fx = Fixture::new(&["a.mp4"]);
    let gate = Gate::default();
    let tool = FakeTool::new(Behavior::Succeed, gate.clone());
    let (svc, events) = service(tool.clone(), PreviewConfig::default());
    let slot = PreviewSlot::primary();

    let first = svc.get_or_generate(&slot, &fx.path("a.mp4"));
    let second = svc.get_or_generate(&slot, &fx.path("a.mp4"));
    assert!(matches!(second, PreviewHandle::Pending { .. }));
    assert!(svc.cache().is_generating(&fx.path("a.mp4")));
    gate.open();

    let event = events.recv_timeout(WAIT).unwrap();
    assert_eq!(event.request.id, second.request().id);
    assert_eq!(wait_terminal(&first), RequestState::Superseded);
    assert_eq!(wait_terminal(&second), RequestState::Completed);
    assert!(events.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(tool.probes(), 1);
}

#[test]
fn test_slots_do_not_supersede_each_other() {
    let fx = Fixture::new(&["a.mp4", "b.mp4"]);
    let gate = Gate::default();
    let tool = FakeTool::new(Behavior::Succeed, gate.clone());
    let (svc, events) = service(tool, PreviewConfig::default());

    let main = svc.get_or_generate(&PreviewSlot::primary(), &fx.path("a.mp4"));
    let side = svc.get_or_generate(&PreviewSlot::new("recent"), &fx.path("b.mp4"));
    gate.open();

    let mut delivered: Vec<u64> = (0..2)
        .map(|_| events.recv_timeout(WAIT).unwrap().request.id)
        .collect();
    delivered.sort_unstable();
    assert_eq!(delivered, vec![main.request().id, side.request().id]);
}

#[test]
fn test_missing_file_is_rejected_without_work() {
    let fx = Fixture::new(&[]);
    let tool = FakeTool::new(Behavior::Succeed, Gate::opened());
    let (svc, events) = service(tool.clone(), PreviewConfig::default());

    let handle = svc.get_or_generate(&PreviewSlot::primary(), &fx.path("ghost.mp4"));
    match handle {
        PreviewHandle::Rejected { reason, .. } => assert_eq!(reason, PreviewFailure::InvalidInput),
        other => panic!("expected rejection, got {:?}", other.state()),
    }
    assert!(events.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(tool.probes(), 0);
    assert!(svc.cache().is_empty());
}

#[test]
fn test_cache_stays_within_capacity() {
    let names: Vec<String> = (0..7).map(|n| format!("{n}.mp4")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let fx = Fixture::new(&refs);
    let tool = FakeTool::new(Behavior::Succeed, Gate::opened());
    let config = PreviewConfig {
        capacity: 3,
        eviction_count: 2,
        ..PreviewConfig::default()
    };
    let (svc, events) = service(tool, config);
    let slot = PreviewSlot::primary();

    for name in &names {
        svc.get_or_generate(&slot, &fx.path(name));
        events.recv_timeout(WAIT).unwrap();
        assert!(svc.cache().len() <= 3);
    }
    assert!(svc.cache().contains(&fx.path("6.mp4")));
    assert!(!svc.cache().contains(&fx.path("0.mp4")));
}
