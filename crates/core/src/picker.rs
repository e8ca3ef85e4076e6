use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error, info, warn};

use crate::config::PickerConfig;
use crate::error::Result;
use crate::models::{Pick, SessionProgress};
use crate::player::Player;
use crate::scan::{spawn_scan, ScanConfig, ScanHandle, ScanOutcome};
use crate::session::{RecentList, ScanSession};
use crate::state::{PersistedState, RestoredState, StateStore, STATE_VERSION};

/// Owns the current scan session, the recent histories and the state file.
///
/// All methods run on the caller's thread; only the directory walk started
/// by [`Picker::start_scan`] runs elsewhere.
pub struct Picker {
    config: PickerConfig,
    store: StateStore,
    session: Option<ScanSession>,
    recent_roots: RecentList<PathBuf>,
    recent_videos: RecentList<PathBuf>,
    /// Loaded state waiting for its root to be scanned.
    restored: Option<RestoredState>,
    rng: StdRng,
}

impl Picker {
    pub fn new(config: PickerConfig, store: StateStore) -> Self {
        let recent_roots = RecentList::new(config.max_recent_roots);
        let recent_videos = RecentList::new(config.max_recent_videos);
        Self {
            config,
            store,
            session: None,
            recent_roots,
            recent_videos,
            restored: None,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn config(&self) -> &PickerConfig {
        &self.config
    }

    pub fn session(&self) -> Option<&ScanSession> {
        self.session.as_ref()
    }

    /// Root of the current session, or of the loaded state if nothing was
    /// scanned yet.
    pub fn root(&self) -> Option<&Path> {
        self.session
            .as_ref()
            .map(ScanSession::root)
            .or_else(|| self.restored.as_ref().and_then(|r| r.root.as_deref()))
    }

    /// Validates the root now and walks it in the background.
    pub fn start_scan(&self, config: ScanConfig) -> Result<ScanHandle> {
        spawn_scan(config)
    }

    /// Scans and installs the result, blocking until the walk is done.
    pub fn scan(&mut self, config: ScanConfig) -> Result<&ScanSession> {
        let outcome = spawn_scan(config)?.wait()?;
        Ok(self.install(outcome))
    }

    /// Makes a finished scan the current session. Rescanning the same root
    /// (or the root of loaded state) keeps its shown set; any other root
    /// starts a fresh session.
    pub fn install(&mut self, outcome: ScanOutcome) -> &ScanSession {
        let root = outcome.root.clone();
        let mut session = outcome.into_session();

        let previous = self
            .session
            .take()
            .filter(|previous| previous.root() == root.as_path());
        let restored = self
            .restored
            .take()
            .filter(|restored| restored.root.as_deref() == Some(root.as_path()));

        if let Some(previous) = previous {
            session.restore_shown(previous.shown_paths());
        } else if let Some(restored) = restored {
            let admitted = session.restore_shown(restored.shown.iter().map(PathBuf::as_path));
            info!(root = %root.display(), admitted, "resumed saved session");
        } else {
            info!(root = %root.display(), "new root, session reset");
            self.recent_videos.clear();
        }
        self.recent_videos.retain(|path| session.get(path).is_some());

        self.recent_roots.push_front(root);
        &*self.session.insert(session)
    }

    /// Draws an unseen video without applying the exhaustion policy.
    pub fn pick_random_unseen(&mut self) -> Pick {
        match self.session.as_mut() {
            Some(session) => session.pick_random_unseen(&mut self.rng),
            None => Pick::Exhausted,
        }
    }

    /// Draws an unseen video, applying the configured exhaustion policy.
    pub fn next(&mut self) -> Pick {
        let Some(session) = self.session.as_mut() else {
            return Pick::Exhausted;
        };
        let rounds = session.progress().rounds_completed;
        let pick = session.pick_with_policy(&mut self.rng, self.config.exhaustion);
        if session.progress().rounds_completed != rounds {
            self.recent_videos.clear();
        }
        pick
    }

    /// Records an actual playback: the video becomes shown and moves to the
    /// front of the recent list. Paths outside the current library are
    /// ignored.
    pub fn record_played(&mut self, path: &Path) {
        let Some(session) = self.session.as_mut() else {
            debug!(path = %path.display(), "no session, playback not recorded");
            return;
        };
        if session.get(path).is_none() {
            warn!(path = %path.display(), "played video is not in the library, not recorded");
            return;
        }
        session.mark_shown(path);
        self.recent_videos.push_front(path.to_path_buf());
    }

    pub fn play(&mut self, player: &dyn Player, path: &Path) -> Result<()> {
        player.play(path)?;
        self.record_played(path);
        Ok(())
    }

    pub fn reset_session(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.reset();
        }
        if let Some(restored) = self.restored.as_mut() {
            restored.shown.clear();
        }
        self.recent_videos.clear();
    }

    pub fn progress(&self) -> SessionProgress {
        self.session
            .as_ref()
            .map(ScanSession::progress)
            .unwrap_or_default()
    }

    pub fn recent_videos(&self) -> impl Iterator<Item = &Path> {
        self.recent_videos.iter().map(PathBuf::as_path)
    }

    pub fn recent_roots(&self) -> impl Iterator<Item = &Path> {
        self.recent_roots.iter().map(PathBuf::as_path)
    }

    pub fn snapshot(&self) -> PersistedState {
        let to_string = |p: &Path| p.to_string_lossy().into_owned();
        let shown: Vec<String> = match (&self.session, &self.restored) {
            (Some(session), _) => session.shown_paths().map(to_string).collect(),
            (None, Some(restored)) => restored.shown.iter().map(|p| to_string(p)).collect(),
            (None, None) => Vec::new(),
        };
        PersistedState {
            version: STATE_VERSION,
            root: self.root().map(to_string),
            recent_roots: self.recent_roots.iter().map(|p| to_string(p)).collect(),
            shown,
            recent_videos: self.recent_videos.iter().map(|p| to_string(p)).collect(),
        }
    }

    /// Persists the current state. Failures are logged and reported as
    /// `false`; the in-memory session is unaffected.
    pub fn save_state(&self) -> bool {
        if self.root().is_none() {
            debug!("no folder chosen yet, nothing to save");
            return false;
        }
        match self.store.save(&self.snapshot()) {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, "failed to save state");
                false
            }
        }
    }

    /// Loads and validates saved state. Returns the saved root, if it is
    /// still a valid directory; the shown set is applied once that root is
    /// scanned.
    pub fn load_state(&mut self) -> Option<PathBuf> {
        let restored = self.store.load();

        self.recent_roots.clear();
        for root in &restored.recent_roots {
            self.recent_roots.push_back_if_room(root.clone());
        }
        if let Some(root) = &restored.root {
            self.recent_roots.push_front(root.clone());
        }
        self.recent_videos.clear();
        for video in &restored.recent_videos {
            self.recent_videos.push_back_if_room(video.clone());
        }

        let root = restored.root.clone();
        match self.session.as_mut() {
            Some(session) if Some(session.root()) == root.as_deref() => {
                session.restore_shown(restored.shown.iter().map(PathBuf::as_path));
            }
            _ => self.restored = Some(restored),
        }
        root
    }

    /// Deletes the state file. Failures are logged, never returned.
    pub fn clear_saved_state(&self) -> bool {
        match self.store.clear() {
            Ok(removed) => removed,
            Err(err) => {
                error!(error = %err, "failed to clear saved state");
                false
            }
        }
    }
}
