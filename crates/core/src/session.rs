use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::{debug, info};

use crate::models::{ExhaustionPolicy, Pick, SessionProgress, VideoEntry};

/// Bounded most-recent-first list. Pushing an item already present moves it
/// to the front instead of duplicating it.
#[derive(Debug, Clone)]
pub struct RecentList<T> {
    items: VecDeque<T>,
    cap: usize,
}

impl<T: PartialEq> RecentList<T> {
    pub fn new(cap: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push_front(&mut self, item: T) {
        if let Some(pos) = self.items.iter().position(|existing| *existing == item) {
            self.items.remove(pos);
        }
        self.items.push_front(item);
        self.items.truncate(self.cap);
    }

    /// Appends at the back (oldest end) unless present or full. Used when
    /// rebuilding a list that is already ordered newest first.
    pub fn push_back_if_room(&mut self, item: T) {
        if self.items.len() < self.cap && !self.items.contains(&item) {
            self.items.push_back(item);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn first(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn retain<F: FnMut(&T) -> bool>(&mut self, f: F) {
        self.items.retain(f);
    }
}

const NOT_POOLED: usize = usize::MAX;

/// Discovered entries of one root plus the shown/unseen split.
///
/// The unseen pool is a vector of entry indices; `pool_pos` maps each entry
/// to its position in that vector (or `NOT_POOLED` once shown), so both a
/// random draw and removal of a specific path are O(1) swap-removes.
#[derive(Debug, Clone)]
pub struct ScanSession {
    root: PathBuf,
    entries: Vec<VideoEntry>,
    index: HashMap<PathBuf, usize>,
    unseen: Vec<usize>,
    pool_pos: Vec<usize>,
    rounds_completed: u32,
}

impl ScanSession {
    pub fn new(root: PathBuf, entries: Vec<VideoEntry>) -> Self {
        let mut index = HashMap::with_capacity(entries.len());
        let mut unique = Vec::with_capacity(entries.len());
        for entry in entries {
            if index.contains_key(&entry.path) {
                continue;
            }
            index.insert(entry.path.clone(), unique.len());
            unique.push(entry);
        }

        let mut session = Self {
            root,
            entries: unique,
            index,
            unseen: Vec::new(),
            pool_pos: Vec::new(),
            rounds_completed: 0,
        };
        session.refill_pool();
        session
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All entries in discovery order.
    pub fn entries(&self) -> &[VideoEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<&VideoEntry> {
        self.index.get(path).map(|&idx| &self.entries[idx])
    }

    pub fn is_shown(&self, path: &Path) -> bool {
        self.index
            .get(path)
            .is_some_and(|&idx| self.pool_pos[idx] == NOT_POOLED)
    }

    pub fn shown_paths(&self) -> impl Iterator<Item = &Path> {
        self.entries
            .iter()
            .zip(self.pool_pos.iter())
            .filter(|&(_, &pos)| pos == NOT_POOLED)
            .map(|(entry, _)| entry.path.as_path())
    }

    pub fn unseen_len(&self) -> usize {
        self.unseen.len()
    }

    pub fn progress(&self) -> SessionProgress {
        SessionProgress {
            shown: self.entries.len() - self.unseen.len(),
            total: self.entries.len(),
            rounds_completed: self.rounds_completed,
        }
    }

    /// Draws uniformly among unseen entries and marks the choice shown.
    pub fn pick_random_unseen<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Pick {
        if self.unseen.is_empty() {
            return Pick::Exhausted;
        }
        let pos = rng.gen_range(0..self.unseen.len());
        let idx = self.take_from_pool(pos);
        Pick::Video(self.entries[idx].clone())
    }

    /// Like [`pick_random_unseen`](Self::pick_random_unseen), applying
    /// `policy` when the pool is empty. An empty library stays exhausted
    /// under either policy.
    pub fn pick_with_policy<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        policy: ExhaustionPolicy,
    ) -> Pick {
        match self.pick_random_unseen(rng) {
            Pick::Exhausted if policy == ExhaustionPolicy::AutoReset && !self.is_empty() => {
                self.rounds_completed += 1;
                info!(
                    root = %self.root.display(),
                    total = self.entries.len(),
                    "all videos shown, starting a new round"
                );
                self.refill_pool();
                self.pick_random_unseen(rng)
            }
            pick => pick,
        }
    }

    /// Marks a known path shown. Returns false for unknown or already shown
    /// paths.
    pub fn mark_shown(&mut self, path: &Path) -> bool {
        let Some(&idx) = self.index.get(path) else {
            return false;
        };
        let pos = self.pool_pos[idx];
        if pos == NOT_POOLED {
            return false;
        }
        self.take_from_pool(pos);
        true
    }

    /// Re-applies a shown set from an earlier run. Paths not discovered by
    /// this scan are ignored, which keeps shown a subset of entries.
    pub fn restore_shown<'a, I>(&mut self, paths: I) -> usize
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let mut admitted = 0;
        let mut ignored = 0;
        for path in paths {
            if self.mark_shown(path) {
                admitted += 1;
            } else if !self.is_shown(path) {
                ignored += 1;
            }
        }
        if ignored > 0 {
            debug!(ignored, "restored shown paths not present in this scan");
        }
        admitted
    }

    /// Makes every entry unseen again.
    pub fn reset(&mut self) {
        self.rounds_completed = 0;
        self.refill_pool();
    }

    fn refill_pool(&mut self) {
        self.unseen = (0..self.entries.len()).collect();
        self.pool_pos = (0..self.entries.len()).collect();
    }

    fn take_from_pool(&mut self, pos: usize) -> usize {
        let idx = self.unseen.swap_remove(pos);
        if let Some(&moved) = self.unseen.get(pos) {
            self.pool_pos[moved] = pos;
        }
        self.pool_pos[idx] = NOT_POOLED;
        idx
    }
}
