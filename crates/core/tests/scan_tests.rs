use std::collections::HashSet;
use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use reelpick_core::error::InvalidRootReason;
use reelpick_core::scan::{
    scan_videos, scan_videos_with_progress, spawn_scan, ScanCancelToken, ScanConfig, ScanEvent,
};
use reelpick_core::{Error, ExhaustionPolicy, Pick};
use tempfile::tempdir;

fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, b"fake video bytes").unwrap();
}

fn names(outcome: &reelpick_core::scan::ScanOutcome) -> Vec<String> {
    outcome.entries.iter().map(|e| e.file_name()).collect()
}

#[test]
fn test_only_supported_extensions_are_discovered() {
    let dir = tempdir().unwrap();
    touch(&dir.path().join("a.mp4"));
    touch(&dir.path().join("b.MKV"));
    touch(&dir.path().join("notes.txt"));
    touch(&dir.path().join("cover.jpg"));
    touch(&dir.path().join("nested/deeper/c.webm"));
    touch(&dir.path().join("nested/d.avi.part"));

    let outcome = scan_videos(&ScanConfig::for_folder(dir.path())).unwrap();
    let found: HashSet<String> = names(&outcome).into_iter().collect();
    assert_eq!(
        found,
        ["a.mp4", "b.MKV", "c.webm"]
            .iter()
            .map(|s| s.to_string())
            .collect::<HashSet<_>>()
    );
    assert_eq!(outcome.stats.videos_found, 3);
    assert_eq!(outcome.stats.files_seen, 6);
    for entry in &outcome.entries {
        assert!(entry.path.starts_with(&outcome.root));
        assert_eq!(entry.size_bytes, 16);
    }
}

#[test]
fn test_non_recursive_scan_stays_at_top_level() {
    let dir = tempdir().unwrap();
    touch(&dir.path().join("top.mov"));
    touch(&dir.path().join("sub/inner.mov"));

    let config = ScanConfig {
        root: dir.path().to_path_buf(),
        recursive: false,
    };
    let outcome = scan_videos(&config).unwrap();
    assert_eq!(names(&outcome), vec!["top.mov".to_string()]);
}

#[test]
fn test_rescan_of_unchanged_tree_is_stable() {
    let dir = tempdir().unwrap();
    for name in ["z.mp4", "a.mp4", "m/k.flv", "m/b.wmv"] {
        touch(&dir.path().join(name));
    }
    let first = scan_videos(&ScanConfig::for_folder(dir.path())).unwrap();
    let second = scan_videos(&ScanConfig::for_folder(dir.path())).unwrap();
    assert_eq!(first.entries, second.entries);
    assert_eq!(first.root, second.root);
}

#[test]
fn test_empty_root_is_exhausted_under_any_policy() {
    let dir = tempdir().unwrap();
    touch(&dir.path().join("readme.md"));

    let mut session = scan_videos(&ScanConfig::for_folder(dir.path()))
        .unwrap()
        .into_session();
    let mut rng = StdRng::seed_from_u64(1);
    assert!(session.is_empty());
    assert_eq!(session.pick_random_unseen(&mut rng), Pick::Exhausted);
    assert_eq!(
        session.pick_with_policy(&mut rng, ExhaustionPolicy::AutoReset),
        Pick::Exhausted
    );
    assert_eq!(session.progress().rounds_completed, 0);
}

#[test]
fn test_invalid_roots_are_reported_before_walking() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("gone");
    match spawn_scan(ScanConfig::for_folder(&missing)) {
        Err(Error::InvalidRoot { reason, .. }) => assert_eq!(reason, InvalidRootReason::NotFound),
        other => panic!("expected NotFound, got {:?}", other.map(|h| h.root().to_path_buf())),
    }

    let file = dir.path().join("clip.mp4");
    touch(&file);
    match scan_videos(&ScanConfig::for_folder(&file)) {
        Err(Error::InvalidRoot { reason, .. }) => {
            assert_eq!(reason, InvalidRootReason::NotADirectory)
        }
        other => panic!("expected NotADirectory, got {other:?}"),
    }
}

#[test]
fn test_background_scan_reports_progress_then_outcome() {
    let dir = tempdir().unwrap();
    for n in 0..5 {
        touch(&dir.path().join(format!("season/{n}.mp4")));
    }

    let handle = spawn_scan(ScanConfig::for_folder(dir.path())).unwrap();
    assert_eq!(handle.root(), fs::canonicalize(dir.path()).unwrap());

    let mut last_found = 0;
    let outcome = handle
        .wait_with_progress(|progress| {
            assert!(progress.videos_found >= last_found);
            last_found = progress.videos_found;
        })
        .unwrap();
    assert_eq!(last_found, 5);
    assert_eq!(outcome.entries.len(), 5);
}

#[test]
fn test_polling_until_finished() {
    let dir = tempdir().unwrap();
    touch(&dir.path().join("one.mkv"));

    let handle = spawn_scan(ScanConfig::for_folder(dir.path())).unwrap();
    let outcome = loop {
        match handle.try_next() {
            Some(ScanEvent::Finished(result)) => break result.unwrap(),
            Some(ScanEvent::Progress(_)) => {}
            None => std::thread::sleep(std::time::Duration::from_millis(5)),
        }
    };
    assert_eq!(names(&outcome), vec!["one.mkv".to_string()]);
}

#[cfg(unix)]
#[test]
fn test_symlinked_directories_are_not_followed() {
    let outer = tempdir().unwrap();
    let library = outer.path().join("library");
    let elsewhere = outer.path().join("elsewhere");
    touch(&library.join("inside.mp4"));
    touch(&elsewhere.join("outside.mp4"));
    std::os::unix::fs::symlink(&elsewhere, library.join("link")).unwrap();

    let outcome = scan_videos(&ScanConfig::for_folder(&library)).unwrap();
    assert_eq!(names(&outcome), vec!["inside.mp4".to_string()]);
}

#[test]
fn test_cancelled_scan_returns_no_outcome() {
    let dir = tempdir().unwrap();
    touch(&dir.path().join("a.mp4"));

    let cancel = ScanCancelToken::new();
    cancel.cancel();
    let result = scan_videos_with_progress(&ScanConfig::for_folder(dir.path()), Some(&cancel), |_| {});
    assert!(matches!(result, Err(Error::Cancelled)));
}
