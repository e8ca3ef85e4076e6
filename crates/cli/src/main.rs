mod display;
mod logging;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use reelpick_core::config::{PickerConfig, PreviewConfig, THUMBNAIL_MAX_AGE};
use reelpick_core::location::StateLocation;
use reelpick_core::picker::Picker;
use reelpick_core::player::SystemPlayer;
use reelpick_core::preview::{
    PreviewEvent, PreviewHandle, PreviewOutcome, PreviewService, PreviewSlot,
};
use reelpick_core::scan::ScanConfig;
use reelpick_core::state::{restore, StateStore};
use reelpick_core::video::{sweep_stale_thumbnails, FfmpegTool};
use reelpick_core::{Error, ExhaustionPolicy, Pick, VideoEntry};
use tracing::{info, warn};

use crate::display::{format_progress, print_preview};

fn main() {
    let guard = logging::init_logger();
    let code = match real_main() {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {err}");
            2
        }
    };
    drop(guard);
    std::process::exit(code);
}

fn real_main() -> reelpick_core::Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(cmd) = args.next() else {
        print_help();
        return Ok(());
    };

    match cmd.as_str() {
        "--help" | "-h" | "help" => {
            print_help();
            Ok(())
        }
        "scan" => cmd_scan(parse_options(args)?),
        "pick" => cmd_pick(parse_options(args)?),
        "shuffle" => cmd_shuffle(parse_options(args)?),
        "state" => cmd_state(parse_options(args)?),
        "clear-state" => cmd_clear_state(parse_options(args)?),
        _ => Err(Error::InvalidArgument(format!("unknown command: {cmd}"))),
    }
}

struct Options {
    root: Option<PathBuf>,
    state_file: Option<PathBuf>,
    recursive: bool,
    policy: ExhaustionPolicy,
    count: usize,
    play: bool,
    preview: bool,
    persist: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            root: None,
            state_file: None,
            recursive: true,
            policy: ExhaustionPolicy::AutoReset,
            count: 1,
            play: false,
            preview: false,
            persist: true,
        }
    }
}

fn parse_options(mut args: impl Iterator<Item = String>) -> reelpick_core::Result<Options> {
    let mut opts = Options::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--root" => opts.root = Some(required_value(&arg, args.next())?.into()),
            "--state" => opts.state_file = Some(required_value(&arg, args.next())?.into()),
            "--flat" => opts.recursive = false,
            "--count" => {
                let raw = required_value(&arg, args.next())?;
                opts.count = match raw.parse::<usize>() {
                    Ok(n) if n > 0 => n,
                    _ => {
                        return Err(Error::InvalidArgument(format!(
                            "--count expects a positive number, got {raw}"
                        )))
                    }
                };
            }
            "--when-exhausted" => {
                opts.policy = match required_value(&arg, args.next())?.as_str() {
                    "reset" => ExhaustionPolicy::AutoReset,
                    "stop" => ExhaustionPolicy::Stop,
                    other => {
                        return Err(Error::InvalidArgument(format!(
                            "--when-exhausted expects reset|stop, got {other}"
                        )))
                    }
                };
            }
            "--play" => opts.play = true,
            "--preview" => opts.preview = true,
            "--no-persist" => opts.persist = false,
            _ => {
                return Err(Error::InvalidArgument(format!("unknown arg: {arg}")));
            }
        }
    }
    Ok(opts)
}

fn required_value(flag: &str, value: Option<String>) -> reelpick_core::Result<String> {
    value.ok_or_else(|| Error::InvalidArgument(format!("missing value for {flag}")))
}

fn state_location(opts: &Options) -> reelpick_core::Result<StateLocation> {
    let location = match &opts.state_file {
        Some(path) => StateLocation::at(path),
        None => StateLocation::for_current_exe()?,
    };
    info!(path = %location.state_file.display(), mode = ?location.mode, "state file");
    Ok(location)
}

/// Builds a picker, restores saved state and scans the chosen root.
fn open_session(opts: &Options) -> reelpick_core::Result<Picker> {
    let store = StateStore::new(state_location(opts)?);
    let mut picker = Picker::new(PickerConfig::new(opts.policy), store);

    let saved_root = if opts.persist {
        picker.load_state()
    } else {
        None
    };
    let root = opts.root.clone().or(saved_root).ok_or_else(|| {
        Error::InvalidArgument("missing --root <path> and no saved folder".to_string())
    })?;

    let handle = picker.start_scan(ScanConfig {
        root,
        recursive: opts.recursive,
    })?;
    eprintln!("scanning {} ...", handle.root().display());
    let mut updates = 0u64;
    let outcome = handle.wait_with_progress(|progress| {
        updates += 1;
        if updates % 200 == 0 {
            eprintln!(
                "  {} files, {} videos so far",
                progress.files_seen, progress.videos_found
            );
        }
    })?;
    if outcome.stats.entries_skipped > 0 {
        warn!(
            skipped = outcome.stats.entries_skipped,
            "some entries could not be read"
        );
    }

    let session = picker.install(outcome);
    println!(
        "{} videos in {}",
        session.len(),
        session.root().display()
    );
    Ok(picker)
}

fn save(picker: &Picker, opts: &Options) {
    if opts.persist && !picker.save_state() {
        eprintln!("warning: progress could not be saved");
    }
}

struct Previewer {
    service: PreviewService,
    events: Receiver<PreviewEvent>,
    slot: PreviewSlot,
    wait: Duration,
}

impl Previewer {
    fn new() -> Self {
        let tool = FfmpegTool::new();
        let removed = sweep_stale_thumbnails(tool.temp_dir(), THUMBNAIL_MAX_AGE);
        if removed > 0 {
            info!(removed, "removed stale thumbnails");
        }
        let config = PreviewConfig::default();
        let wait = config.probe_timeout + config.thumbnail_timeout + Duration::from_secs(2);
        let (service, events) = PreviewService::new(Arc::new(tool), config);
        Self {
            service,
            events,
            slot: PreviewSlot::primary(),
            wait,
        }
    }

    fn show(&self, entry: &VideoEntry) {
        let request = match self.service.get_or_generate(&self.slot, &entry.path) {
            PreviewHandle::Ready { preview, .. } => {
                print_preview(&preview);
                return;
            }
            PreviewHandle::Rejected { reason, .. } => {
                println!("  preview unavailable: {reason}");
                return;
            }
            PreviewHandle::Pending { request, .. } => request,
        };

        loop {
            match self.events.recv_timeout(self.wait) {
                Ok(event) if event.request.id != request.id => continue,
                Ok(event) => {
                    if let PreviewOutcome::Failed { reason, .. } = &event.outcome {
                        println!("  preview unavailable: {reason}");
                    }
                    print_preview(event.outcome.preview());
                    return;
                }
                Err(_) => {
                    println!("  preview not ready");
                    return;
                }
            }
        }
    }
}

fn play(picker: &mut Picker, entry: &VideoEntry) {
    match picker.play(&SystemPlayer::default(), &entry.path) {
        Ok(()) => println!("  playing {}", entry.file_name()),
        Err(err) => eprintln!("  {err}"),
    }
}

fn cmd_scan(opts: Options) -> reelpick_core::Result<()> {
    let picker = open_session(&opts)?;
    println!("{}", format_progress(&picker.progress()));
    save(&picker, &opts);
    Ok(())
}

fn cmd_pick(opts: Options) -> reelpick_core::Result<()> {
    let mut picker = open_session(&opts)?;
    let previewer = opts.preview.then(Previewer::new);

    for _ in 0..opts.count {
        match picker.next() {
            Pick::Video(entry) => {
                println!("{}", entry.path.display());
                if let Some(previewer) = &previewer {
                    previewer.show(&entry);
                }
                if opts.play {
                    play(&mut picker, &entry);
                }
            }
            Pick::Exhausted => {
                println!("all videos have been shown");
                break;
            }
        }
    }

    println!("{}", format_progress(&picker.progress()));
    save(&picker, &opts);
    Ok(())
}

fn cmd_shuffle(opts: Options) -> reelpick_core::Result<()> {
    let mut picker = open_session(&opts)?;
    let previewer = opts.preview.then(Previewer::new);
    let mut current: Option<VideoEntry> = None;
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("[n]ext [p]lay [r]eset [h]istory [q]uit > ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else { break };
        match line?.trim() {
            "" | "n" | "next" | "s" | "skip" => match picker.next() {
                Pick::Video(entry) => {
                    println!("{}", entry.path.display());
                    if let Some(previewer) = &previewer {
                        previewer.show(&entry);
                    }
                    println!("  {}", format_progress(&picker.progress()));
                    current = Some(entry);
                }
                Pick::Exhausted => {
                    println!("all videos have been shown, use [r]eset to start over");
                    current = None;
                }
            },
            "p" | "play" => match &current {
                Some(entry) => {
                    play(&mut picker, entry);
                    save(&picker, &opts);
                }
                None => println!("nothing picked yet"),
            },
            "r" | "reset" => {
                picker.reset_session();
                current = None;
                println!("session reset: {}", format_progress(&picker.progress()));
                save(&picker, &opts);
            }
            "h" | "history" => {
                for (n, path) in picker.recent_videos().enumerate() {
                    println!("  {}. {}", n + 1, path.display());
                }
            }
            "q" | "quit" | "exit" => break,
            other => println!("unknown command: {other}"),
        }
    }

    save(&picker, &opts);
    Ok(())
}

fn cmd_state(opts: Options) -> reelpick_core::Result<()> {
    let location = state_location(&opts)?;
    let store = StateStore::new(location.clone());
    let report = match store.load_raw()? {
        Some(raw) => {
            let restored = restore(&raw);
            serde_json::json!({
                "path": location.state_file,
                "mode": format!("{:?}", location.mode),
                "valid_root": restored.root,
                "valid_shown": restored.shown.len(),
                "rejected": restored.rejected,
                "state": raw,
            })
        }
        None => serde_json::json!({
            "path": location.state_file,
            "mode": format!("{:?}", location.mode),
            "state": null,
        }),
    };
    let text = serde_json::to_string_pretty(&report)
        .map_err(|err| Error::InvalidArgument(format!("cannot render state: {err}")))?;
    println!("{text}");
    Ok(())
}

fn cmd_clear_state(opts: Options) -> reelpick_core::Result<()> {
    let store = StateStore::new(state_location(&opts)?);
    if store.clear()? {
        println!("removed {}", store.path().display());
    } else {
        println!("no saved state at {}", store.path().display());
    }
    Ok(())
}

fn print_help() {
    println!(
        r#"reelpick

USAGE:
  reelpick scan    [--root <path>] [--flat] [--state <file>] [--no-persist]
  reelpick pick    [--root <path>] [--count <n>] [--play] [--preview]
                   [--when-exhausted reset|stop] [--flat] [--state <file>] [--no-persist]
  reelpick shuffle [--root <path>] [--preview] [--when-exhausted reset|stop]
                   [--flat] [--state <file>] [--no-persist]
  reelpick state   [--state <file>]
  reelpick clear-state [--state <file>]

NOTES:
  - Without --root the folder from the last run is used.
  - Progress is saved to ~/.random_video_picker.json, or next to the binary
    when a .portable file exists there.
  - Previews need ffprobe and ffmpeg on PATH.
  - Logging: REELPICK_LOG=<filter> (default info), REELPICK_LOG_FILE=<path>.
"#
    );
}
