use std::time::{Duration, SystemTime};

use reelpick_core::{Preview, SessionProgress};

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

pub fn format_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// `HH:MM:SS` for videos of an hour or more, `MM:SS` otherwise.
pub fn format_duration(duration: Option<Duration>) -> String {
    let Some(duration) = duration else {
        return "Unknown".to_string();
    };
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

pub fn format_age(modified: Option<SystemTime>, now: SystemTime) -> String {
    let Some(age) = modified.and_then(|m| now.duration_since(m).ok()) else {
        return "Unknown".to_string();
    };
    let secs = age.as_secs();
    let (count, unit) = match secs {
        0..=59 => return "just now".to_string(),
        60..=3599 => (secs / 60, "minute"),
        3600..=86_399 => (secs / 3600, "hour"),
        _ => (secs / 86_400, "day"),
    };
    let plural = if count == 1 { "" } else { "s" };
    format!("{count} {unit}{plural} ago")
}

pub fn format_progress(progress: &SessionProgress) -> String {
    format!(
        "{}/{} shown ({:.0}%), round {}",
        progress.shown,
        progress.total,
        progress.percentage(),
        progress.rounds_completed + 1
    )
}

pub fn print_preview(preview: &Preview) {
    let md = &preview.metadata;
    println!(
        "  size: {}  modified: {}",
        format_size(preview.size_bytes),
        format_age(preview.modified_at, SystemTime::now())
    );
    let resolution = md
        .resolution()
        .map(|(w, h)| format!("{w}x{h}"))
        .unwrap_or_else(|| "Unknown".to_string());
    println!(
        "  duration: {}  resolution: {}  codec: {}",
        format_duration(md.duration),
        resolution,
        md.codec.as_deref().unwrap_or("Unknown")
    );
    match (&preview.thumbnail, preview.thumbnail_failure) {
        (Some(thumb), _) => println!(
            "  thumbnail: {}x{} ({})",
            thumb.width,
            thumb.height,
            format_size(thumb.bytes.len() as u64)
        ),
        (None, Some(reason)) => println!("  thumbnail: unavailable ({reason})"),
        (None, None) => println!("  thumbnail: unavailable"),
    }
}
