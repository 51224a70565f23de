//! Asset selection and artifact naming.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::item::{Asset, SourceItem};

/// Preferred asset kinds, best first. Gallery views win over speaker views.
pub const ASSET_PREFERENCE: &[&str] = &[
    "shared_screen_with_gallery_view",
    "gallery_view",
    "active_speaker",
    "shared_screen_with_speaker_view",
];

/// Kinds that never carry a usable video.
const NON_VIDEO_KINDS: &[&str] = &[
    "audio_only",
    "timeline",
    "audio_transcript",
    "chat_file",
    "closed_caption",
];

const MAX_NAME_LEN: usize = 200;

/// Whether an asset is a video (not audio, transcript, chat, ...).
pub fn is_video_asset(asset: &Asset) -> bool {
    let kind = asset.kind.to_lowercase();
    !NON_VIDEO_KINDS.contains(&kind.as_str())
}

/// Pick the best asset according to [`ASSET_PREFERENCE`].
pub fn select_best_asset(assets: &[Asset]) -> Option<&Asset> {
    ASSET_PREFERENCE.iter().find_map(|preferred| {
        assets
            .iter()
            .filter(|a| is_video_asset(a))
            .find(|a| a.kind.eq_ignore_ascii_case(preferred))
    })
}

/// Recording length: the reported duration in minutes when positive,
/// otherwise the span of the asset's own timestamps.
pub fn recording_duration_secs(duration_minutes: Option<i64>, asset: Option<&Asset>) -> Option<u64> {
    if let Some(minutes) = duration_minutes.filter(|m| *m > 0) {
        return Some(minutes as u64 * 60);
    }

    let asset = asset?;
    let (start, end) = (asset.recording_start?, asset.recording_end?);
    u64::try_from((end - start).num_seconds()).ok()
}

/// Replace characters that are invalid in file names and bound the length.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    replaced
        .trim_matches(|c| c == ' ' || c == '.')
        .chars()
        .take(MAX_NAME_LEN)
        .collect()
}

/// Human-facing name, `YYYY-MM-DD HH-MM - title`, safe for the file system.
///
/// Also used as the publish title.
pub fn display_name(title: &str, created_at: Option<DateTime<Utc>>) -> String {
    let title = if title.trim().is_empty() {
        "Untitled Meeting"
    } else {
        title
    };

    let name = match created_at {
        Some(at) => format!("{} - {}", at.format("%Y-%m-%d %H-%M"), title),
        None => title.to_string(),
    };

    sanitize_filename(&name)
}

/// Where the downloaded artifact for `item` lives.
pub fn artifact_path(download_dir: &Path, item: &SourceItem, asset: &Asset) -> PathBuf {
    let extension = if asset.file_extension.is_empty() {
        "mp4".to_string()
    } else {
        asset.file_extension.to_lowercase()
    };

    download_dir
        .join(display_name(&item.title, item.created_at))
        .join(format!("{}.{}", sanitize_filename(&asset.kind), extension))
}
