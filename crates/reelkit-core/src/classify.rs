//! Source classification
//!
//! Maps a [`Source`] onto the backend family that plays it and extracts the
//! embed id for YouTube and Vimeo sources.

use crate::types::{BackendKind, Source};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static YOUTUBE_BARE_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").ok());

static YOUTUBE_URL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/)([A-Za-z0-9_-]{11})",
        r"youtube\.com/.*[?&]v=([A-Za-z0-9_-]{11})",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

static VIMEO_BARE_ID: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^\d+$").ok());

static VIMEO_URL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"vimeo\.com/(\d+)", r"player\.vimeo\.com/video/(\d+)"]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
});

/// Result of classifying a source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub kind: BackendKind,
    /// Embed id for YouTube and Vimeo, `None` when the input matches no accepted shape
    pub id: Option<String>,
}

/// Decide which backend plays `source`.
///
/// An explicit type wins, then manifest markers, then embed shapes.
/// Anything else is a native file.
pub fn classify(source: &Source) -> BackendKind {
    match source.kind {
        Some(kind) => kind,
        None => classify_file(&source.file),
    }
}

/// Classify a bare file string
pub fn classify_file(file: &str) -> BackendKind {
    if file.contains("m3u8") {
        BackendKind::Hls
    } else if file.contains("mpd") {
        BackendKind::Dash
    } else if is_youtube_like(file) {
        BackendKind::YouTube
    } else if is_vimeo_like(file) {
        BackendKind::Vimeo
    } else {
        BackendKind::Native
    }
}

/// Classify and extract the embed id in one pass
pub fn inspect(source: &Source) -> Classification {
    let kind = classify(source);
    let id = match kind {
        BackendKind::YouTube => youtube_id(&source.file),
        BackendKind::Vimeo => vimeo_id(&source.file),
        _ => None,
    };
    Classification { kind, id }
}

/// Embed id for `kind`, `None` for non-embedded kinds or unrecognized input
pub fn embed_id(kind: BackendKind, input: &str) -> Option<String> {
    match kind {
        BackendKind::YouTube => youtube_id(input),
        BackendKind::Vimeo => vimeo_id(input),
        _ => None,
    }
}

/// Extract a YouTube video id from a bare id or a watch/short/embed URL
pub fn youtube_id(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if YOUTUBE_BARE_ID
        .as_ref()
        .is_some_and(|re| re.is_match(input))
    {
        return Some(input.to_string());
    }
    first_capture(&YOUTUBE_URL, input)
}

/// Extract a Vimeo video id from a bare numeric id or a vimeo.com URL
pub fn vimeo_id(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if VIMEO_BARE_ID.as_ref().is_some_and(|re| re.is_match(input)) {
        return Some(input.to_string());
    }
    first_capture(&VIMEO_URL, input)
}

fn first_capture(patterns: &[Regex], input: &str) -> Option<String> {
    patterns
        .iter()
        .find_map(|re| re.captures(input))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn is_youtube_like(file: &str) -> bool {
    file.contains("youtube.com")
        || file.contains("youtu.be")
        || YOUTUBE_BARE_ID.as_ref().is_some_and(|re| re.is_match(file))
}

fn is_vimeo_like(file: &str) -> bool {
    file.contains("vimeo.com") || VIMEO_BARE_ID.as_ref().is_some_and(|re| re.is_match(file))
}
