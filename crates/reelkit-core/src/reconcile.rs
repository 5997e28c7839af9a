//! Quality and track reconciliation
//!
//! Pure planning: which source to attach on load, and whether a quality or
//! audio change can be served by the live adapter or needs a new one.

use crate::classify::classify;
use crate::error::{Error, Result};
use crate::options::PlayerOptions;
use crate::state::{normalize_qualities, PlaybackState};
use crate::types::{BackendKind, Source};

/// What a quality change request needs
#[derive(Debug, Clone, PartialEq)]
pub enum QualityPlan {
    /// Already selected
    Unchanged,
    /// Label is not offered
    Unknown,
    /// The live adapter switches levels itself
    InPlace,
    /// Tear down and attach against this source
    Recreate(Source),
}

/// Decide how to serve a switch to `label`.
///
/// `backend_levels` are the labels the live adapter can switch between
/// internally. They are only honored for a single-source list.
pub fn plan_quality_change(
    state: &PlaybackState,
    sources: &[Source],
    manual_abr: bool,
    backend_levels: &[String],
    label: &str,
) -> QualityPlan {
    if !state.qualities.iter().any(|q| q == label) {
        return QualityPlan::Unknown;
    }
    if state.current_quality.as_deref() == Some(label) {
        return QualityPlan::Unchanged;
    }
    if !manual_abr && backend_levels.iter().any(|l| l == label) {
        return QualityPlan::InPlace;
    }
    match source_for_label(sources, label) {
        Some(source) => QualityPlan::Recreate(source.clone()),
        None => QualityPlan::Unknown,
    }
}

/// Audio changes never recreate an adapter, so this only says whether the
/// live backend can do it at all.
pub fn audio_switch_supported(kind: BackendKind) -> bool {
    kind == BackendKind::Hls
}

/// Position and intent to restore once a recreated adapter is ready
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResumePoint {
    pub position: f64,
    pub paused: bool,
}

/// Capture the resume point for a recreate.
///
/// A switch already in flight keeps its original point: the half-attached
/// adapter has no meaningful position of its own.
pub fn capture_resume(pending: Option<ResumePoint>, position: f64, paused: bool) -> ResumePoint {
    pending.unwrap_or(ResumePoint { position, paused })
}

/// Outcome of planning a fresh source list
#[derive(Debug, Clone, PartialEq)]
pub struct InitialSelection {
    pub source: Source,
    pub kind: BackendKind,
    /// More than one source: switching recreates the adapter
    pub manual_abr: bool,
    /// Labels to publish now. `None` leaves the list to the backend.
    pub qualities: Option<Vec<String>>,
    pub current_quality: Option<String>,
}

/// Reject lists the player cannot reconcile
pub fn validate_sources(sources: &[Source]) -> Result<()> {
    if sources.is_empty() {
        return Err(Error::NoSources);
    }
    let embedded = sources
        .iter()
        .filter(|s| classify(s).is_embedded())
        .count();
    if embedded > 0 && sources.len() > 1 {
        return Err(Error::MixedSources);
    }
    Ok(())
}

/// Pick the source to attach first and the qualities to publish.
///
/// Labels of a multi-source list (or of a non-HLS source) form the manual
/// quality list, defaulting to the preference or else the highest. A single
/// HLS source leaves the list to the manifest.
pub fn select_initial(sources: &[Source], options: &PlayerOptions) -> Result<InitialSelection> {
    validate_sources(sources)?;

    let manual_abr = sources.len() > 1;
    let first = classify(&sources[0]);

    let (qualities, current_quality) = if manual_abr || first != BackendKind::Hls {
        let labels = normalize_qualities(sources.iter().filter_map(|s| s.label.clone()));
        let chosen = options
            .preferred_quality(&labels)
            .or_else(|| labels.first().cloned());
        (Some(labels), chosen)
    } else {
        (None, None)
    };

    let source = current_quality
        .as_deref()
        .and_then(|label| source_for_label(sources, label))
        .unwrap_or(&sources[0])
        .clone();
    let kind = classify(&source);

    Ok(InitialSelection {
        source,
        kind,
        manual_abr,
        qualities,
        current_quality,
    })
}

fn source_for_label<'a>(sources: &'a [Source], label: &str) -> Option<&'a Source> {
    sources
        .iter()
        .find(|s| s.label.as_deref() == Some(label))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ladder() -> Vec<Source> {
        vec![
            Source::new("a_480.mp4").with_label("480p"),
            Source::new("a_1080.mp4").with_label("1080p"),
            Source::new("a_720.mp4").with_label("720p"),
            Source::new("a_720_dup.mp4").with_label("720p"),
        ]
    }

    fn state_with(qualities: &[&str], current: Option<&str>) -> PlaybackState {
        PlaybackState {
            qualities: qualities.iter().map(|q| q.to_string()).collect(),
            current_quality: current.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_manual_ladder_defaults_to_highest() {
        let selection = select_initial(&ladder(), &PlayerOptions::default()).unwrap();
        assert!(selection.manual_abr);
        assert_eq!(
            selection.qualities.unwrap(),
            vec!["1080p", "720p", "480p"]
        );
        assert_eq!(selection.current_quality.as_deref(), Some("1080p"));
        assert_eq!(selection.source.file, "a_1080.mp4");
        assert_eq!(selection.kind, BackendKind::Native);
    }

    #[test]
    fn test_preferred_quality_picks_source() {
        let options = PlayerOptions::default().with_prefer_quality(|_| Some("720p".into()));
        let selection = select_initial(&ladder(), &options).unwrap();
        assert_eq!(selection.current_quality.as_deref(), Some("720p"));
        assert_eq!(selection.source.file, "a_720.mp4");
    }

    #[test]
    fn test_single_hls_leaves_list_to_manifest() {
        let sources = vec![Source::new("https://cdn.test/master.m3u8")];
        let selection = select_initial(&sources, &PlayerOptions::default()).unwrap();
        assert!(!selection.manual_abr);
        assert_eq!(selection.qualities, None);
        assert_eq!(selection.kind, BackendKind::Hls);
    }

    #[test]
    fn test_rejects_mixed_embedded_lists() {
        assert!(matches!(validate_sources(&[]), Err(Error::NoSources)));
        let mixed = vec![
            Source::new("bTqVqk7FSmY"),
            Source::new("video.mp4").with_label("720p"),
        ];
        assert!(matches!(validate_sources(&mixed), Err(Error::MixedSources)));
        assert!(validate_sources(&[Source::new("https://vimeo.com/76979871")]).is_ok());
    }

    #[test]
    fn test_plan_quality_change() {
        let sources = ladder();
        let state = state_with(&["1080p", "720p", "480p"], Some("1080p"));

        assert_eq!(
            plan_quality_change(&state, &sources, true, &[], "1080p"),
            QualityPlan::Unchanged
        );
        assert_eq!(
            plan_quality_change(&state, &sources, true, &[], "240p"),
            QualityPlan::Unknown
        );
        assert_eq!(
            plan_quality_change(&state, &sources, true, &[], "720p"),
            QualityPlan::Recreate(sources[2].clone())
        );
    }

    #[test]
    fn test_single_source_levels_switch_in_place() {
        let sources = vec![Source::new("https://cdn.test/master.m3u8")];
        let state = state_with(&["1080p", "720p"], Some("1080p"));
        let levels = vec!["1080p".to_string(), "720p".to_string()];
        assert_eq!(
            plan_quality_change(&state, &sources, false, &levels, "720p"),
            QualityPlan::InPlace
        );
    }

    #[test]
    fn test_levels_without_live_backend_never_switch_in_place() {
        let sources = vec![Source::new("https://cdn.test/master.m3u8")];
        let state = state_with(&["1080p", "720p"], Some("1080p"));
        assert_eq!(
            plan_quality_change(&state, &sources, false, &[], "720p"),
            QualityPlan::Unknown
        );
    }

    #[test]
    fn test_capture_resume_keeps_pending_point() {
        let first = capture_resume(None, 42.0, false);
        let second = capture_resume(Some(first), 0.0, true);
        assert_eq!(second, first);
        assert!(audio_switch_supported(BackendKind::Hls));
        assert!(!audio_switch_supported(BackendKind::Dash));
    }
}
