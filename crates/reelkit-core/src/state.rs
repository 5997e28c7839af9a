//! Playback state store
//!
//! [`PlaybackState`] is the single normalized view every consumer reads.
//! It only changes through [`StateDelta`] merges, which overwrite the keys
//! they name and nothing else.

use crate::error::Error;
use crate::types::{AudioTrack, SubtitleTrack};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

const DELTA_CHANNEL_CAPACITY: usize = 64;

/// Category of a surfaced error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateErrorKind {
    /// Unrecognized id or unusable source list
    InvalidSource,
    ScriptLoad,
    Backend,
    Embed,
}

/// Non-fatal error shown in place of playback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateError {
    pub kind: StateErrorKind,
    pub message: String,
}

impl StateError {
    pub fn new(kind: StateErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&Error> for StateError {
    fn from(err: &Error) -> Self {
        let kind = match err {
            Error::NoSources
            | Error::MixedSources
            | Error::InvalidId { .. }
            | Error::UnsupportedSource(_)
            | Error::InvalidConfig(_) => StateErrorKind::InvalidSource,
            Error::ScriptLoad { .. } | Error::ScriptTimeout { .. } | Error::Network(_) => {
                StateErrorKind::ScriptLoad
            }
            Error::Embed { .. } => StateErrorKind::Embed,
            _ => StateErrorKind::Backend,
        };
        StateError::new(kind, err.to_string())
    }
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Normalized, backend-agnostic playback state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub duration: f64,
    pub current_time: f64,
    pub paused: bool,
    pub buffering: bool,
    pub seeking: bool,
    pub ended: bool,
    /// Buffered fraction of the duration, 0 to 1
    pub buffered: f64,
    pub volume: f64,
    pub muted: bool,
    pub playback_rate: f64,
    pub error: Option<StateError>,
    /// Distinct labels, highest resolution first
    pub qualities: Vec<String>,
    pub current_quality: Option<String>,
    pub audios: Vec<AudioTrack>,
    pub current_audio: Option<String>,
    pub subtitles: Vec<SubtitleTrack>,
    pub current_subtitle: Option<String>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            duration: 0.0,
            current_time: 0.0,
            paused: true,
            buffering: false,
            seeking: false,
            ended: false,
            buffered: 0.0,
            volume: 1.0,
            muted: false,
            playback_rate: 1.0,
            error: None,
            qualities: Vec::new(),
            current_quality: None,
            audios: Vec::new(),
            current_audio: None,
            subtitles: Vec::new(),
            current_subtitle: None,
        }
    }
}

impl PlaybackState {
    /// Unset selections that are not members of their lists and clamp the
    /// fractions. Returns the corrections as a delta of the keys changed.
    fn enforce_invariants(&mut self) -> StateDelta {
        let mut corrections = StateDelta::default();

        if let Some(q) = &self.current_quality {
            if !self.qualities.iter().any(|l| l == q) {
                self.current_quality = None;
                corrections.current_quality = Some(None);
            }
        }
        if let Some(lang) = &self.current_audio {
            if !self.audios.iter().any(|t| &t.lang == lang) {
                self.current_audio = None;
                corrections.current_audio = Some(None);
            }
        }
        if let Some(lang) = &self.current_subtitle {
            if !self.subtitles.iter().any(|t| &t.lang == lang) {
                self.current_subtitle = None;
                corrections.current_subtitle = Some(None);
            }
        }

        let volume = self.volume.clamp(0.0, 1.0);
        if volume != self.volume {
            self.volume = volume;
            corrections.volume = Some(volume);
        }
        let buffered = self.buffered.clamp(0.0, 1.0);
        if buffered != self.buffered {
            self.buffered = buffered;
            corrections.buffered = Some(buffered);
        }
        corrections
    }
}

macro_rules! state_delta {
    ($( $(#[$meta:meta])* $field:ident : $ty:ty ),* $(,)?) => {
        /// Partial update of [`PlaybackState`].
        ///
        /// Every key is optional. Nullable keys nest a second `Option`, so
        /// `Some(None)` clears the value while `None` leaves it untouched.
        #[derive(Debug, Clone, Default, PartialEq, Serialize)]
        pub struct StateDelta {
            $(
                $(#[$meta])*
                #[serde(skip_serializing_if = "Option::is_none")]
                pub $field: Option<$ty>,
            )*
        }

        impl StateDelta {
            $(
                pub fn $field(mut self, value: $ty) -> Self {
                    self.$field = Some(value);
                    self
                }
            )*

            pub fn is_empty(&self) -> bool {
                true $( && self.$field.is_none() )*
            }

            /// Delta naming every key, used when the whole state is replaced
            pub fn full(state: &PlaybackState) -> Self {
                Self { $( $field: Some(state.$field.clone()), )* }
            }

            /// Names of the keys this delta sets
            pub fn keys(&self) -> Vec<&'static str> {
                let mut keys = Vec::new();
                $(
                    if self.$field.is_some() {
                        keys.push(stringify!($field));
                    }
                )*
                keys
            }

            /// Overwrite keys with those `other` names
            fn overlay(&mut self, other: &StateDelta) {
                $(
                    if let Some(value) = &other.$field {
                        self.$field = Some(value.clone());
                    }
                )*
            }

            fn merge_into(&self, state: &mut PlaybackState) {
                $(
                    if let Some(value) = &self.$field {
                        state.$field = value.clone();
                    }
                )*
            }
        }
    };
}

state_delta! {
    duration: f64,
    current_time: f64,
    paused: bool,
    buffering: bool,
    seeking: bool,
    ended: bool,
    buffered: f64,
    volume: f64,
    muted: bool,
    playback_rate: f64,
    error: Option<StateError>,
    qualities: Vec<String>,
    current_quality: Option<String>,
    audios: Vec<AudioTrack>,
    current_audio: Option<String>,
    subtitles: Vec<SubtitleTrack>,
    current_subtitle: Option<String>,
}

/// Numeric resolution parsed from the first digit run of a label ("1080p" → 1080)
pub fn quality_rank(label: &str) -> Option<u32> {
    let digits: String = label
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Sort labels descending by resolution and drop duplicates.
/// Labels without a number keep their relative order after the ranked ones.
pub fn normalize_qualities<I, S>(labels: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for label in labels {
        let label = label.into();
        if !out.contains(&label) {
            out.push(label);
        }
    }
    out.sort_by(|a, b| match (quality_rank(a), quality_rank(b)) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    out
}

/// Shared flag an adapter checks before emitting a deferred delta
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_live(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn revoke(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// Single source of truth for one mounted player
pub struct PlaybackStore {
    state_tx: watch::Sender<PlaybackState>,
    delta_tx: broadcast::Sender<StateDelta>,
}

impl PlaybackStore {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(PlaybackState::default());
        let (delta_tx, _) = broadcast::channel(DELTA_CHANNEL_CAPACITY);
        Self { state_tx, delta_tx }
    }

    /// Current state snapshot
    pub fn snapshot(&self) -> PlaybackState {
        self.state_tx.borrow().clone()
    }

    /// Subscribe to full state snapshots
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state_tx.subscribe()
    }

    /// Subscribe to applied deltas, in application order
    pub fn subscribe_deltas(&self) -> broadcast::Receiver<StateDelta> {
        self.delta_tx.subscribe()
    }

    /// Merge `delta` into the state
    pub fn apply(&self, delta: StateDelta) {
        self.apply_if(delta, || true);
    }

    /// Merge `delta` only if `gate` holds while the state is locked
    fn apply_if(&self, delta: StateDelta, gate: impl FnOnce() -> bool) -> bool {
        if delta.is_empty() {
            return false;
        }
        let delta_tx = &self.delta_tx;
        let mut applied = false;
        self.state_tx.send_if_modified(|state| {
            if !gate() {
                return false;
            }
            delta.merge_into(state);
            let corrections = state.enforce_invariants();
            applied = true;
            // Subscribers see what the state became, corrections included
            let published = if corrections.is_empty() {
                delta.clone()
            } else {
                for key in corrections.keys() {
                    warn!(key, "Value outside its allowed set, corrected");
                }
                let mut published = delta.clone();
                published.overlay(&corrections);
                published
            };
            // No delta subscribers is fine
            let _ = delta_tx.send(published);
            true
        });
        applied
    }

    /// Replace the state for a new source list.
    ///
    /// Volume, mute and rate are user settings and survive, everything
    /// else starts over. `subtitles` seeds the caller supplied tracks.
    pub fn reset_media(&self, subtitles: Vec<SubtitleTrack>) {
        let delta_tx = &self.delta_tx;
        self.state_tx.send_modify(|state| {
            *state = PlaybackState {
                volume: state.volume,
                muted: state.muted,
                playback_rate: state.playback_rate,
                subtitles,
                ..PlaybackState::default()
            };
            let _ = delta_tx.send(StateDelta::full(state));
        });
    }

    /// Revoke `liveness` under the state lock so no gated delta lands after
    fn revoke(&self, liveness: &Liveness) {
        self.state_tx.send_if_modified(|_| {
            liveness.revoke();
            false
        });
    }
}

impl Default for PlaybackStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Write access to the store for one adapter generation
#[derive(Clone)]
pub struct DeltaSink {
    store: Arc<PlaybackStore>,
    liveness: Liveness,
    generation: u64,
}

impl DeltaSink {
    pub fn new(store: Arc<PlaybackStore>, generation: u64) -> Self {
        Self {
            store,
            liveness: Liveness::new(),
            generation,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    pub fn is_live(&self) -> bool {
        self.liveness.is_live()
    }

    /// Apply a delta unless the owning adapter has been torn down.
    /// Returns whether it landed.
    pub fn apply(&self, delta: StateDelta) -> bool {
        let liveness = &self.liveness;
        let applied = self.store.apply_if(delta, || liveness.is_live());
        if !applied && !liveness.is_live() {
            debug!(generation = self.generation, "Dropped delta from retired adapter");
        }
        applied
    }

    /// Report an error into the store
    pub fn fail(&self, err: &Error) -> bool {
        self.apply(StateDelta::default().error(Some(StateError::from(err))))
    }

    /// Current store snapshot
    pub fn snapshot(&self) -> PlaybackState {
        self.store.snapshot()
    }

    /// Mark this generation dead. Every later `apply` is dropped.
    pub fn retire(&self) {
        self.store.revoke(&self.liveness);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_overwrites_only_named_keys() {
        let store = PlaybackStore::new();
        store.apply(StateDelta::default().duration(120.0).paused(false));
        store.apply(StateDelta::default().current_time(30.0));

        let state = store.snapshot();
        assert_eq!(state.duration, 120.0);
        assert_eq!(state.current_time, 30.0);
        assert!(!state.paused);
        assert_eq!(state.volume, 1.0);
    }

    #[test]
    fn test_nested_option_clears() {
        let store = PlaybackStore::new();
        store.apply(StateDelta::default().error(Some(StateError::new(
            StateErrorKind::Backend,
            "boom",
        ))));
        assert!(store.snapshot().error.is_some());

        store.apply(StateDelta::default().current_time(1.0));
        assert!(store.snapshot().error.is_some());

        store.apply(StateDelta::default().error(None));
        assert!(store.snapshot().error.is_none());
    }

    #[test]
    fn test_selection_outside_list_is_unset() {
        let store = PlaybackStore::new();
        store.apply(
            StateDelta::default()
                .qualities(vec!["720p".into(), "480p".into()])
                .current_quality(Some("1080p".into())),
        );
        assert_eq!(store.snapshot().current_quality, None);

        store.apply(StateDelta::default().current_quality(Some("480p".into())));
        assert_eq!(store.snapshot().current_quality.as_deref(), Some("480p"));

        store.apply(StateDelta::default().qualities(vec!["720p".into()]));
        assert_eq!(store.snapshot().current_quality, None);
    }

    #[tokio::test]
    async fn test_delta_stream_carries_invariant_corrections() {
        let store = PlaybackStore::new();
        let mut rx = store.subscribe_deltas();
        store.apply(
            StateDelta::default()
                .qualities(vec!["720p".into(), "480p".into()])
                .current_quality(Some("480p".into())),
        );
        store.apply(StateDelta::default().qualities(vec!["720p".into()]));
        store.apply(StateDelta::default().volume(1.7).buffered(-0.2));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.current_quality, Some(Some("480p".to_string())));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.current_quality, Some(None));
        assert_eq!(second.keys(), vec!["qualities", "current_quality"]);
        let third = rx.recv().await.unwrap();
        assert_eq!(third.volume, Some(1.0));
        assert_eq!(third.buffered, Some(0.0));

        let mut replayed = PlaybackState::default();
        for delta in [&first, &second, &third] {
            delta.merge_into(&mut replayed);
        }
        assert_eq!(replayed, store.snapshot());
    }

    #[tokio::test]
    async fn test_clean_delta_is_published_as_applied() {
        let store = PlaybackStore::new();
        let mut rx = store.subscribe_deltas();
        let delta = StateDelta::default().volume(0.5).current_time(3.0);
        store.apply(delta.clone());
        assert_eq!(rx.recv().await.unwrap(), delta);
    }

    #[test]
    fn test_retired_sink_drops_deltas() {
        let store = Arc::new(PlaybackStore::new());
        let sink = DeltaSink::new(store.clone(), 1);
        assert!(sink.apply(StateDelta::default().current_time(5.0)));

        sink.retire();
        assert!(!sink.apply(StateDelta::default().current_time(99.0)));
        assert_eq!(store.snapshot().current_time, 5.0);
    }

    #[test]
    fn test_reset_keeps_user_settings() {
        let store = PlaybackStore::new();
        store.apply(
            StateDelta::default()
                .volume(0.4)
                .muted(true)
                .current_time(12.0)
                .qualities(vec!["720p".into()]),
        );
        store.reset_media(vec![SubtitleTrack::new("en", "English", "en.vtt")]);

        let state = store.snapshot();
        assert_eq!(state.volume, 0.4);
        assert!(state.muted);
        assert_eq!(state.current_time, 0.0);
        assert!(state.qualities.is_empty());
        assert_eq!(state.subtitles.len(), 1);
    }

    #[test]
    fn test_normalize_qualities_sorts_and_dedupes() {
        let labels = normalize_qualities(["480p", "1080p", "720p", "480p", "auto"]);
        assert_eq!(labels, vec!["1080p", "720p", "480p", "auto"]);
        assert_eq!(quality_rank("HD 720p"), Some(720));
        assert_eq!(quality_rank("auto"), None);
    }

    #[tokio::test]
    async fn test_delta_subscribers_see_applied_deltas_in_order() {
        let store = PlaybackStore::new();
        let mut rx = store.subscribe_deltas();
        store.apply(StateDelta::default().current_time(1.0));
        store.apply(StateDelta::default().current_time(2.0));

        assert_eq!(rx.recv().await.unwrap().current_time, Some(1.0));
        assert_eq!(rx.recv().await.unwrap().current_time, Some(2.0));
    }
}
