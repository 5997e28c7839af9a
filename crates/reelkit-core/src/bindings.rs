//! Host bindings
//!
//! The core never touches a browser or SDK directly. The host implements
//! these traits over the real media element and SDK objects, and delivers
//! every backend callback as a [`BackendEvent`] through an [`EventSender`].

use crate::error::Result;
use crate::state::Liveness;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Standard media element events
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    Play,
    Pause,
    Playing,
    Waiting,
    CanPlay,
    LoadedMetadata { duration: f64 },
    LoadedData,
    DurationChange { duration: f64 },
    TimeUpdate { current_time: f64 },
    /// End of the last buffered range, in seconds
    Progress { buffered_end: f64 },
    VolumeChange { volume: f64, muted: bool },
    RateChange { rate: f64 },
    Seeking,
    Seeked,
    Ended,
    Error { message: String },
}

/// One variant announced by an HLS manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HlsLevel {
    /// Vertical resolution, 0 when the manifest does not announce one
    pub height: u32,
    pub bitrate: u64,
}

/// Audio or subtitle rendition announced by a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaTrack {
    /// May be empty, the track index stands in for it
    pub lang: String,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// HLS error family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HlsErrorKind {
    Network,
    Media,
    Other,
}

impl std::fmt::Display for HlsErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HlsErrorKind::Network => write!(f, "network"),
            HlsErrorKind::Media => write!(f, "media"),
            HlsErrorKind::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HlsEvent {
    MediaAttached,
    ManifestParsed { levels: Vec<HlsLevel> },
    LevelsUpdated { levels: Vec<HlsLevel> },
    FragmentLoaded,
    SubtitleTracksUpdated { tracks: Vec<MediaTrack> },
    AudioTracksUpdated { tracks: Vec<MediaTrack> },
    Error {
        kind: HlsErrorKind,
        fatal: bool,
        details: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DashEvent {
    StreamInitialized,
    Error { message: String },
}

/// YouTube player state codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedState {
    Unstarted,
    Ended,
    Playing,
    Paused,
    Buffering,
    Cued,
}

impl EmbedState {
    /// Map a raw YouTube state code
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(EmbedState::Unstarted),
            0 => Some(EmbedState::Ended),
            1 => Some(EmbedState::Playing),
            2 => Some(EmbedState::Paused),
            3 => Some(EmbedState::Buffering),
            5 => Some(EmbedState::Cued),
            _ => None,
        }
    }
}

/// Error reported by an embedded SDK
#[derive(Debug, Clone, PartialEq)]
pub enum EmbedError {
    /// Numeric code (YouTube)
    Code(i32),
    /// Named error (Vimeo)
    Message(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EmbedEvent {
    StateChange(EmbedState),
    Play,
    Pause,
    Ended,
    TimeUpdate { seconds: f64, duration: f64 },
    DurationChange { duration: f64 },
    VolumeChange { volume: f64, muted: bool },
    RateChange { rate: f64 },
    BufferStart,
    BufferEnd,
    Seeking,
    Seeked,
    Error(EmbedError),
}

/// Any backend callback, as a message
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    Media(MediaEvent),
    Hls(HlsEvent),
    Dash(DashEvent),
    Embed(EmbedEvent),
}

impl From<MediaEvent> for BackendEvent {
    fn from(event: MediaEvent) -> Self {
        BackendEvent::Media(event)
    }
}

impl From<HlsEvent> for BackendEvent {
    fn from(event: HlsEvent) -> Self {
        BackendEvent::Hls(event)
    }
}

impl From<DashEvent> for BackendEvent {
    fn from(event: DashEvent) -> Self {
        BackendEvent::Dash(event)
    }
}

impl From<EmbedEvent> for BackendEvent {
    fn from(event: EmbedEvent) -> Self {
        BackendEvent::Embed(event)
    }
}

/// Inbound event channel of one adapter instance.
///
/// Hosts clone it into every SDK callback. Once the adapter is torn down
/// `emit` drops events instead of queueing them.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<BackendEvent>,
    liveness: Liveness,
}

impl EventSender {
    pub fn new(tx: mpsc::UnboundedSender<BackendEvent>, liveness: Liveness) -> Self {
        Self { tx, liveness }
    }

    /// Queue an event. Returns false if the adapter is gone.
    pub fn emit(&self, event: impl Into<BackendEvent>) -> bool {
        if !self.liveness.is_live() {
            return false;
        }
        self.tx.send(event.into()).is_ok()
    }

    pub fn is_live(&self) -> bool {
        self.liveness.is_live() && !self.tx.is_closed()
    }
}

/// The media element a mounted player renders into
pub trait MediaElement: Send + Sync {
    fn set_src(&self, src: &str);
    fn has_src(&self) -> bool;
    fn load(&self);
    /// May be refused, e.g. autoplay without user interaction
    fn play(&self) -> Result<()>;
    fn pause(&self);
    fn paused(&self) -> bool;
    fn current_time(&self) -> f64;
    fn set_current_time(&self, seconds: f64);
    fn duration(&self) -> Option<f64>;
    fn volume(&self) -> f64;
    fn set_volume(&self, volume: f64);
    fn muted(&self) -> bool;
    fn set_muted(&self, muted: bool);
    fn playback_rate(&self) -> f64;
    fn set_playback_rate(&self, rate: f64);
    fn can_play_type(&self, mime: &str) -> bool;
    /// Route element events to `sender`, or stop routing with `None`
    fn bind_events(&self, sender: Option<EventSender>);
}

/// Rewrites each URL the HLS backend requests
pub type RequestRewriter = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Options handed to the HLS SDK on creation
#[derive(Clone, Default)]
pub struct HlsConfig {
    pub rewrite_request_url: Option<RequestRewriter>,
}

impl HlsConfig {
    /// Apply the rewriter, if any
    pub fn request_url(&self, url: &str) -> String {
        match &self.rewrite_request_url {
            Some(rewrite) => rewrite(url),
            None => url.to_string(),
        }
    }
}

impl std::fmt::Debug for HlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HlsConfig")
            .field("rewrite_request_url", &self.rewrite_request_url.is_some())
            .finish()
    }
}

/// The hls.js global
pub trait HlsSdk: Send + Sync {
    fn is_supported(&self) -> bool;
    fn create(&self, config: HlsConfig, events: EventSender) -> Result<Arc<dyn HlsInstance>>;
}

/// A live hls.js instance
pub trait HlsInstance: Send + Sync {
    fn attach_media(&self, media: &dyn MediaElement);
    fn load_source(&self, url: &str);
    fn levels(&self) -> Vec<HlsLevel>;
    /// `None` hands selection back to the SDK's automatic mode
    fn set_current_level(&self, index: Option<usize>);
    fn audio_track(&self) -> Option<usize>;
    fn set_audio_track(&self, index: usize);
    fn set_subtitle_track(&self, index: Option<usize>);
    fn set_subtitle_display(&self, enabled: bool);
    fn start_load(&self);
    fn recover_media_error(&self);
    fn destroy(&self);
}

/// A video representation known to dash.js
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashBitrate {
    pub quality_index: usize,
    pub bitrate: u64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashSettings {
    pub fast_switch_enabled: bool,
    pub auto_switch_video: bool,
}

/// The dashjs global
pub trait DashSdk: Send + Sync {
    fn create(&self, events: EventSender) -> Result<Arc<dyn DashInstance>>;
}

/// A live dash.js media player
pub trait DashInstance: Send + Sync {
    fn update_settings(&self, settings: DashSettings);
    fn initialize(&self);
    fn set_autoplay(&self, autoplay: bool);
    fn attach_view(&self, media: &dyn MediaElement);
    fn attach_source(&self, url: &str);
    fn bitrates(&self) -> Vec<DashBitrate>;
    fn set_quality_for_video(&self, quality_index: usize);
    fn reset(&self);
}

/// Creation options for an embedded player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedOptions {
    pub video_id: String,
    pub autoplay: bool,
    pub muted: bool,
}

/// The YouTube or Vimeo player API
#[async_trait]
pub trait EmbedSdk: Send + Sync {
    /// Resolves once the embed reports ready
    async fn create_player(
        &self,
        options: EmbedOptions,
        events: EventSender,
    ) -> Result<Arc<dyn EmbeddedPlayer>>;
}

/// A ready embedded player. Volumes are normalized to 0 to 1 by the host.
#[async_trait]
pub trait EmbeddedPlayer: Send + Sync {
    async fn play(&self) -> Result<()>;
    async fn pause(&self) -> Result<()>;
    async fn seek_to(&self, seconds: f64) -> Result<()>;
    async fn current_time(&self) -> Result<f64>;
    async fn duration(&self) -> Result<f64>;
    async fn paused(&self) -> Result<bool>;
    async fn volume(&self) -> Result<f64>;
    async fn set_volume(&self, volume: f64) -> Result<()>;
    async fn set_muted(&self, muted: bool) -> Result<()>;
    async fn playback_rate(&self) -> Result<f64>;
    async fn set_playback_rate(&self, rate: f64) -> Result<()>;
    async fn destroy(&self);
}
