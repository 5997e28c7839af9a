//! Backend adapters
//!
//! One capability set, five backends. Each adapter owns exactly one live
//! backend instance, turns that backend's events into [`StateDelta`]s and
//! serves the normalized controls.
//!
//! [`StateDelta`]: crate::state::StateDelta

mod dash;
mod embed;
mod hls;
mod media;
mod native;

pub use dash::DashAdapter;
pub use embed::{embed_error_message, vimeo_error_message, youtube_error_message, EmbedAdapter};
pub use hls::HlsAdapter;
pub use native::NativeAdapter;

use crate::bindings::{BackendEvent, EventSender, MediaElement};
use crate::error::{Error, Result};
use crate::loader::SdkLoaders;
use crate::options::PlayerOptions;
use crate::state::DeltaSink;
use crate::types::{BackendKind, Source};
use async_trait::async_trait;
use std::sync::Arc;

/// Lifecycle signal an adapter raises to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterSignal {
    /// The backend can play. Raised on every `canplay`, the controller
    /// only acts on the first per attach.
    Ready,
}

/// Everything an adapter instance needs, scoped to one attach
#[derive(Clone)]
pub struct AdapterContext {
    /// Store access, dropped once this adapter is retired
    pub sink: DeltaSink,
    /// Inbound channel SDK callbacks are routed into
    pub events: EventSender,
    pub media: Option<Arc<dyn MediaElement>>,
    pub sdks: Arc<SdkLoaders>,
    pub options: Arc<PlayerOptions>,
    /// Several sources were supplied, so quality is chosen by recreating
    pub manual_abr: bool,
    /// Quality selected in the store when this attach began
    pub selected_quality: Option<String>,
}

impl AdapterContext {
    /// The media element, required by every non-embedded backend
    pub(crate) fn require_media(&self, kind: BackendKind) -> Result<Arc<dyn MediaElement>> {
        self.media
            .clone()
            .ok_or_else(|| Error::UnsupportedSource(format!("{kind} needs a media element")))
    }

    pub(crate) fn generation(&self) -> u64 {
        self.sink.generation()
    }
}

/// The normalized control capability set
#[async_trait]
pub trait Adapter: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Create the backend instance for `source`
    async fn attach(&mut self, source: &Source) -> Result<()>;

    /// Destroy the backend instance. Safe to call more than once.
    async fn teardown(&mut self);

    async fn play(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn seek_to(&self, seconds: f64) -> Result<()>;

    /// Seek-bar commit: seek, then play
    async fn scrub_to(&self, seconds: f64) -> Result<()> {
        self.seek_to(seconds).await?;
        self.play().await
    }

    async fn current_time(&self) -> Result<f64>;

    async fn set_volume(&self, volume: f64) -> Result<()>;

    async fn volume(&self) -> Result<f64>;

    async fn set_muted(&self, muted: bool) -> Result<()>;

    async fn set_playback_rate(&self, rate: f64) -> Result<()>;

    async fn playback_rate(&self) -> Result<f64>;

    /// Labels the backend can switch between by itself
    fn qualities(&self) -> Vec<String> {
        Vec::new()
    }

    /// Switch to a backend-reported level. Returns false if `label` is not one.
    fn switch_quality(&self, _label: &str) -> Result<bool> {
        Ok(false)
    }

    /// Switch audio track in place
    fn switch_audio_track(&self, _lang: &str) -> Result<bool> {
        Err(Error::NotSupported(self.kind()))
    }

    /// Translate one backend event into store deltas
    async fn handle_event(&mut self, event: BackendEvent) -> Result<Option<AdapterSignal>>;
}

/// Build the adapter for `kind`. YouTube and Vimeo share one implementation.
pub fn create_adapter(kind: BackendKind, ctx: AdapterContext) -> Box<dyn Adapter> {
    match kind {
        BackendKind::Native => Box::new(NativeAdapter::new(ctx)),
        BackendKind::Hls => Box::new(HlsAdapter::new(ctx)),
        BackendKind::Dash => Box::new(DashAdapter::new(ctx)),
        BackendKind::YouTube | BackendKind::Vimeo => Box::new(EmbedAdapter::new(kind, ctx)),
    }
}
