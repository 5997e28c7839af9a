//! Player options that cannot live in serialized config

use crate::bindings::{DashInstance, HlsInstance, MediaElement, RequestRewriter};
use crate::types::{PlayerConfig, Source, SubtitleTrack};
use std::sync::Arc;

/// Picks the preferred label out of the available qualities
pub type QualityPreference = Arc<dyn Fn(&[String]) -> Option<String> + Send + Sync>;

pub type InitHook = Arc<dyn Fn(&dyn MediaElement) + Send + Sync>;
pub type HlsInitHook = Arc<dyn Fn(&Arc<dyn HlsInstance>, &Source) + Send + Sync>;
pub type DashInitHook = Arc<dyn Fn(&Arc<dyn DashInstance>, &Source) + Send + Sync>;

/// Escape hatches fired once per backend attach with the raw handle
#[derive(Clone, Default)]
pub struct PlayerHooks {
    pub on_init: Option<InitHook>,
    pub on_hls_init: Option<HlsInitHook>,
    pub on_dash_init: Option<DashInitHook>,
}

#[derive(Clone, Default)]
pub struct PlayerOptions {
    pub config: PlayerConfig,
    pub prefer_quality: Option<QualityPreference>,
    /// Invoked for every request the HLS backend issues
    pub rewrite_request_url: Option<RequestRewriter>,
    /// Caller supplied subtitle tracks, seeded on every load
    pub subtitles: Vec<SubtitleTrack>,
    pub hooks: PlayerHooks,
}

impl PlayerOptions {
    pub fn new(config: PlayerConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn with_prefer_quality<F>(mut self, prefer: F) -> Self
    where
        F: Fn(&[String]) -> Option<String> + Send + Sync + 'static,
    {
        self.prefer_quality = Some(Arc::new(prefer));
        self
    }

    pub fn with_request_rewriter<F>(mut self, rewrite: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.rewrite_request_url = Some(Arc::new(rewrite));
        self
    }

    pub fn with_subtitles(mut self, subtitles: Vec<SubtitleTrack>) -> Self {
        self.subtitles = subtitles;
        self
    }

    pub fn on_init<F>(mut self, hook: F) -> Self
    where
        F: Fn(&dyn MediaElement) + Send + Sync + 'static,
    {
        self.hooks.on_init = Some(Arc::new(hook));
        self
    }

    pub fn on_hls_init<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Arc<dyn HlsInstance>, &Source) + Send + Sync + 'static,
    {
        self.hooks.on_hls_init = Some(Arc::new(hook));
        self
    }

    pub fn on_dash_init<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Arc<dyn DashInstance>, &Source) + Send + Sync + 'static,
    {
        self.hooks.on_dash_init = Some(Arc::new(hook));
        self
    }

    /// Ask the preference function, keeping only answers that are in `qualities`
    pub fn preferred_quality(&self, qualities: &[String]) -> Option<String> {
        let prefer = self.prefer_quality.as_ref()?;
        prefer(qualities).filter(|label| qualities.contains(label))
    }
}

impl std::fmt::Debug for PlayerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerOptions")
            .field("config", &self.config)
            .field("prefer_quality", &self.prefer_quality.is_some())
            .field("rewrite_request_url", &self.rewrite_request_url.is_some())
            .field("subtitles", &self.subtitles)
            .field("on_init", &self.hooks.on_init.is_some())
            .field("on_hls_init", &self.hooks.on_hls_init.is_some())
            .field("on_dash_init", &self.hooks.on_dash_init.is_some())
            .finish()
    }
}
