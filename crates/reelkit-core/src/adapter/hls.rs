use super::media::MediaBridge;
use super::{Adapter, AdapterContext, AdapterSignal};
use crate::bindings::{
    BackendEvent, HlsConfig, HlsErrorKind, HlsEvent, HlsInstance, HlsLevel, MediaTrack,
};
use crate::error::{Error, Result};
use crate::loader::SdkScript;
use crate::state::{normalize_qualities, quality_rank, StateDelta};
use crate::types::{AudioTrack, BackendKind, Source, SubtitleTrack};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const HLS_MIME: &str = "application/vnd.apple.mpegurl";

/// HLS through hls.js, or the element's own HLS support where hls.js is unsupported
pub struct HlsAdapter {
    ctx: AdapterContext,
    bridge: Option<MediaBridge>,
    hls: Option<Arc<dyn HlsInstance>>,
    source: Option<Source>,
    /// Kind of the last fatal error recovered from, cleared by a loaded fragment
    recovering: Option<HlsErrorKind>,
}

impl HlsAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self {
            ctx,
            bridge: None,
            hls: None,
            source: None,
            recovering: None,
        }
    }

    fn bridge(&self) -> Result<&MediaBridge> {
        self.bridge.as_ref().ok_or(Error::NotAttached)
    }

    fn instance(&self) -> Result<&Arc<dyn HlsInstance>> {
        self.hls.as_ref().ok_or(Error::NotAttached)
    }

    /// Publish manifest levels unless the caller drives quality with several sources
    fn publish_levels(&self, levels: &[HlsLevel]) -> Result<()> {
        if self.ctx.manual_abr {
            debug!("Manual quality list in use, manifest levels not published");
            return Ok(());
        }
        let labels = level_labels(levels);
        if labels.is_empty() {
            return Ok(());
        }

        let current = self.ctx.sink.snapshot().current_quality;
        let chosen = current
            .filter(|c| labels.contains(c))
            .or_else(|| self.ctx.selected_quality.clone().filter(|c| labels.contains(c)))
            .or_else(|| self.ctx.options.preferred_quality(&labels))
            .or_else(|| labels.first().cloned());

        if let Some(label) = &chosen {
            self.switch_quality(label)?;
        }
        info!(levels = labels.len(), current = ?chosen, "HLS levels published");
        self.ctx.sink.apply(
            StateDelta::default()
                .qualities(labels)
                .current_quality(chosen),
        );
        Ok(())
    }

    fn publish_subtitles(&self, tracks: &[MediaTrack]) {
        let subtitles: Vec<SubtitleTrack> = tracks
            .iter()
            .enumerate()
            .map(|(index, track)| SubtitleTrack {
                lang: track_lang(track, index),
                language: track.name.clone(),
                file: track.url.clone().unwrap_or_default(),
            })
            .collect();
        let current = subtitles.first().map(|t| t.lang.clone());
        self.ctx.sink.apply(
            StateDelta::default()
                .subtitles(subtitles)
                .current_subtitle(current),
        );
    }

    fn publish_audio(&self, tracks: &[MediaTrack]) -> Result<()> {
        let audios: Vec<AudioTrack> = tracks
            .iter()
            .enumerate()
            .map(|(index, track)| AudioTrack::new(track_lang(track, index), track.name.clone()))
            .collect();
        let active = self.instance()?.audio_track().unwrap_or(0);
        let current = audios.get(active).map(|t| t.lang.clone());
        self.ctx
            .sink
            .apply(StateDelta::default().audios(audios).current_audio(current));
        Ok(())
    }

    /// Recover once per error kind, surface the second consecutive one
    fn on_error(&mut self, kind: HlsErrorKind, fatal: bool, details: String) -> Result<()> {
        if !fatal {
            warn!(%kind, %details, "Non-fatal HLS error");
            return Ok(());
        }
        if self.recovering == Some(kind) || kind == HlsErrorKind::Other {
            error!(%kind, %details, "HLS fatal error, giving up");
            return Err(Error::BackendFatal { kind, details });
        }

        let hls = self.instance()?;
        match kind {
            HlsErrorKind::Network => {
                warn!(%details, "Fatal network error, reloading");
                hls.start_load();
            }
            HlsErrorKind::Media => {
                warn!(%details, "Fatal media error, recovering");
                hls.recover_media_error();
            }
            HlsErrorKind::Other => {}
        }
        self.recovering = Some(kind);
        Ok(())
    }
}

/// "{height}p" labels, highest first, levels without a height dropped
fn level_labels(levels: &[HlsLevel]) -> Vec<String> {
    let mut heights: Vec<u32> = levels
        .iter()
        .map(|level| level.height)
        .filter(|h| *h > 0)
        .collect();
    heights.sort_unstable_by(|a, b| b.cmp(a));
    normalize_qualities(heights.into_iter().map(|h| format!("{h}p")))
}

fn track_lang(track: &MediaTrack, index: usize) -> String {
    if track.lang.is_empty() {
        index.to_string()
    } else {
        track.lang.clone()
    }
}

#[async_trait]
impl Adapter for HlsAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Hls
    }

    async fn attach(&mut self, source: &Source) -> Result<()> {
        let media = self.ctx.require_media(BackendKind::Hls)?;
        let config = &self.ctx.options.config;
        let sdk = self
            .ctx
            .sdks
            .hls
            .load_script(
                &SdkScript::Hls {
                    version: config.hls_version.clone(),
                },
                config,
            )
            .await?;

        if !self.ctx.sink.is_live() {
            debug!("Attach superseded while loading hls.js");
            return Ok(());
        }

        if !sdk.is_supported() {
            if !media.can_play_type(HLS_MIME) {
                return Err(Error::UnsupportedSource(
                    "HLS is not supported on this host".into(),
                ));
            }
            let bridge = MediaBridge::bind(BackendKind::Hls, &self.ctx)?;
            media.set_src(&source.file);
            media.load();
            self.bridge = Some(bridge);
            info!(file = %source.file, "hls.js unsupported, using built-in HLS playback");
            return Ok(());
        }

        let bridge = MediaBridge::bind(BackendKind::Hls, &self.ctx)?;
        let hls_config = HlsConfig {
            rewrite_request_url: self.ctx.options.rewrite_request_url.clone(),
        };
        let hls = match sdk.create(hls_config, self.ctx.events.clone()) {
            Ok(hls) => hls,
            Err(e) => {
                bridge.release();
                return Err(e);
            }
        };
        hls.set_subtitle_track(None);
        hls.set_subtitle_display(false);
        hls.attach_media(media.as_ref());

        if let Some(hook) = &self.ctx.options.hooks.on_hls_init {
            hook(&hls, source);
        }

        self.hls = Some(hls);
        self.bridge = Some(bridge);
        self.source = Some(source.clone());
        info!(generation = self.ctx.generation(), file = %source.file, "HLS attached");
        Ok(())
    }

    async fn teardown(&mut self) {
        if let Some(hls) = self.hls.take() {
            hls.destroy();
        }
        if let Some(bridge) = self.bridge.take() {
            bridge.release();
            bridge.pause();
        }
        self.recovering = None;
        debug!(generation = self.ctx.generation(), "HLS adapter torn down");
    }

    async fn play(&self) -> Result<()> {
        self.bridge()?.play()
    }

    async fn pause(&self) -> Result<()> {
        self.bridge()?.pause();
        Ok(())
    }

    async fn seek_to(&self, seconds: f64) -> Result<()> {
        self.bridge()?.seek_to(seconds);
        Ok(())
    }

    async fn current_time(&self) -> Result<f64> {
        Ok(self.bridge()?.current_time())
    }

    async fn set_volume(&self, volume: f64) -> Result<()> {
        self.bridge()?.set_volume(volume);
        Ok(())
    }

    async fn volume(&self) -> Result<f64> {
        Ok(self.bridge()?.volume())
    }

    async fn set_muted(&self, muted: bool) -> Result<()> {
        self.bridge()?.set_muted(muted);
        Ok(())
    }

    async fn set_playback_rate(&self, rate: f64) -> Result<()> {
        self.bridge()?.set_playback_rate(rate);
        Ok(())
    }

    async fn playback_rate(&self) -> Result<f64> {
        Ok(self.bridge()?.playback_rate())
    }

    fn qualities(&self) -> Vec<String> {
        match &self.hls {
            Some(hls) if !self.ctx.manual_abr => level_labels(&hls.levels()),
            _ => Vec::new(),
        }
    }

    fn switch_quality(&self, label: &str) -> Result<bool> {
        let hls = self.instance()?;
        let Some(height) = quality_rank(label) else {
            return Ok(false);
        };
        match hls.levels().iter().position(|level| level.height == height) {
            Some(index) => {
                hls.set_current_level(Some(index));
                debug!(label, index, "HLS level selected");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn switch_audio_track(&self, lang: &str) -> Result<bool> {
        let hls = self.instance()?;
        let audios = self.ctx.sink.snapshot().audios;
        match audios.iter().position(|track| track.lang == lang) {
            Some(index) => {
                hls.set_audio_track(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn handle_event(&mut self, event: BackendEvent) -> Result<Option<AdapterSignal>> {
        let event = match event {
            BackendEvent::Media(event) => return Ok(self.bridge()?.translate(event)),
            BackendEvent::Hls(event) => event,
            other => {
                debug!(?other, "HLS adapter ignores event");
                return Ok(None);
            }
        };

        match event {
            HlsEvent::MediaAttached => {
                let file = self
                    .source
                    .as_ref()
                    .map(|s| s.file.clone())
                    .ok_or(Error::NotAttached)?;
                self.instance()?.load_source(&file);
                debug!(%file, "HLS source loading");
            }
            HlsEvent::ManifestParsed { levels } | HlsEvent::LevelsUpdated { levels } => {
                self.publish_levels(&levels)?;
            }
            HlsEvent::FragmentLoaded => {
                self.recovering = None;
            }
            HlsEvent::SubtitleTracksUpdated { tracks } => self.publish_subtitles(&tracks),
            HlsEvent::AudioTracksUpdated { tracks } => self.publish_audio(&tracks)?,
            HlsEvent::Error {
                kind,
                fatal,
                details,
            } => self.on_error(kind, fatal, details)?,
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_labels_sorted_and_filtered() {
        let levels = [
            HlsLevel { height: 480, bitrate: 1_000_000 },
            HlsLevel { height: 0, bitrate: 64_000 },
            HlsLevel { height: 1080, bitrate: 5_000_000 },
            HlsLevel { height: 720, bitrate: 2_500_000 },
            HlsLevel { height: 720, bitrate: 3_000_000 },
        ];
        assert_eq!(level_labels(&levels), vec!["1080p", "720p", "480p"]);
    }

    #[test]
    fn test_track_lang_falls_back_to_index() {
        let track = MediaTrack {
            lang: String::new(),
            name: "Commentary".into(),
            url: None,
        };
        assert_eq!(track_lang(&track, 2), "2");
    }
}
