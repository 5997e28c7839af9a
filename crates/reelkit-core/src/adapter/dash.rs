use super::media::MediaBridge;
use super::{Adapter, AdapterContext, AdapterSignal};
use crate::bindings::{BackendEvent, DashBitrate, DashEvent, DashInstance, DashSettings, MediaEvent};
use crate::error::{Error, Result};
use crate::loader::SdkScript;
use crate::state::{normalize_qualities, quality_rank, StateDelta};
use crate::types::{BackendKind, Source};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// DASH through dash.js with automatic bitrate switching off
pub struct DashAdapter {
    ctx: AdapterContext,
    bridge: Option<MediaBridge>,
    dash: Option<Arc<dyn DashInstance>>,
    /// Initial bitrate chosen for this attach
    bitrate_chosen: bool,
}

impl DashAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self {
            ctx,
            bridge: None,
            dash: None,
            bitrate_chosen: false,
        }
    }

    fn bridge(&self) -> Result<&MediaBridge> {
        self.bridge.as_ref().ok_or(Error::NotAttached)
    }

    fn instance(&self) -> Result<&Arc<dyn DashInstance>> {
        self.dash.as_ref().ok_or(Error::NotAttached)
    }

    /// Pick the representation matching the selected or preferred quality,
    /// else the lowest bitrate, and publish the list.
    fn choose_initial_bitrate(&mut self) -> Result<()> {
        let dash = self.instance()?.clone();
        let bitrates = dash.bitrates();
        if bitrates.is_empty() {
            debug!("No video bitrates announced yet");
            return Ok(());
        }
        self.bitrate_chosen = true;

        let labels = bitrate_labels(&bitrates);
        let wanted = self
            .ctx
            .sink
            .snapshot()
            .current_quality
            .or_else(|| self.ctx.selected_quality.clone())
            .or_else(|| self.ctx.options.preferred_quality(&labels));

        let matched = wanted
            .as_deref()
            .and_then(quality_rank)
            .and_then(|height| bitrates.iter().find(|b| b.height == height));
        let Some(chosen) = matched.or_else(|| bitrates.iter().min_by_key(|b| b.bitrate)) else {
            return Ok(());
        };

        dash.set_quality_for_video(chosen.quality_index);
        info!(
            height = chosen.height,
            bitrate = chosen.bitrate,
            "DASH initial bitrate selected"
        );

        if !self.ctx.manual_abr {
            let current = wanted
                .filter(|w| labels.contains(w))
                .unwrap_or_else(|| format!("{}p", chosen.height));
            self.ctx.sink.apply(
                StateDelta::default()
                    .qualities(labels)
                    .current_quality(Some(current)),
            );
        }
        Ok(())
    }
}

fn bitrate_labels(bitrates: &[DashBitrate]) -> Vec<String> {
    normalize_qualities(
        bitrates
            .iter()
            .filter(|b| b.height > 0)
            .map(|b| format!("{}p", b.height)),
    )
}

#[async_trait]
impl Adapter for DashAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Dash
    }

    async fn attach(&mut self, source: &Source) -> Result<()> {
        let media = self.ctx.require_media(BackendKind::Dash)?;
        let config = &self.ctx.options.config;
        let sdk = self
            .ctx
            .sdks
            .dash
            .load_script(
                &SdkScript::Dash {
                    version: config.dash_version.clone(),
                },
                config,
            )
            .await?;

        if !self.ctx.sink.is_live() {
            debug!("Attach superseded while loading dash.js");
            return Ok(());
        }

        let bridge = MediaBridge::bind(BackendKind::Dash, &self.ctx)?;
        let dash = match sdk.create(self.ctx.events.clone()) {
            Ok(dash) => dash,
            Err(e) => {
                bridge.release();
                return Err(e);
            }
        };

        dash.update_settings(DashSettings {
            fast_switch_enabled: true,
            auto_switch_video: false,
        });
        dash.initialize();
        // Autoplay is issued by the controller once ready
        dash.set_autoplay(false);
        dash.attach_view(media.as_ref());
        dash.attach_source(&source.file);

        if let Some(hook) = &self.ctx.options.hooks.on_dash_init {
            hook(&dash, source);
        }

        self.dash = Some(dash);
        self.bridge = Some(bridge);
        info!(generation = self.ctx.generation(), file = %source.file, "DASH attached");
        Ok(())
    }

    async fn teardown(&mut self) {
        if let Some(dash) = self.dash.take() {
            dash.reset();
        }
        if let Some(bridge) = self.bridge.take() {
            bridge.release();
            bridge.pause();
        }
        debug!(generation = self.ctx.generation(), "DASH adapter torn down");
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
        match &self.dash {
            Some(dash) if !self.ctx.manual_abr => bitrate_labels(&dash.bitrates()),
            _ => Vec::new(),
        }
    }

    fn switch_quality(&self, label: &str) -> Result<bool> {
        let dash = self.instance()?;
        let Some(height) = quality_rank(label) else {
            return Ok(false);
        };
        match dash.bitrates().iter().find(|b| b.height == height) {
            Some(bitrate) => {
                dash.set_quality_for_video(bitrate.quality_index);
                debug!(label, index = bitrate.quality_index, "DASH quality selected");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn handle_event(&mut self, event: BackendEvent) -> Result<Option<AdapterSignal>> {
        match event {
            BackendEvent::Media(MediaEvent::LoadedData) if !self.bitrate_chosen => {
                self.choose_initial_bitrate()?;
                Ok(None)
            }
            BackendEvent::Media(event) => Ok(self.bridge()?.translate(event)),
            BackendEvent::Dash(DashEvent::StreamInitialized) => {
                debug!("DASH stream initialized");
                Ok(None)
            }
            BackendEvent::Dash(DashEvent::Error { message }) => Err(Error::Backend(message)),
            other => {
                debug!(?other, "DASH adapter ignores event");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitrate_labels() {
        let bitrates = [
            DashBitrate { quality_index: 0, bitrate: 400_000, width: 640, height: 360 },
            DashBitrate { quality_index: 1, bitrate: 1_500_000, width: 1280, height: 720 },
            DashBitrate { quality_index: 2, bitrate: 4_000_000, width: 1920, height: 1080 },
        ];
        assert_eq!(bitrate_labels(&bitrates), vec!["1080p", "720p", "360p"]);
    }
}
