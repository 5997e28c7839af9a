use super::media::MediaBridge;
use super::{Adapter, AdapterContext, AdapterSignal};
use crate::bindings::BackendEvent;
use crate::error::{Error, Result};
use crate::types::{BackendKind, Source};
use async_trait::async_trait;
use tracing::{debug, info};

/// Progressive file playback straight on the media element
pub struct NativeAdapter {
    ctx: AdapterContext,
    bridge: Option<MediaBridge>,
}

impl NativeAdapter {
    pub fn new(ctx: AdapterContext) -> Self {
        Self { ctx, bridge: None }
    }

    fn bridge(&self) -> Result<&MediaBridge> {
        self.bridge.as_ref().ok_or(Error::NotAttached)
    }
}

#[async_trait]
impl Adapter for NativeAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    async fn attach(&mut self, source: &Source) -> Result<()> {
        let media = self.ctx.require_media(BackendKind::Native)?;
        if !self.ctx.sink.is_live() {
            debug!(generation = self.ctx.generation(), "Attach superseded before binding");
            return Ok(());
        }
        if media.has_src() {
            media.pause();
        }

        let bridge = MediaBridge::bind(BackendKind::Native, &self.ctx)?;
        media.set_src(&source.file);
        media.load();
        self.bridge = Some(bridge);

        info!(generation = self.ctx.generation(), file = %source.file, "Native source attached");
        Ok(())
    }

    async fn teardown(&mut self) {
        if let Some(bridge) = self.bridge.take() {
            bridge.release();
            bridge.pause();
            debug!(generation = self.ctx.generation(), "Native adapter torn down");
        }
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

    async fn handle_event(&mut self, event: BackendEvent) -> Result<Option<AdapterSignal>> {
        match event {
            BackendEvent::Media(event) => Ok(self.bridge()?.translate(event)),
            other => {
                debug!(?other, "Native adapter ignores non-media event");
                Ok(None)
            }
        }
    }
}
