use super::{Adapter, AdapterContext, AdapterSignal};
use crate::bindings::{BackendEvent, EmbedError, EmbedEvent, EmbedOptions, EmbedState, EmbeddedPlayer};
use crate::classify::embed_id;
use crate::error::{Error, Result};
use crate::loader::SdkScript;
use crate::state::{DeltaSink, StateDelta};
use crate::types::{BackendKind, Source};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const UNKNOWN_ERROR: &str = "Unknown error";

/// Human-readable message for a YouTube error code
pub fn youtube_error_message(code: i32) -> &'static str {
    match code {
        2 => "Invalid video ID",
        5 => "HTML5 player error",
        100 => "Video not found",
        101 | 150 => "Video cannot be embedded",
        _ => UNKNOWN_ERROR,
    }
}

/// Human-readable message for a named Vimeo error
pub fn vimeo_error_message(name: &str) -> String {
    match name {
        "NotFoundError" => "Video not found".to_string(),
        "PrivacyError" => "Video is private".to_string(),
        "PasswordError" => "Video is password protected".to_string(),
        "UnsupportedError" => "Video cannot be played in this browser".to_string(),
        "" => UNKNOWN_ERROR.to_string(),
        other => other.to_string(),
    }
}

pub fn embed_error_message(provider: BackendKind, error: &EmbedError) -> String {
    match (provider, error) {
        (_, EmbedError::Code(code)) => youtube_error_message(*code).to_string(),
        (BackendKind::Vimeo, EmbedError::Message(name)) => vimeo_error_message(name),
        (_, EmbedError::Message(message)) if !message.is_empty() => message.clone(),
        _ => UNKNOWN_ERROR.to_string(),
    }
}

/// Keeps `current_time` fresh while playing. Embedded SDKs do not push it.
#[derive(Default)]
struct Poller {
    task: Option<JoinHandle<()>>,
}

impl Poller {
    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn start(
        &mut self,
        player: Arc<dyn EmbeddedPlayer>,
        sink: DeltaSink,
        every: Duration,
        with_volume: bool,
    ) {
        if self.is_running() {
            return;
        }
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !sink.is_live() {
                    break;
                }
                let mut delta = match player.current_time().await {
                    Ok(seconds) => StateDelta::default().current_time(seconds),
                    Err(e) => {
                        debug!(error = %e, "Time poll failed");
                        continue;
                    }
                };
                if with_volume {
                    if let Ok(volume) = player.volume().await {
                        delta = delta.volume(volume);
                    }
                }
                if !sink.apply(delta) {
                    break;
                }
            }
        }));
        debug!("Time polling started");
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Time polling stopped");
        }
    }
}

/// Coalesces scrub seeks. Each call restarts the window, so the seek fires
/// at most once per quiet period.
struct Debouncer {
    window: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Mutex::new(None),
        }
    }

    fn schedule<F>(&self, fire: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let window = self.window;
        let task = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            fire.await;
        });
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(previous) = pending.replace(task) {
                previous.abort();
            }
        }
    }

    fn cancel(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(task) = pending.take() {
                task.abort();
            }
        }
    }
}

/// YouTube and Vimeo embeds. The two share one shape and differ only in SDK.
pub struct EmbedAdapter {
    kind: BackendKind,
    ctx: AdapterContext,
    player: Option<Arc<dyn EmbeddedPlayer>>,
    poller: Poller,
    scrub: Debouncer,
}

impl EmbedAdapter {
    pub fn new(kind: BackendKind, ctx: AdapterContext) -> Self {
        let window = ctx.options.config.scrub_debounce();
        Self {
            kind,
            ctx,
            player: None,
            poller: Poller::default(),
            scrub: Debouncer::new(window),
        }
    }

    fn player(&self) -> Result<&Arc<dyn EmbeddedPlayer>> {
        self.player.as_ref().ok_or(Error::NotAttached)
    }

    fn start_polling(&mut self) {
        if let Some(player) = &self.player {
            self.poller.start(
                player.clone(),
                self.ctx.sink.clone(),
                self.ctx.options.config.embed_poll_interval(),
                self.kind == BackendKind::YouTube,
            );
        }
    }

    fn set_playing(&mut self, playing: bool) {
        if playing {
            self.start_polling();
        } else {
            self.poller.stop();
        }
    }
}

#[async_trait]
impl Adapter for EmbedAdapter {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn attach(&mut self, source: &Source) -> Result<()> {
        let video_id = embed_id(self.kind, &source.file).ok_or_else(|| Error::InvalidId {
            provider: self.kind,
            input: source.file.clone(),
        })?;

        let (loader, script) = match self.kind {
            BackendKind::Vimeo => (&self.ctx.sdks.vimeo, SdkScript::Vimeo),
            _ => (&self.ctx.sdks.youtube, SdkScript::YouTube),
        };
        let sdk = loader
            .load_script(&script, &self.ctx.options.config)
            .await?;

        if !self.ctx.sink.is_live() {
            debug!("Attach superseded while loading the embed API");
            return Ok(());
        }

        let options = EmbedOptions {
            video_id: video_id.clone(),
            // Autoplay is issued by the controller once ready
            autoplay: false,
            muted: self.ctx.sink.snapshot().muted,
        };
        let player = sdk.create_player(options, self.ctx.events.clone()).await?;

        if !self.ctx.sink.is_live() {
            player.destroy().await;
            debug!("Attach superseded while the embed was starting");
            return Ok(());
        }

        let (duration, volume, paused) =
            tokio::join!(player.duration(), player.volume(), player.paused());
        let paused = paused.unwrap_or(true);

        let mut delta = StateDelta::default()
            .paused(paused)
            .buffering(false)
            .error(None);
        if let Ok(duration) = duration {
            delta = delta.duration(duration);
        }
        if let Ok(volume) = volume {
            delta = delta.volume(volume);
        }
        self.ctx.sink.apply(delta);

        self.player = Some(player);
        self.set_playing(!paused);
        info!(provider = %self.kind, %video_id, "Embedded player ready");
        Ok(())
    }

    async fn teardown(&mut self) {
        self.poller.stop();
        self.scrub.cancel();
        if let Some(player) = self.player.take() {
            player.destroy().await;
            debug!(provider = %self.kind, "Embedded player destroyed");
        }
    }

    async fn play(&self) -> Result<()> {
        self.player()?.play().await
    }

    async fn pause(&self) -> Result<()> {
        self.player()?.pause().await
    }

    async fn seek_to(&self, seconds: f64) -> Result<()> {
        self.player()?.seek_to(seconds).await
    }

    /// Debounced: the position shows at once, the SDK sees one seek per quiet window
    async fn scrub_to(&self, seconds: f64) -> Result<()> {
        let player = self.player()?.clone();
        let sink = self.ctx.sink.clone();
        sink.apply(StateDelta::default().current_time(seconds).seeking(false));

        self.scrub.schedule(async move {
            if !sink.is_live() {
                return;
            }
            if let Err(e) = player.seek_to(seconds).await {
                warn!(error = %e, "Scrub seek failed");
                return;
            }
            if let Err(e) = player.play().await {
                debug!(error = %e, "Play after scrub refused");
            }
        });
        Ok(())
    }

    async fn current_time(&self) -> Result<f64> {
        self.player()?.current_time().await
    }

    async fn set_volume(&self, volume: f64) -> Result<()> {
        self.player()?.set_volume(volume).await?;
        self.ctx.sink.apply(StateDelta::default().volume(volume));
        Ok(())
    }

    async fn volume(&self) -> Result<f64> {
        self.player()?.volume().await
    }

    async fn set_muted(&self, muted: bool) -> Result<()> {
        self.player()?.set_muted(muted).await?;
        self.ctx.sink.apply(StateDelta::default().muted(muted));
        Ok(())
    }

    async fn set_playback_rate(&self, rate: f64) -> Result<()> {
        self.player()?.set_playback_rate(rate).await?;
        self.ctx.sink.apply(StateDelta::default().playback_rate(rate));
        Ok(())
    }

    async fn playback_rate(&self) -> Result<f64> {
        self.player()?.playback_rate().await
    }

    async fn handle_event(&mut self, event: BackendEvent) -> Result<Option<AdapterSignal>> {
        let BackendEvent::Embed(event) = event else {
            debug!(provider = %self.kind, "Embedded adapter ignores non-embed event");
            return Ok(None);
        };

        let delta = match event {
            EmbedEvent::StateChange(state) => {
                let playing = state == EmbedState::Playing;
                self.set_playing(playing);
                StateDelta::default()
                    .paused(!playing)
                    .ended(state == EmbedState::Ended)
                    .buffering(state == EmbedState::Buffering)
            }
            EmbedEvent::Play => {
                self.set_playing(true);
                StateDelta::default().paused(false).ended(false)
            }
            EmbedEvent::Pause => {
                self.set_playing(false);
                StateDelta::default().paused(true)
            }
            EmbedEvent::Ended => {
                self.set_playing(false);
                StateDelta::default().ended(true).paused(true)
            }
            EmbedEvent::TimeUpdate { seconds, duration } => {
                let delta = StateDelta::default().current_time(seconds);
                if duration > 0.0 {
                    delta.duration(duration)
                } else {
                    delta
                }
            }
            EmbedEvent::DurationChange { duration } => StateDelta::default().duration(duration),
            EmbedEvent::VolumeChange { volume, muted } => {
                StateDelta::default().volume(volume).muted(muted)
            }
            EmbedEvent::RateChange { rate } => StateDelta::default().playback_rate(rate),
            EmbedEvent::BufferStart => StateDelta::default().buffering(true),
            EmbedEvent::BufferEnd => StateDelta::default().buffering(false),
            EmbedEvent::Seeking => StateDelta::default().seeking(true),
            EmbedEvent::Seeked => StateDelta::default().seeking(false),
            EmbedEvent::Error(error) => {
                return Err(Error::Embed {
                    provider: self.kind,
                    message: embed_error_message(self.kind, &error),
                });
            }
        };
        self.ctx.sink.apply(delta);
        Ok(None)
    }
}
