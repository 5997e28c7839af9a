//! Player handle - the public face of a mounted player
//!
//! Playback controls go through the [`ControlContext`] and never touch an
//! adapter. Reconciliation requests (load, quality, tracks) are queued to
//! the session task. State is read from the [`PlaybackStore`].

use crate::context::{ActiveBackend, ControlContext};
use crate::error::{Error, Result};
use crate::options::PlayerOptions;
use crate::session::{Bindings, ControlCommand, PlayerSession};
use crate::state::{PlaybackState, PlaybackStore, StateDelta};
use crate::types::{PlayerId, Source};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A mounted player.
///
/// Dropping the handle unmounts the player. [`PlayerHandle::unmount`] does
/// the same and waits for teardown to finish.
pub struct PlayerHandle {
    id: PlayerId,
    store: Arc<PlaybackStore>,
    context: ControlContext,
    commands: mpsc::UnboundedSender<ControlCommand>,
    task: Option<JoinHandle<()>>,
}

impl PlayerHandle {
    /// Mount a player and start loading `sources`.
    ///
    /// Must be called from within a tokio runtime. An empty source list
    /// mounts an idle player that waits for [`PlayerHandle::load`].
    pub fn spawn(bindings: Bindings, options: PlayerOptions, sources: Vec<Source>) -> Result<Self> {
        options.config.validate()?;

        let id = PlayerId::new();
        let store = Arc::new(PlaybackStore::new());
        if options.config.muted {
            store.apply(StateDelta::default().muted(true));
        }

        let context = ControlContext::new();
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let session = PlayerSession::new(
            id,
            store.clone(),
            context.clone(),
            bindings,
            Arc::new(options),
            commands_rx,
        );
        let task = tokio::spawn(session.run());

        let handle = Self {
            id,
            store,
            context,
            commands,
            task: Some(task),
        };
        if !sources.is_empty() {
            handle.load(sources)?;
        }
        info!(player = %id, "Player mounted");
        Ok(handle)
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    fn send(&self, command: ControlCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::Internal("player session has stopped".into()))
    }

    // ---- reconciliation ----

    /// Replace the source list. Tears down the live backend first.
    pub fn load(&self, sources: Vec<Source>) -> Result<()> {
        self.send(ControlCommand::Load(sources))
    }

    /// Select a quality label from the published list
    pub fn set_quality(&self, label: impl Into<String>) -> Result<()> {
        self.send(ControlCommand::SetQuality(label.into()))
    }

    /// Select an audio track by language code. HLS only.
    pub fn set_audio_track(&self, lang: impl Into<String>) -> Result<()> {
        self.send(ControlCommand::SetAudioTrack(lang.into()))
    }

    /// Select a subtitle track by language code, `None` to hide subtitles
    pub fn set_subtitle(&self, lang: Option<String>) -> Result<()> {
        self.send(ControlCommand::SetSubtitle(lang))
    }

    // ---- playback ----

    pub fn play(&self) -> bool {
        self.context.play()
    }

    pub fn pause(&self) -> bool {
        self.context.pause()
    }

    pub fn toggle(&self) -> bool {
        if self.store.snapshot().paused {
            self.play()
        } else {
            self.pause()
        }
    }

    /// Seek to `seconds`, clamped to the known duration
    pub fn seek(&self, seconds: f64) -> bool {
        match self.clamp_position(seconds) {
            Some(seconds) => self.context.seek(seconds),
            None => false,
        }
    }

    /// Commit a seek-bar drag. Embedded backends debounce these.
    pub fn scrub(&self, seconds: f64) -> bool {
        match self.clamp_position(seconds) {
            Some(seconds) => self.context.scrub(seconds),
            None => false,
        }
    }

    pub fn set_volume(&self, volume: f64) -> bool {
        if !volume.is_finite() {
            warn!(volume, "Ignoring non-finite volume");
            return false;
        }
        self.context.set_volume(volume.clamp(0.0, 1.0))
    }

    pub fn set_muted(&self, muted: bool) -> bool {
        self.context.set_muted(muted)
    }

    pub fn set_playback_rate(&self, rate: f64) -> bool {
        if !rate.is_finite() || rate <= 0.0 {
            warn!(rate, "Ignoring invalid playback rate");
            return false;
        }
        self.context.set_playback_rate(rate)
    }

    fn clamp_position(&self, seconds: f64) -> Option<f64> {
        if !seconds.is_finite() {
            debug!(seconds, "Ignoring non-finite position");
            return None;
        }
        let duration = self.store.snapshot().duration;
        let upper = if duration > 0.0 { duration } else { f64::MAX };
        Some(seconds.clamp(0.0, upper))
    }

    // ---- queries ----

    /// Current state snapshot
    pub fn state(&self) -> PlaybackState {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.store.subscribe()
    }

    pub fn subscribe_deltas(&self) -> broadcast::Receiver<StateDelta> {
        self.store.subscribe_deltas()
    }

    /// Position as reported by the live backend
    pub async fn current_time(&self) -> Option<f64> {
        self.context.current_time().await
    }

    /// Volume as reported by the live backend, which can lag the store
    /// on embedded players
    pub async fn volume(&self) -> Option<f64> {
        self.context.volume().await
    }

    pub async fn playback_rate(&self) -> Option<f64> {
        self.context.playback_rate().await
    }

    pub fn active_backend(&self) -> Option<ActiveBackend> {
        self.context.active()
    }

    /// The control context, for controls that outlive a borrow of the handle
    pub fn context(&self) -> ControlContext {
        self.context.clone()
    }

    /// Wait until every queued request has been handled and no attach is in flight
    pub async fn flush(&self) -> Result<()> {
        let (done, wait) = oneshot::channel();
        self.send(ControlCommand::Flush(done))?;
        wait.await
            .map_err(|_| Error::Internal("player session has stopped".into()))
    }

    /// Tear the player down and wait for it
    pub async fn unmount(mut self) {
        let _ = self.commands.send(ControlCommand::Unmount);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(player = %self.id, error = %e, "Player session ended abnormally");
            }
        }
    }
}

impl Drop for PlayerHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.commands.send(ControlCommand::Unmount);
        }
    }
}

impl std::fmt::Debug for PlayerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerHandle")
            .field("id", &self.id)
            .field("active", &self.context.active())
            .finish()
    }
}
