//! Control context
//!
//! Controls never hold an adapter. They hold a [`ControlContext`], in which
//! the live adapter registers its command port on attach and removes it on
//! teardown. At most one port is registered at a time, and commands issued
//! while the slot is empty are dropped.

use crate::error::{Error, Result};
use crate::types::BackendKind;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Playback command routed to the live adapter
#[derive(Debug)]
pub enum PlaybackCommand {
    Play,
    Pause,
    Seek(f64),
    /// Seek-bar drag, debounced on embedded backends
    Scrub(f64),
    SetVolume(f64),
    SetMuted(bool),
    SetPlaybackRate(f64),
    CurrentTime(oneshot::Sender<f64>),
    Volume(oneshot::Sender<f64>),
    PlaybackRate(oneshot::Sender<f64>),
}

/// Identity of the adapter currently holding the slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActiveBackend {
    pub generation: u64,
    pub kind: BackendKind,
}

#[derive(Debug)]
struct AdapterPort {
    active: ActiveBackend,
    tx: mpsc::UnboundedSender<PlaybackCommand>,
}

#[derive(Debug, Clone, Default)]
pub struct ControlContext {
    slot: Arc<RwLock<Option<AdapterPort>>>,
}

impl ControlContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for an adapter. Fails if another adapter holds it.
    pub fn register(
        &self,
        generation: u64,
        kind: BackendKind,
    ) -> Result<mpsc::UnboundedReceiver<PlaybackCommand>> {
        let mut slot = self
            .slot
            .write()
            .map_err(|_| Error::Internal("control context poisoned".into()))?;

        if let Some(existing) = slot.as_ref() {
            return Err(Error::Internal(format!(
                "{} adapter (generation {}) is still registered",
                existing.active.kind, existing.active.generation
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *slot = Some(AdapterPort {
            active: ActiveBackend { generation, kind },
            tx,
        });
        debug!(generation, %kind, "Adapter registered");
        Ok(rx)
    }

    /// Release the slot if `generation` still holds it
    pub fn deregister(&self, generation: u64) -> bool {
        let Ok(mut slot) = self.slot.write() else {
            return false;
        };
        match slot.as_ref() {
            Some(port) if port.active.generation == generation => {
                *slot = None;
                debug!(generation, "Adapter deregistered");
                true
            }
            _ => false,
        }
    }

    pub fn active(&self) -> Option<ActiveBackend> {
        self.slot.read().ok()?.as_ref().map(|port| port.active)
    }

    /// Route a command to the live adapter. Returns false when it was dropped.
    pub fn dispatch(&self, command: PlaybackCommand) -> bool {
        let Ok(slot) = self.slot.read() else {
            return false;
        };
        match slot.as_ref() {
            Some(port) => port.tx.send(command).is_ok(),
            None => {
                debug!(?command, "No live adapter, command dropped");
                false
            }
        }
    }

    pub fn play(&self) -> bool {
        self.dispatch(PlaybackCommand::Play)
    }

    pub fn pause(&self) -> bool {
        self.dispatch(PlaybackCommand::Pause)
    }

    pub fn seek(&self, seconds: f64) -> bool {
        self.dispatch(PlaybackCommand::Seek(seconds))
    }

    pub fn scrub(&self, seconds: f64) -> bool {
        self.dispatch(PlaybackCommand::Scrub(seconds))
    }

    pub fn set_volume(&self, volume: f64) -> bool {
        self.dispatch(PlaybackCommand::SetVolume(volume))
    }

    pub fn set_muted(&self, muted: bool) -> bool {
        self.dispatch(PlaybackCommand::SetMuted(muted))
    }

    pub fn set_playback_rate(&self, rate: f64) -> bool {
        self.dispatch(PlaybackCommand::SetPlaybackRate(rate))
    }

    /// Ask the live adapter for its position. `None` when no adapter is live.
    pub async fn current_time(&self) -> Option<f64> {
        self.ask(PlaybackCommand::CurrentTime).await
    }

    /// Volume as the live backend reports it
    pub async fn volume(&self) -> Option<f64> {
        self.ask(PlaybackCommand::Volume).await
    }

    /// Playback rate as the live backend reports it
    pub async fn playback_rate(&self) -> Option<f64> {
        self.ask(PlaybackCommand::PlaybackRate).await
    }

    async fn ask(&self, query: fn(oneshot::Sender<f64>) -> PlaybackCommand) -> Option<f64> {
        let (tx, rx) = oneshot::channel();
        if !self.dispatch(query(tx)) {
            return None;
        }
        rx.await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_one_adapter_registers() {
        let ctx = ControlContext::new();
        let _rx = ctx.register(1, BackendKind::YouTube).unwrap();
        assert!(ctx.register(2, BackendKind::Vimeo).is_err());
        assert_eq!(ctx.active().map(|a| a.generation), Some(1));

        assert!(!ctx.deregister(2));
        assert!(ctx.deregister(1));
        assert!(ctx.active().is_none());
        assert!(ctx.register(2, BackendKind::Vimeo).is_ok());
    }

    #[test]
    fn test_dispatch_without_adapter_is_noop() {
        let ctx = ControlContext::new();
        assert!(!ctx.seek(10.0));
        assert!(!ctx.play());
    }

    #[tokio::test]
    async fn test_commands_reach_registered_port() {
        let ctx = ControlContext::new();
        let mut rx = ctx.register(7, BackendKind::Native).unwrap();
        assert!(ctx.seek(3.5));
        assert!(matches!(rx.recv().await, Some(PlaybackCommand::Seek(t)) if t == 3.5));

        let asker = ctx.clone();
        let pending = tokio::spawn(async move { asker.current_time().await });
        match rx.recv().await {
            Some(PlaybackCommand::CurrentTime(reply)) => reply.send(42.0).unwrap(),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(pending.await.unwrap(), Some(42.0));
    }

    #[test]
    fn test_current_time_waits_for_adapter_reply() {
        use tokio_test::{assert_pending, assert_ready, task};

        let ctx = ControlContext::new();
        let mut rx = ctx.register(3, BackendKind::Hls).unwrap();
        let mut ask = task::spawn(ctx.current_time());
        assert_pending!(ask.poll());

        match rx.try_recv() {
            Ok(PlaybackCommand::CurrentTime(reply)) => reply.send(8.0).unwrap(),
            other => panic!("unexpected {other:?}"),
        }
        assert!(ask.is_woken());
        assert_eq!(assert_ready!(ask.poll()), Some(8.0));
    }

    #[tokio::test]
    async fn test_volume_and_rate_queries_route_to_adapter() {
        let ctx = ControlContext::new();
        assert_eq!(ctx.volume().await, None);
        assert_eq!(ctx.playback_rate().await, None);

        let mut rx = ctx.register(4, BackendKind::Native).unwrap();
        let asker = ctx.clone();
        let pending = tokio::spawn(async move {
            let volume = asker.volume().await;
            (volume, asker.playback_rate().await)
        });
        match rx.recv().await {
            Some(PlaybackCommand::Volume(reply)) => reply.send(0.3).unwrap(),
            other => panic!("unexpected {other:?}"),
        }
        match rx.recv().await {
            Some(PlaybackCommand::PlaybackRate(reply)) => reply.send(2.0).unwrap(),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(pending.await.unwrap(), (Some(0.3), Some(2.0)));
    }
}
