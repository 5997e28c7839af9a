use super::{AdapterContext, AdapterSignal};
use crate::bindings::{MediaElement, MediaEvent};
use crate::error::Result;
use crate::state::{DeltaSink, StateDelta, StateError, StateErrorKind};
use crate::types::BackendKind;
use std::sync::Arc;
use tracing::debug;

/// Media element wiring shared by the native, HLS and DASH adapters
pub(super) struct MediaBridge {
    media: Arc<dyn MediaElement>,
    sink: DeltaSink,
}

impl MediaBridge {
    /// Run the init hook, restore user settings and start routing events
    pub(super) fn bind(kind: BackendKind, ctx: &AdapterContext) -> Result<Self> {
        let media = ctx.require_media(kind)?;

        if let Some(hook) = &ctx.options.hooks.on_init {
            hook(media.as_ref());
        }

        let state = ctx.sink.snapshot();
        media.set_muted(state.muted);
        media.set_volume(state.volume);
        media.set_playback_rate(state.playback_rate);
        media.bind_events(Some(ctx.events.clone()));

        Ok(Self {
            media,
            sink: ctx.sink.clone(),
        })
    }

    pub(super) fn release(&self) {
        self.media.bind_events(None);
    }

    /// Mirror one element event into the store
    pub(super) fn translate(&self, event: MediaEvent) -> Option<AdapterSignal> {
        let mut signal = None;
        let delta = match event {
            MediaEvent::Play => StateDelta::default().paused(false).ended(false),
            MediaEvent::Pause => StateDelta::default().paused(true),
            MediaEvent::Playing => StateDelta::default().paused(false).buffering(false),
            MediaEvent::Waiting => StateDelta::default().buffering(true),
            MediaEvent::CanPlay => {
                signal = Some(AdapterSignal::Ready);
                StateDelta::default().buffering(false)
            }
            MediaEvent::LoadedMetadata { duration } | MediaEvent::DurationChange { duration } => {
                match valid_duration(duration) {
                    Some(d) => StateDelta::default().duration(d),
                    None => return None,
                }
            }
            MediaEvent::LoadedData => return None,
            MediaEvent::TimeUpdate { current_time } => {
                StateDelta::default().current_time(current_time)
            }
            MediaEvent::Progress { buffered_end } => match self.buffered_fraction(buffered_end) {
                Some(fraction) => StateDelta::default().buffered(fraction),
                None => return None,
            },
            MediaEvent::VolumeChange { volume, muted } => {
                StateDelta::default().volume(volume).muted(muted)
            }
            MediaEvent::RateChange { rate } => StateDelta::default().playback_rate(rate),
            MediaEvent::Seeking => StateDelta::default().seeking(true),
            MediaEvent::Seeked => StateDelta::default().seeking(false),
            MediaEvent::Ended => StateDelta::default().ended(true).paused(true),
            MediaEvent::Error { message } => StateDelta::default()
                .buffering(false)
                .error(Some(StateError::new(StateErrorKind::Backend, message))),
        };
        self.sink.apply(delta);
        signal
    }

    fn buffered_fraction(&self, buffered_end: f64) -> Option<f64> {
        let duration = self
            .media
            .duration()
            .and_then(valid_duration)
            .or_else(|| valid_duration(self.sink.snapshot().duration))?;
        Some((buffered_end / duration).clamp(0.0, 1.0))
    }

    pub(super) fn play(&self) -> Result<()> {
        self.media.play().inspect_err(|e| {
            debug!(error = %e, "Media element refused play");
        })
    }

    pub(super) fn pause(&self) {
        self.media.pause();
    }

    pub(super) fn seek_to(&self, seconds: f64) {
        self.media.set_current_time(seconds);
    }

    pub(super) fn current_time(&self) -> f64 {
        self.media.current_time()
    }

    pub(super) fn set_volume(&self, volume: f64) {
        self.media.set_volume(volume);
    }

    pub(super) fn volume(&self) -> f64 {
        self.media.volume()
    }

    pub(super) fn set_muted(&self, muted: bool) {
        self.media.set_muted(muted);
    }

    pub(super) fn set_playback_rate(&self, rate: f64) {
        self.media.set_playback_rate(rate);
    }

    pub(super) fn playback_rate(&self) -> f64 {
        self.media.playback_rate()
    }
}

fn valid_duration(duration: f64) -> Option<f64> {
    (duration.is_finite() && duration > 0.0).then_some(duration)
}
