//! Player Session - the controller behind one mounted player
//!
//! Coordinates:
//! - Source selection and adapter attach/teardown
//! - Routing backend events and playback commands to the live adapter
//! - Quality, audio and subtitle reconciliation
//! - Resume after a backend is recreated
//!
//! The session runs as a single task. Everything that touches the live
//! adapter happens on it, so adapter lifecycles never interleave.

use crate::adapter::{create_adapter, Adapter, AdapterContext, AdapterSignal};
use crate::bindings::{BackendEvent, EventSender, MediaElement};
use crate::classify::classify;
use crate::context::{ControlContext, PlaybackCommand};
use crate::error::Result;
use crate::loader::SdkLoaders;
use crate::options::PlayerOptions;
use crate::reconcile::{
    audio_switch_supported, capture_resume, plan_quality_change, select_initial, QualityPlan,
    ResumePoint,
};
use crate::state::{DeltaSink, PlaybackStore, StateDelta, StateError};
use crate::types::{BackendKind, PlayerId, Source};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

/// Host objects a player renders through
#[derive(Clone)]
pub struct Bindings {
    /// Media element for the native, HLS and DASH backends
    pub media: Option<Arc<dyn MediaElement>>,
    /// SDK loaders, shared by every player in the process
    pub sdks: Arc<SdkLoaders>,
}

impl Bindings {
    pub fn new(sdks: Arc<SdkLoaders>) -> Self {
        Self { media: None, sdks }
    }

    pub fn with_media(mut self, media: Arc<dyn MediaElement>) -> Self {
        self.media = Some(media);
        self
    }
}

/// Reconciliation requests handled by the session
#[derive(Debug)]
pub(crate) enum ControlCommand {
    Load(Vec<Source>),
    SetQuality(String),
    SetAudioTrack(String),
    SetSubtitle(Option<String>),
    Flush(oneshot::Sender<()>),
    Unmount,
}

/// Result of a spawned attach, handed back to the session
struct Attached {
    generation: u64,
    adapter: Box<dyn Adapter>,
    result: Result<()>,
}

/// Adapter requested most recently, attaching or waiting to
struct Attaching {
    generation: u64,
    kind: BackendKind,
    sink: DeltaSink,
    events: mpsc::UnboundedReceiver<BackendEvent>,
    /// Not started yet: an older attach still owns the element
    queued: Option<(Box<dyn Adapter>, Source)>,
}

/// The one adapter allowed to drive playback
struct Live {
    generation: u64,
    kind: BackendKind,
    adapter: Box<dyn Adapter>,
    sink: DeltaSink,
    events: mpsc::UnboundedReceiver<BackendEvent>,
    port: mpsc::UnboundedReceiver<PlaybackCommand>,
    ready: bool,
}

impl Live {
    fn has_pending(&self) -> bool {
        !self.events.is_empty() || !self.port.is_empty()
    }
}

enum LiveInput {
    Event(BackendEvent),
    Command(PlaybackCommand),
}

/// Player session managing one mounted player
pub(crate) struct PlayerSession {
    id: PlayerId,
    store: Arc<PlaybackStore>,
    context: ControlContext,
    bindings: Bindings,
    options: Arc<PlayerOptions>,
    /// Current source list, immutable between loads
    sources: Vec<Source>,
    manual_abr: bool,
    generation: u64,
    live: Option<Live>,
    attaching: Option<Attaching>,
    /// Generation of the one attach task running, superseded or not
    in_flight: Option<u64>,
    /// Position and intent to restore on the next first ready
    resume: Option<ResumePoint>,
    flush_waiters: Vec<oneshot::Sender<()>>,
    commands: mpsc::UnboundedReceiver<ControlCommand>,
    attached_tx: mpsc::UnboundedSender<Attached>,
    attached_rx: mpsc::UnboundedReceiver<Attached>,
}

impl PlayerSession {
    pub(crate) fn new(
        id: PlayerId,
        store: Arc<PlaybackStore>,
        context: ControlContext,
        bindings: Bindings,
        options: Arc<PlayerOptions>,
        commands: mpsc::UnboundedReceiver<ControlCommand>,
    ) -> Self {
        let (attached_tx, attached_rx) = mpsc::unbounded_channel();
        Self {
            id,
            store,
            context,
            bindings,
            options,
            sources: Vec::new(),
            manual_abr: false,
            generation: 0,
            live: None,
            attaching: None,
            in_flight: None,
            resume: None,
            flush_waiters: Vec::new(),
            commands,
            attached_tx,
            attached_rx,
        }
    }

    /// Run until unmounted or every handle is gone
    pub(crate) async fn run(mut self) {
        info!(player = %self.id, "Player session started");
        loop {
            tokio::select! {
                biased;
                Some(attached) = self.attached_rx.recv() => self.finish_attach(attached).await,
                input = next_live_input(&mut self.live) => match input {
                    LiveInput::Event(event) => self.on_event(event).await,
                    LiveInput::Command(command) => self.on_playback(command).await,
                },
                command = self.commands.recv() => match command {
                    Some(ControlCommand::Unmount) | None => break,
                    Some(command) => self.on_control(command).await,
                },
            }
            self.release_flushes();
        }
        self.shutdown().await;
    }

    async fn on_control(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Load(sources) => self.load(sources).await,
            ControlCommand::SetQuality(label) => self.set_quality(label).await,
            ControlCommand::SetAudioTrack(lang) => self.set_audio_track(lang),
            ControlCommand::SetSubtitle(lang) => self.set_subtitle(lang),
            ControlCommand::Flush(done) => self.flush_waiters.push(done),
            ControlCommand::Unmount => {}
        }
    }

    /// Resolve flushes once no attach is running and the live adapter is drained
    fn release_flushes(&mut self) {
        if self.flush_waiters.is_empty() || self.attaching.is_some() || self.in_flight.is_some() {
            return;
        }
        if self.live.as_ref().is_some_and(Live::has_pending) {
            return;
        }
        for done in self.flush_waiters.drain(..) {
            let _ = done.send(());
        }
    }

    /// Replace the source list and attach the initial backend
    #[instrument(skip(self, sources), fields(player = %self.id, sources = sources.len()))]
    async fn load(&mut self, sources: Vec<Source>) {
        self.retire_attaching();
        self.retire_live().await;
        self.resume = None;
        self.store.reset_media(self.options.subtitles.clone());
        self.sources = sources;

        let selection = match select_initial(&self.sources, &self.options) {
            Ok(selection) => selection,
            Err(e) => {
                warn!(error = %e, "Source list rejected");
                self.manual_abr = false;
                self.store
                    .apply(StateDelta::default().error(Some(StateError::from(&e))));
                return;
            }
        };

        self.manual_abr = selection.manual_abr;
        if let Some(qualities) = selection.qualities {
            self.store.apply(
                StateDelta::default()
                    .qualities(qualities)
                    .current_quality(selection.current_quality),
            );
        }
        self.begin_attach(selection.source, selection.kind);
    }

    #[instrument(skip(self), fields(player = %self.id))]
    async fn set_quality(&mut self, label: String) {
        let state = self.store.snapshot();
        let levels = self
            .live
            .as_ref()
            .map(|live| live.adapter.qualities())
            .unwrap_or_default();

        match plan_quality_change(&state, &self.sources, self.manual_abr, &levels, &label) {
            QualityPlan::Unchanged => debug!("Quality already selected"),
            QualityPlan::Unknown => warn!("Quality not offered, ignored"),
            QualityPlan::InPlace => {
                let Some(live) = &self.live else {
                    debug!("No live backend, in-place quality change dropped");
                    return;
                };
                match live.adapter.switch_quality(&label) {
                    Ok(true) => {
                        live.sink
                            .apply(StateDelta::default().current_quality(Some(label.clone())));
                        info!(%label, "Quality switched in place");
                    }
                    Ok(false) => debug!("Backend no longer offers this level"),
                    Err(e) => warn!(error = %e, "In-place quality switch failed"),
                }
            }
            QualityPlan::Recreate(source) => {
                let position = match &self.live {
                    Some(live) => live
                        .adapter
                        .current_time()
                        .await
                        .unwrap_or(state.current_time),
                    None => state.current_time,
                };
                let resume = capture_resume(self.resume.take(), position, state.paused);

                self.retire_attaching();
                self.retire_live().await;
                self.store
                    .apply(StateDelta::default().current_quality(Some(label.clone())));

                let kind = classify(&source);
                self.begin_attach(source, kind);
                self.resume = Some(resume);
                info!(
                    %label,
                    position = resume.position,
                    paused = resume.paused,
                    "Quality switch recreates backend"
                );
            }
        }
    }

    #[instrument(skip(self), fields(player = %self.id))]
    fn set_audio_track(&mut self, lang: String) {
        let Some(live) = &self.live else {
            debug!("No live backend, audio change dropped");
            return;
        };
        if !audio_switch_supported(live.kind) {
            debug!(kind = %live.kind, "Audio switching needs the HLS backend");
            return;
        }
        if self.store.snapshot().current_audio.as_deref() == Some(lang.as_str()) {
            return;
        }
        match live.adapter.switch_audio_track(&lang) {
            Ok(true) => {
                live.sink
                    .apply(StateDelta::default().current_audio(Some(lang.clone())));
                info!(%lang, "Audio track switched");
            }
            Ok(false) => warn!("Audio track not offered, ignored"),
            Err(e) => warn!(error = %e, "Audio track switch failed"),
        }
    }

    fn set_subtitle(&mut self, lang: Option<String>) {
        if let Some(lang) = &lang {
            let offered = self
                .store
                .snapshot()
                .subtitles
                .iter()
                .any(|track| &track.lang == lang);
            if !offered {
                warn!(%lang, "Subtitle track not offered, ignored");
                return;
            }
        }
        debug!(?lang, "Subtitle selected");
        self.store.apply(StateDelta::default().current_subtitle(lang));
    }

    /// Request a fresh adapter generation. It attaches in the background
    /// once no older attach is running.
    fn begin_attach(&mut self, source: Source, kind: BackendKind) {
        self.generation += 1;
        let generation = self.generation;

        let sink = DeltaSink::new(self.store.clone(), generation);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let ctx = AdapterContext {
            sink: sink.clone(),
            events: EventSender::new(event_tx, sink.liveness().clone()),
            media: self.bindings.media.clone(),
            sdks: self.bindings.sdks.clone(),
            options: self.options.clone(),
            manual_abr: self.manual_abr,
            selected_quality: self.store.snapshot().current_quality,
        };
        let adapter = create_adapter(kind, ctx);

        info!(generation, %kind, file = %source.file, "Attaching backend");
        self.attaching = Some(Attaching {
            generation,
            kind,
            sink,
            events: event_rx,
            queued: Some((adapter, source)),
        });
        self.start_queued_attach();
    }

    /// Spawn the requested attach unless an older one still runs.
    /// Attaches never overlap, so only one adapter touches the element.
    fn start_queued_attach(&mut self) {
        if let Some(running) = self.in_flight {
            debug!(running, "Attach queued behind in-flight attach");
            return;
        }
        let Some(attaching) = self.attaching.as_mut() else {
            return;
        };
        let Some((mut adapter, source)) = attaching.queued.take() else {
            return;
        };
        let generation = attaching.generation;
        self.in_flight = Some(generation);
        let attached_tx = self.attached_tx.clone();

        tokio::spawn(async move {
            let result = adapter.attach(&source).await;
            let attached = Attached {
                generation,
                adapter,
                result,
            };
            if let Err(mpsc::error::SendError(mut orphan)) = attached_tx.send(attached) {
                orphan.adapter.teardown().await;
            }
        });
    }

    async fn finish_attach(&mut self, mut attached: Attached) {
        if self.in_flight == Some(attached.generation) {
            self.in_flight = None;
        }
        let pending = match self.attaching.take() {
            Some(pending) if pending.generation == attached.generation => pending,
            other => {
                self.attaching = other;
                debug!(generation = attached.generation, "Stale attach finished, tearing down");
                attached.adapter.teardown().await;
                self.start_queued_attach();
                return;
            }
        };

        if let Err(e) = attached.result {
            warn!(
                generation = pending.generation,
                code = e.error_code(),
                recoverable = e.is_recoverable(),
                error = %e,
                "Backend attach failed"
            );
            pending.sink.fail(&e);
            pending.sink.retire();
            attached.adapter.teardown().await;
            self.resume = None;
            return;
        }

        let port = match self.context.register(pending.generation, pending.kind) {
            Ok(port) => port,
            Err(e) => {
                warn!(error = %e, "Control context refused registration");
                pending.sink.fail(&e);
                pending.sink.retire();
                attached.adapter.teardown().await;
                return;
            }
        };

        info!(generation = pending.generation, kind = %pending.kind, "Backend live");
        let embedded = pending.kind.is_embedded();
        self.live = Some(Live {
            generation: pending.generation,
            kind: pending.kind,
            adapter: attached.adapter,
            sink: pending.sink,
            events: pending.events,
            port,
            ready: false,
        });

        // Embeds only resolve once their player is ready
        if embedded {
            self.on_ready().await;
        }
    }

    async fn on_event(&mut self, event: BackendEvent) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        if !live.sink.is_live() {
            debug!(generation = live.generation, "Event from retired adapter dropped");
            return;
        }
        let generation = live.generation;
        let outcome = live.adapter.handle_event(event).await;
        match outcome {
            Ok(Some(AdapterSignal::Ready)) => self.on_ready().await,
            Ok(None) => {}
            Err(e) => {
                warn!(generation, code = e.error_code(), error = %e, "Backend reported an error");
                if let Some(live) = &self.live {
                    live.sink.fail(&e);
                }
            }
        }
    }

    /// First ready of a live adapter: resume a switch, or autoplay
    async fn on_ready(&mut self) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        if live.ready {
            return;
        }
        live.ready = true;

        if let Some(resume) = self.resume.take() {
            if let Err(e) = live.adapter.seek_to(resume.position).await {
                warn!(error = %e, "Resume seek failed");
            }
            let intent = if resume.paused {
                live.adapter.pause().await
            } else {
                live.adapter.play().await
            };
            if let Err(e) = intent {
                warn!(error = %e, "Could not restore play intent");
            }
            info!(
                position = resume.position,
                paused = resume.paused,
                "Resumed after backend switch"
            );
        } else if self.options.config.autoplay {
            if let Err(e) = live.adapter.play().await {
                warn!(error = %e, "Autoplay refused, user must interact first");
            }
        }
    }

    async fn on_playback(&mut self, command: PlaybackCommand) {
        let Some(live) = self.live.as_ref() else {
            return;
        };
        let adapter = &live.adapter;
        let result = match command {
            PlaybackCommand::Play => adapter.play().await,
            PlaybackCommand::Pause => adapter.pause().await,
            PlaybackCommand::Seek(seconds) => adapter.seek_to(seconds).await,
            PlaybackCommand::Scrub(seconds) => adapter.scrub_to(seconds).await,
            PlaybackCommand::SetVolume(volume) => adapter.set_volume(volume).await,
            PlaybackCommand::SetMuted(muted) => adapter.set_muted(muted).await,
            PlaybackCommand::SetPlaybackRate(rate) => adapter.set_playback_rate(rate).await,
            PlaybackCommand::CurrentTime(reply) => {
                adapter.current_time().await.map(|seconds| {
                    let _ = reply.send(seconds);
                })
            }
            PlaybackCommand::Volume(reply) => adapter.volume().await.map(|volume| {
                let _ = reply.send(volume);
            }),
            PlaybackCommand::PlaybackRate(reply) => adapter.playback_rate().await.map(|rate| {
                let _ = reply.send(rate);
            }),
        };
        if let Err(e) = result {
            warn!(kind = %live.kind, error = %e, "Playback command failed");
        }
    }

    fn retire_attaching(&mut self) {
        if let Some(pending) = self.attaching.take() {
            pending.sink.retire();
            debug!(
                generation = pending.generation,
                started = pending.queued.is_none(),
                "Pending attach cancelled"
            );
        }
    }

    /// Tear the live adapter down. Its liveness is revoked first, so nothing
    /// it emits afterwards reaches the store.
    async fn retire_live(&mut self) {
        if let Some(mut live) = self.live.take() {
            live.sink.retire();
            self.context.deregister(live.generation);
            live.adapter.teardown().await;
            info!(generation = live.generation, kind = %live.kind, "Backend torn down");
        }
    }

    async fn shutdown(&mut self) {
        self.retire_attaching();
        self.retire_live().await;
        for done in self.flush_waiters.drain(..) {
            let _ = done.send(());
        }
        info!(player = %self.id, "Player unmounted");
    }
}

async fn next_live_input(live: &mut Option<Live>) -> LiveInput {
    let Some(live) = live.as_mut() else {
        return std::future::pending().await;
    };
    tokio::select! {
        biased;
        Some(event) = live.events.recv() => LiveInput::Event(event),
        Some(command) = live.port.recv() => LiveInput::Command(command),
        else => std::future::pending().await,
    }
}
