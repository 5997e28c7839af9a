//! In-memory host objects for driving players in tests
#![allow(dead_code)]

use async_trait::async_trait;
use reelkit_core::bindings::{
    DashBitrate, DashInstance, DashSdk, DashSettings, EmbedEvent, EmbedOptions, EmbedSdk,
    EmbeddedPlayer, EventSender, HlsConfig, HlsEvent, HlsInstance, HlsLevel, HlsSdk, MediaElement,
    MediaEvent,
};
use reelkit_core::loader::LoaderConfig;
use reelkit_core::{
    Bindings, Error, PlayerHandle, PlayerOptions, Result, ScriptHost, SdkLoaders, Source,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

// =============================================================================
// Media element
// =============================================================================

#[derive(Default)]
struct MediaInner {
    src: Option<String>,
    paused: bool,
    current_time: f64,
    duration: Option<f64>,
    volume: f64,
    muted: bool,
    rate: f64,
    events: Option<EventSender>,
    bound: Vec<EventSender>,
}

pub struct FakeMedia {
    inner: Mutex<MediaInner>,
    pub refuse_play: AtomicBool,
    pub plays_hls: AtomicBool,
}

impl FakeMedia {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(MediaInner {
                paused: true,
                volume: 1.0,
                rate: 1.0,
                ..Default::default()
            }),
            refuse_play: AtomicBool::new(false),
            plays_hls: AtomicBool::new(false),
        })
    }

    /// Fire an element event at whichever adapter is bound
    pub fn emit(&self, event: MediaEvent) -> bool {
        let sender = self.inner.lock().unwrap().events.clone();
        sender.is_some_and(|s| s.emit(event))
    }

    /// Every sender ever bound, oldest first
    pub fn bound_senders(&self) -> Vec<EventSender> {
        self.inner.lock().unwrap().bound.clone()
    }

    pub fn is_bound(&self) -> bool {
        self.inner.lock().unwrap().events.is_some()
    }

    pub fn src(&self) -> Option<String> {
        self.inner.lock().unwrap().src.clone()
    }

    pub fn set_time(&self, seconds: f64) {
        self.inner.lock().unwrap().current_time = seconds;
    }

    pub fn set_known_duration(&self, duration: f64) {
        self.inner.lock().unwrap().duration = Some(duration);
    }
}

impl MediaElement for FakeMedia {
    fn set_src(&self, src: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.src = Some(src.to_string());
        inner.current_time = 0.0;
        inner.duration = None;
    }

    fn has_src(&self) -> bool {
        self.inner.lock().unwrap().src.is_some()
    }

    fn load(&self) {}

    fn play(&self) -> Result<()> {
        if self.refuse_play.load(Ordering::SeqCst) {
            return Err(Error::Backend("play() requires a user gesture".into()));
        }
        self.inner.lock().unwrap().paused = false;
        self.emit(MediaEvent::Play);
        Ok(())
    }

    fn pause(&self) {
        self.inner.lock().unwrap().paused = true;
        self.emit(MediaEvent::Pause);
    }

    fn paused(&self) -> bool {
        self.inner.lock().unwrap().paused
    }

    fn current_time(&self) -> f64 {
        self.inner.lock().unwrap().current_time
    }

    fn set_current_time(&self, seconds: f64) {
        self.inner.lock().unwrap().current_time = seconds;
        self.emit(MediaEvent::TimeUpdate {
            current_time: seconds,
        });
    }

    fn duration(&self) -> Option<f64> {
        self.inner.lock().unwrap().duration
    }

    fn volume(&self) -> f64 {
        self.inner.lock().unwrap().volume
    }

    fn set_volume(&self, volume: f64) {
        self.inner.lock().unwrap().volume = volume;
    }

    fn muted(&self) -> bool {
        self.inner.lock().unwrap().muted
    }

    fn set_muted(&self, muted: bool) {
        self.inner.lock().unwrap().muted = muted;
    }

    fn playback_rate(&self) -> f64 {
        self.inner.lock().unwrap().rate
    }

    fn set_playback_rate(&self, rate: f64) {
        self.inner.lock().unwrap().rate = rate;
    }

    fn can_play_type(&self, mime: &str) -> bool {
        mime == "application/vnd.apple.mpegurl" && self.plays_hls.load(Ordering::SeqCst)
    }

    fn bind_events(&self, sender: Option<EventSender>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(sender) = &sender {
            inner.bound.push(sender.clone());
        }
        inner.events = sender;
    }
}

// =============================================================================
// HLS
// =============================================================================

pub struct FakeHls {
    events: EventSender,
    pub config: HlsConfig,
    levels: Vec<HlsLevel>,
    pub current_level: Mutex<Option<Option<usize>>>,
    pub audio_track: Mutex<Option<usize>>,
    pub loaded: Mutex<Option<String>>,
    pub start_loads: AtomicUsize,
    pub media_recoveries: AtomicUsize,
    pub destroyed: AtomicBool,
}

impl FakeHls {
    pub fn emit(&self, event: HlsEvent) -> bool {
        self.events.emit(event)
    }
}

impl HlsInstance for FakeHls {
    fn attach_media(&self, _media: &dyn MediaElement) {
        self.events.emit(HlsEvent::MediaAttached);
    }

    fn load_source(&self, url: &str) {
        *self.loaded.lock().unwrap() = Some(url.to_string());
        self.events.emit(HlsEvent::ManifestParsed {
            levels: self.levels.clone(),
        });
    }

    fn levels(&self) -> Vec<HlsLevel> {
        self.levels.clone()
    }

    fn set_current_level(&self, index: Option<usize>) {
        *self.current_level.lock().unwrap() = Some(index);
    }

    fn audio_track(&self) -> Option<usize> {
        *self.audio_track.lock().unwrap()
    }

    fn set_audio_track(&self, index: usize) {
        *self.audio_track.lock().unwrap() = Some(index);
    }

    fn set_subtitle_track(&self, _index: Option<usize>) {}

    fn set_subtitle_display(&self, _enabled: bool) {}

    fn start_load(&self) {
        self.start_loads.fetch_add(1, Ordering::SeqCst);
    }

    fn recover_media_error(&self) {
        self.media_recoveries.fetch_add(1, Ordering::SeqCst);
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

pub struct FakeHlsSdk {
    pub supported: AtomicBool,
    pub levels: Vec<HlsLevel>,
    instances: Mutex<Vec<Arc<FakeHls>>>,
}

impl FakeHlsSdk {
    pub fn with_heights(heights: &[u32]) -> Arc<Self> {
        Arc::new(Self {
            supported: AtomicBool::new(true),
            levels: heights
                .iter()
                .map(|&height| HlsLevel {
                    height,
                    bitrate: u64::from(height) * 3_000,
                })
                .collect(),
            instances: Mutex::new(Vec::new()),
        })
    }

    pub fn instances(&self) -> Vec<Arc<FakeHls>> {
        self.instances.lock().unwrap().clone()
    }

    pub fn last(&self) -> Arc<FakeHls> {
        self.instances().pop().expect("no hls instance created")
    }
}

impl HlsSdk for FakeHlsSdk {
    fn is_supported(&self) -> bool {
        self.supported.load(Ordering::SeqCst)
    }

    fn create(&self, config: HlsConfig, events: EventSender) -> Result<Arc<dyn HlsInstance>> {
        let hls = Arc::new(FakeHls {
            events,
            config,
            levels: self.levels.clone(),
            current_level: Mutex::new(None),
            audio_track: Mutex::new(Some(0)),
            loaded: Mutex::new(None),
            start_loads: AtomicUsize::new(0),
            media_recoveries: AtomicUsize::new(0),
            destroyed: AtomicBool::new(false),
        });
        self.instances.lock().unwrap().push(hls.clone());
        Ok(hls)
    }
}

// =============================================================================
// DASH
// =============================================================================

pub struct FakeDash {
    events: EventSender,
    bitrates: Vec<DashBitrate>,
    pub settings: Mutex<Option<DashSettings>>,
    pub autoplay: Mutex<Option<bool>>,
    pub source: Mutex<Option<String>>,
    pub quality: Mutex<Option<usize>>,
    pub reset: AtomicBool,
}

impl DashInstance for FakeDash {
    fn update_settings(&self, settings: DashSettings) {
        *self.settings.lock().unwrap() = Some(settings);
    }

    fn initialize(&self) {}

    fn set_autoplay(&self, autoplay: bool) {
        *self.autoplay.lock().unwrap() = Some(autoplay);
    }

    fn attach_view(&self, _media: &dyn MediaElement) {}

    fn attach_source(&self, url: &str) {
        *self.source.lock().unwrap() = Some(url.to_string());
    }

    fn bitrates(&self) -> Vec<DashBitrate> {
        self.bitrates.clone()
    }

    fn set_quality_for_video(&self, quality_index: usize) {
        *self.quality.lock().unwrap() = Some(quality_index);
    }

    fn reset(&self) {
        self.reset.store(true, Ordering::SeqCst);
    }
}

pub struct FakeDashSdk {
    pub bitrates: Vec<DashBitrate>,
    instances: Mutex<Vec<Arc<FakeDash>>>,
}

impl FakeDashSdk {
    pub fn with_heights(heights: &[u32]) -> Arc<Self> {
        Arc::new(Self {
            bitrates: heights
                .iter()
                .enumerate()
                .map(|(quality_index, &height)| DashBitrate {
                    quality_index,
                    bitrate: u64::from(height) * 2_500,
                    width: height * 16 / 9,
                    height,
                })
                .collect(),
            instances: Mutex::new(Vec::new()),
        })
    }

    pub fn last(&self) -> Arc<FakeDash> {
        self.instances
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no dash instance created")
    }
}

impl DashSdk for FakeDashSdk {
    fn create(&self, events: EventSender) -> Result<Arc<dyn DashInstance>> {
        let dash = Arc::new(FakeDash {
            events,
            bitrates: self.bitrates.clone(),
            settings: Mutex::new(None),
            autoplay: Mutex::new(None),
            source: Mutex::new(None),
            quality: Mutex::new(None),
            reset: AtomicBool::new(false),
        });
        self.instances.lock().unwrap().push(dash.clone());
        Ok(dash)
    }
}

// =============================================================================
// Embedded players
// =============================================================================

pub struct FakeEmbedPlayer {
    events: EventSender,
    pub options: EmbedOptions,
    time: Mutex<f64>,
    paused: AtomicBool,
    volume: Mutex<f64>,
    rate: Mutex<f64>,
    pub seeks: Mutex<Vec<f64>>,
    pub plays: AtomicUsize,
    pub destroyed: AtomicBool,
}

impl FakeEmbedPlayer {
    pub fn emit(&self, event: EmbedEvent) -> bool {
        self.events.emit(event)
    }

    pub fn set_time(&self, seconds: f64) {
        *self.time.lock().unwrap() = seconds;
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.seeks.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddedPlayer for FakeEmbedPlayer {
    async fn play(&self) -> Result<()> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        self.events.emit(EmbedEvent::Play);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.paused.store(true, Ordering::SeqCst);
        self.events.emit(EmbedEvent::Pause);
        Ok(())
    }

    async fn seek_to(&self, seconds: f64) -> Result<()> {
        self.seeks.lock().unwrap().push(seconds);
        *self.time.lock().unwrap() = seconds;
        Ok(())
    }

    async fn current_time(&self) -> Result<f64> {
        Ok(*self.time.lock().unwrap())
    }

    async fn duration(&self) -> Result<f64> {
        Ok(120.0)
    }

    async fn paused(&self) -> Result<bool> {
        Ok(self.paused.load(Ordering::SeqCst))
    }

    async fn volume(&self) -> Result<f64> {
        Ok(*self.volume.lock().unwrap())
    }

    async fn set_volume(&self, volume: f64) -> Result<()> {
        *self.volume.lock().unwrap() = volume;
        Ok(())
    }

    async fn set_muted(&self, _muted: bool) -> Result<()> {
        Ok(())
    }

    async fn playback_rate(&self) -> Result<f64> {
        Ok(*self.rate.lock().unwrap())
    }

    async fn set_playback_rate(&self, rate: f64) -> Result<()> {
        *self.rate.lock().unwrap() = rate;
        Ok(())
    }

    async fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeEmbedSdk {
    players: Mutex<Vec<Arc<FakeEmbedPlayer>>>,
}

impl FakeEmbedSdk {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn players(&self) -> Vec<Arc<FakeEmbedPlayer>> {
        self.players.lock().unwrap().clone()
    }

    pub fn last(&self) -> Arc<FakeEmbedPlayer> {
        self.players().pop().expect("no embedded player created")
    }
}

#[async_trait]
impl EmbedSdk for FakeEmbedSdk {
    async fn create_player(
        &self,
        options: EmbedOptions,
        events: EventSender,
    ) -> Result<Arc<dyn EmbeddedPlayer>> {
        let player = Arc::new(FakeEmbedPlayer {
            events,
            options,
            time: Mutex::new(0.0),
            paused: AtomicBool::new(true),
            volume: Mutex::new(0.8),
            rate: Mutex::new(1.0),
            seeks: Mutex::new(Vec::new()),
            plays: AtomicUsize::new(0),
            destroyed: AtomicBool::new(false),
        });
        self.players.lock().unwrap().push(player.clone());
        Ok(player)
    }
}

// =============================================================================
// Script host
// =============================================================================

/// Script host whose global appears once a script is injected
pub struct FakeScriptHost<T> {
    sdk: T,
    present: AtomicBool,
    pub fail: AtomicBool,
    /// Inject succeeds but the global never appears
    pub withhold: AtomicBool,
    pub injects: AtomicUsize,
}

impl<T> FakeScriptHost<T> {
    pub fn new(sdk: T) -> Arc<Self> {
        Arc::new(Self {
            sdk,
            present: AtomicBool::new(false),
            fail: AtomicBool::new(false),
            withhold: AtomicBool::new(false),
            injects: AtomicUsize::new(0),
        })
    }

    pub fn injects(&self) -> usize {
        self.injects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T> ScriptHost<T> for FakeScriptHost<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn inject(&self, url: &Url) -> Result<()> {
        self.injects.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::script_load(url.as_str(), "network unreachable"));
        }
        self.present.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resolve_global(&self, _name: &str) -> Option<T> {
        if self.withhold.load(Ordering::SeqCst) {
            return None;
        }
        self.present
            .load(Ordering::SeqCst)
            .then(|| self.sdk.clone())
    }
}

// =============================================================================
// Rig
// =============================================================================

/// One process worth of host objects
pub struct Rig {
    pub media: Arc<FakeMedia>,
    pub hls: Arc<FakeHlsSdk>,
    pub dash: Arc<FakeDashSdk>,
    pub youtube: Arc<FakeEmbedSdk>,
    pub vimeo: Arc<FakeEmbedSdk>,
    pub hls_host: Arc<FakeScriptHost<Arc<dyn HlsSdk>>>,
    pub dash_host: Arc<FakeScriptHost<Arc<dyn DashSdk>>>,
    pub youtube_host: Arc<FakeScriptHost<Arc<dyn EmbedSdk>>>,
    pub vimeo_host: Arc<FakeScriptHost<Arc<dyn EmbedSdk>>>,
    pub sdks: Arc<SdkLoaders>,
}

impl Rig {
    pub fn new() -> Self {
        let hls = FakeHlsSdk::with_heights(&[360, 720, 1080]);
        let dash = FakeDashSdk::with_heights(&[360, 720, 1080]);
        let youtube = FakeEmbedSdk::new();
        let vimeo = FakeEmbedSdk::new();

        let hls_host = FakeScriptHost::new(hls.clone() as Arc<dyn HlsSdk>);
        let dash_host = FakeScriptHost::new(dash.clone() as Arc<dyn DashSdk>);
        let youtube_host = FakeScriptHost::new(youtube.clone() as Arc<dyn EmbedSdk>);
        let vimeo_host = FakeScriptHost::new(vimeo.clone() as Arc<dyn EmbedSdk>);

        let sdks = SdkLoaders::builder()
            .hls(hls_host.clone())
            .dash(dash_host.clone())
            .youtube(youtube_host.clone())
            .vimeo(vimeo_host.clone())
            .config(LoaderConfig {
                timeout: Duration::from_millis(500),
                poll_interval: Duration::from_millis(5),
            })
            .build();

        Self {
            media: FakeMedia::new(),
            hls,
            dash,
            youtube,
            vimeo,
            hls_host,
            dash_host,
            youtube_host,
            vimeo_host,
            sdks: Arc::new(sdks),
        }
    }

    pub fn bindings(&self) -> Bindings {
        Bindings::new(self.sdks.clone()).with_media(self.media.clone())
    }

    pub fn mount(&self, options: PlayerOptions, sources: Vec<Source>) -> PlayerHandle {
        PlayerHandle::spawn(self.bindings(), options, sources).expect("mount")
    }

    /// Mount and wait for the first attach to settle
    pub async fn mount_settled(&self, options: PlayerOptions, sources: Vec<Source>) -> PlayerHandle {
        let player = self.mount(options, sources);
        player.flush().await.expect("flush");
        player
    }
}

/// Three progressive renditions, deliberately out of order
pub fn ladder() -> Vec<Source> {
    vec![
        Source::new("https://cdn.test/clip_480.mp4").with_label("480p"),
        Source::new("https://cdn.test/clip_1080.mp4").with_label("1080p"),
        Source::new("https://cdn.test/clip_720.mp4").with_label("720p"),
    ]
}
