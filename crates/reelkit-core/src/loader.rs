//! External script loader
//!
//! Third-party SDKs are fetched lazily and exactly once per URL. Concurrent
//! and repeated loads for the same URL share one fetch and one resolved
//! handle. A failed load is not memoized, so a later attach can retry.

use crate::bindings::{DashSdk, EmbedSdk, HlsSdk};
use crate::error::{Error, Result};
use crate::types::PlayerConfig;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const HLS_GLOBAL: &str = "Hls";
pub const DASH_GLOBAL: &str = "dashjs";
pub const YOUTUBE_GLOBAL: &str = "YT";
pub const VIMEO_GLOBAL: &str = "Vimeo";

const YOUTUBE_API_URL: &str = "https://www.youtube.com/iframe_api";
const VIMEO_API_URL: &str = "https://player.vimeo.com/api/player.js";

/// One of the SDK scripts the adapters depend on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdkScript {
    Hls { version: String },
    Dash { version: String },
    YouTube,
    Vimeo,
}

impl SdkScript {
    /// Every script, with versions pinned from `config`
    pub fn all(config: &PlayerConfig) -> Vec<SdkScript> {
        vec![
            SdkScript::Hls {
                version: config.hls_version.clone(),
            },
            SdkScript::Dash {
                version: config.dash_version.clone(),
            },
            SdkScript::YouTube,
            SdkScript::Vimeo,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            SdkScript::Hls { .. } => "hls.js",
            SdkScript::Dash { .. } => "dash.js",
            SdkScript::YouTube => "youtube",
            SdkScript::Vimeo => "vimeo",
        }
    }

    /// Global the script populates once evaluated
    pub fn global(&self) -> &'static str {
        match self {
            SdkScript::Hls { .. } => HLS_GLOBAL,
            SdkScript::Dash { .. } => DASH_GLOBAL,
            SdkScript::YouTube => YOUTUBE_GLOBAL,
            SdkScript::Vimeo => VIMEO_GLOBAL,
        }
    }

    /// Script URL. CDN packages resolve as `<cdn>/<package>@<version>/<dist-file>`.
    pub fn url(&self, cdn_base: &str) -> Result<Url> {
        let raw = match self {
            SdkScript::Hls { version } => cdn_url(cdn_base, "hls.js", version, "dist/hls.min.js"),
            SdkScript::Dash { version } => {
                cdn_url(cdn_base, "dashjs", version, "dist/dash.all.min.js")
            }
            SdkScript::YouTube => YOUTUBE_API_URL.to_string(),
            SdkScript::Vimeo => VIMEO_API_URL.to_string(),
        };
        Url::parse(&raw).map_err(|e| Error::InvalidConfig(format!("script url {raw}: {e}")))
    }
}

fn cdn_url(cdn_base: &str, package: &str, version: &str, file: &str) -> String {
    let version = if version.trim().is_empty() {
        "latest"
    } else {
        version.trim()
    };
    format!("{}/{package}@{version}/{file}", cdn_base.trim_end_matches('/'))
}

/// Where scripts actually get evaluated
#[async_trait]
pub trait ScriptHost<T>: Send + Sync {
    /// Fetch and evaluate the script at `url`. This is the one network fetch.
    async fn inject(&self, url: &Url) -> Result<()>;

    /// Read the global the script defines, once populated
    fn resolve_global(&self, name: &str) -> Option<T>;
}

/// Host used when no binding was supplied for an SDK
pub struct MissingHost<T>(PhantomData<fn() -> T>);

impl<T> Default for MissingHost<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

#[async_trait]
impl<T> ScriptHost<T> for MissingHost<T> {
    async fn inject(&self, url: &Url) -> Result<()> {
        Err(Error::script_load(url.as_str(), "no script host bound"))
    }

    fn resolve_global(&self, _name: &str) -> Option<T> {
        None
    }
}

/// Bounded wait for a global to appear after injection
#[derive(Debug, Clone, Copy)]
pub struct LoaderConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig::from(&PlayerConfig::default())
    }
}

impl From<&PlayerConfig> for LoaderConfig {
    fn from(config: &PlayerConfig) -> Self {
        Self {
            timeout: config.script_timeout(),
            poll_interval: config.script_poll_interval(),
        }
    }
}

/// Memoizing loader for one SDK type.
///
/// The wait for a global is bounded by the [`LoaderConfig`] of the caller
/// that starts the fetch. Callers joining a fetch already in flight share
/// its wait. `config` is the bound for plain [`ScriptLoader::load`] calls.
pub struct ScriptLoader<T> {
    host: Arc<dyn ScriptHost<T>>,
    cells: Mutex<HashMap<Url, Arc<OnceCell<T>>>>,
    config: LoaderConfig,
}

impl<T> ScriptLoader<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(host: Arc<dyn ScriptHost<T>>) -> Self {
        Self {
            host,
            cells: Mutex::new(HashMap::new()),
            config: LoaderConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Load `url` and resolve `global`, sharing the result with every other caller
    pub async fn load(&self, url: &Url, global: &str) -> Result<T> {
        self.load_with(url, global, self.config).await
    }

    /// Like [`ScriptLoader::load`], with `config` bounding a fetch this call starts
    #[instrument(skip(self, url, config), fields(url = %url, timeout_ms = config.timeout.as_millis() as u64))]
    pub async fn load_with(&self, url: &Url, global: &str, config: LoaderConfig) -> Result<T> {
        let cell = {
            let mut cells = self.cells.lock().await;
            cells.entry(url.clone()).or_default().clone()
        };

        if let Some(sdk) = cell.get() {
            debug!("Script already loaded");
            return Ok(sdk.clone());
        }

        cell.get_or_try_init(|| self.fetch(url, global, config))
            .await
            .cloned()
    }

    /// Load one of the known SDK scripts from the player's CDN, waiting
    /// as long as that player's config allows
    pub async fn load_script(&self, script: &SdkScript, config: &PlayerConfig) -> Result<T> {
        let url = script.url(&config.cdn_base)?;
        self.load_with(&url, script.global(), LoaderConfig::from(config))
            .await
    }

    /// Whether `url` has resolved successfully
    pub async fn is_loaded(&self, url: &Url) -> bool {
        self.cells
            .lock()
            .await
            .get(url)
            .is_some_and(|cell| cell.initialized())
    }

    async fn fetch(&self, url: &Url, global: &str, config: LoaderConfig) -> Result<T> {
        if let Some(sdk) = self.host.resolve_global(global) {
            debug!(global, "Global already present, skipping fetch");
            return Ok(sdk);
        }

        let started = Instant::now();
        if let Err(e) = self.host.inject(url).await {
            warn!(error = %e, "Script injection failed");
            return Err(e);
        }

        let poll = config.poll_interval;
        let waited = tokio::time::timeout(config.timeout, async {
            loop {
                if let Some(sdk) = self.host.resolve_global(global) {
                    return sdk;
                }
                tokio::time::sleep(poll).await;
            }
        })
        .await;

        match waited {
            Ok(sdk) => {
                info!(
                    global,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Script loaded"
                );
                Ok(sdk)
            }
            Err(_) => {
                warn!(global, "Script global never appeared");
                Err(Error::ScriptTimeout {
                    url: url.to_string(),
                    global: global.to_string(),
                })
            }
        }
    }
}

/// The four SDK loaders, shared by every player in the process
pub struct SdkLoaders {
    pub hls: ScriptLoader<Arc<dyn HlsSdk>>,
    pub dash: ScriptLoader<Arc<dyn DashSdk>>,
    pub youtube: ScriptLoader<Arc<dyn EmbedSdk>>,
    pub vimeo: ScriptLoader<Arc<dyn EmbedSdk>>,
}

impl SdkLoaders {
    pub fn builder() -> SdkLoadersBuilder {
        SdkLoadersBuilder::default()
    }
}

impl Default for SdkLoaders {
    fn default() -> Self {
        SdkLoaders::builder().build()
    }
}

#[derive(Default)]
pub struct SdkLoadersBuilder {
    hls: Option<Arc<dyn ScriptHost<Arc<dyn HlsSdk>>>>,
    dash: Option<Arc<dyn ScriptHost<Arc<dyn DashSdk>>>>,
    youtube: Option<Arc<dyn ScriptHost<Arc<dyn EmbedSdk>>>>,
    vimeo: Option<Arc<dyn ScriptHost<Arc<dyn EmbedSdk>>>>,
    config: LoaderConfig,
}

impl SdkLoadersBuilder {
    pub fn hls(mut self, host: Arc<dyn ScriptHost<Arc<dyn HlsSdk>>>) -> Self {
        self.hls = Some(host);
        self
    }

    pub fn dash(mut self, host: Arc<dyn ScriptHost<Arc<dyn DashSdk>>>) -> Self {
        self.dash = Some(host);
        self
    }

    pub fn youtube(mut self, host: Arc<dyn ScriptHost<Arc<dyn EmbedSdk>>>) -> Self {
        self.youtube = Some(host);
        self
    }

    pub fn vimeo(mut self, host: Arc<dyn ScriptHost<Arc<dyn EmbedSdk>>>) -> Self {
        self.vimeo = Some(host);
        self
    }

    pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> SdkLoaders {
        let config = self.config;
        SdkLoaders {
            hls: ScriptLoader::new(self.hls.unwrap_or_else(|| Arc::new(MissingHost::default())))
                .with_config(config),
            dash: ScriptLoader::new(self.dash.unwrap_or_else(|| Arc::new(MissingHost::default())))
                .with_config(config),
            youtube: ScriptLoader::new(
                self.youtube
                    .unwrap_or_else(|| Arc::new(MissingHost::default())),
            )
            .with_config(config),
            vimeo: ScriptLoader::new(
                self.vimeo.unwrap_or_else(|| Arc::new(MissingHost::default())),
            )
            .with_config(config),
        }
    }
}

/// A script fetched over HTTP
#[derive(Debug, Clone)]
pub struct FetchedScript {
    pub url: Url,
    pub status: u16,
    pub bytes: usize,
    pub elapsed: Duration,
    body: Arc<str>,
}

impl FetchedScript {
    /// Whether the script body mentions `global`
    pub fn defines(&self, global: &str) -> bool {
        self.body.contains(global)
    }
}

/// Headless host that fetches scripts with `reqwest` without evaluating them.
///
/// A global counts as populated once a fetched script mentions it. Used to
/// check SDK reachability outside a browser.
pub struct HttpScriptHost {
    client: Client,
    fetched: std::sync::Mutex<Vec<FetchedScript>>,
}

impl HttpScriptHost {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("reelkit/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            fetched: std::sync::Mutex::new(Vec::new()),
        })
    }

    /// Scripts fetched so far, in fetch order
    pub fn fetched(&self) -> Vec<FetchedScript> {
        self.fetched
            .lock()
            .map(|fetched| fetched.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ScriptHost<FetchedScript> for HttpScriptHost {
    async fn inject(&self, url: &Url) -> Result<()> {
        let started = Instant::now();
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::script_load(url.as_str(), format!("HTTP {status}")));
        }
        let body = response.text().await?;
        debug!(url = %url, bytes = body.len(), "Fetched script");

        let script = FetchedScript {
            url: url.clone(),
            status: status.as_u16(),
            bytes: body.len(),
            elapsed: started.elapsed(),
            body: Arc::from(body),
        };
        self.fetched
            .lock()
            .map_err(|_| Error::Internal("script cache poisoned".into()))?
            .push(script);
        Ok(())
    }

    fn resolve_global(&self, name: &str) -> Option<FetchedScript> {
        self.fetched
            .lock()
            .ok()?
            .iter()
            .rev()
            .find(|script| script.defines(name))
            .cloned()
    }
}
