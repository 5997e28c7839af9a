//! Core types for reelkit

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for a mounted player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Playback technology driving a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Native,
    Hls,
    Dash,
    #[serde(rename = "youtube")]
    YouTube,
    Vimeo,
}

impl BackendKind {
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Native,
        BackendKind::Hls,
        BackendKind::Dash,
        BackendKind::YouTube,
        BackendKind::Vimeo,
    ];

    /// Third-party embed rather than a media element
    pub fn is_embedded(&self) -> bool {
        matches!(self, BackendKind::YouTube | BackendKind::Vimeo)
    }

    /// Identifier used in source descriptors
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Native => "native",
            BackendKind::Hls => "hls",
            BackendKind::Dash => "dash",
            BackendKind::YouTube => "youtube",
            BackendKind::Vimeo => "vimeo",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Native => write!(f, "native"),
            BackendKind::Hls => write!(f, "HLS"),
            BackendKind::Dash => write!(f, "DASH"),
            BackendKind::YouTube => write!(f, "YouTube"),
            BackendKind::Vimeo => write!(f, "Vimeo"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lower)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown source type: {s}")))
    }
}

/// One playable variant of a video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// URL, path or embed id
    pub file: String,
    /// Explicit backend, overrides classification
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<BackendKind>,
    /// Quality tag such as "1080p"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Source {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            kind: None,
            label: None,
        }
    }

    pub fn with_kind(mut self, kind: BackendKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Audio track announced by a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub lang: String,
    pub language: String,
}

impl AudioTrack {
    pub fn new(lang: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            lang: lang.into(),
            language: language.into(),
        }
    }
}

/// Subtitle track, either caller supplied or announced by a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    pub lang: String,
    pub language: String,
    #[serde(default)]
    pub file: String,
}

impl SubtitleTrack {
    pub fn new(
        lang: impl Into<String>,
        language: impl Into<String>,
        file: impl Into<String>,
    ) -> Self {
        Self {
            lang: lang.into(),
            language: language.into(),
            file: file.into(),
        }
    }
}

/// Player configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Start playback once the first backend is ready
    pub autoplay: bool,
    /// Start muted
    pub muted: bool,
    /// hls.js version pin
    pub hls_version: String,
    /// dash.js version pin
    pub dash_version: String,
    /// CDN base for the HLS and DASH SDK scripts
    pub cdn_base: String,
    /// Embedded backends poll current time at this interval while playing
    pub embed_poll_interval_ms: u64,
    /// Quiet window before a scrub seek is committed on embedded backends
    pub scrub_debounce_ms: u64,
    /// Bounded wait for an SDK global to appear
    pub script_timeout_ms: u64,
    pub script_poll_interval_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            autoplay: false,
            muted: false,
            hls_version: "latest".to_string(),
            dash_version: "latest".to_string(),
            cdn_base: "https://cdn.jsdelivr.net/npm".to_string(),
            embed_poll_interval_ms: 100,
            scrub_debounce_ms: 50,
            script_timeout_ms: 10_000,
            script_poll_interval_ms: 25,
        }
    }
}

impl PlayerConfig {
    /// Parse a JSON config, filling missing keys with defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PlayerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.embed_poll_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "embed_poll_interval_ms must be positive".into(),
            ));
        }
        if self.script_poll_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "script_poll_interval_ms must be positive".into(),
            ));
        }
        if self.script_poll_interval_ms > self.script_timeout_ms {
            return Err(Error::InvalidConfig(
                "script_poll_interval_ms exceeds script_timeout_ms".into(),
            ));
        }
        if self.hls_version.trim().is_empty() || self.dash_version.trim().is_empty() {
            return Err(Error::InvalidConfig("SDK versions must not be empty".into()));
        }
        url::Url::parse(&self.cdn_base)
            .map_err(|e| Error::InvalidConfig(format!("cdn_base: {e}")))?;
        Ok(())
    }

    pub fn embed_poll_interval(&self) -> Duration {
        Duration::from_millis(self.embed_poll_interval_ms)
    }

    pub fn scrub_debounce(&self) -> Duration {
        Duration::from_millis(self.scrub_debounce_ms)
    }

    pub fn script_timeout(&self) -> Duration {
        Duration::from_millis(self.script_timeout_ms)
    }

    pub fn script_poll_interval(&self) -> Duration {
        Duration::from_millis(self.script_poll_interval_ms)
    }
}
