//! Reelkit Core - backend-agnostic video player state
//!
//! This crate reconciles one player UI against interchangeable playback
//! backends:
//! - Source classification (native file, HLS, DASH, YouTube, Vimeo)
//! - On-demand, memoized SDK script loading
//! - One adapter per backend behind a single control capability set
//! - A single playback store fed by partial state deltas
//! - Quality, audio and subtitle reconciliation across backend switches
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         PlayerHandle                             │
//! │   play/seek/volume ──► ControlContext      load/quality/tracks   │
//! └──────────────┬───────────────────────────────────┬───────────────┘
//!                │ port (one live adapter)           │ commands
//!                ▼                                   ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        PlayerSession                             │
//! │  classify ─► reconcile ─► create_adapter ─► attach / teardown    │
//! └──────┬─────────────────────────────┬──────────────────────▲──────┘
//!        │                             │                      │
//!        ▼                             ▼                      │ events
//! ┌──────────────┐  ┌───────────────────────────────────┐     │
//! │ ScriptLoader │  │ Native │ HLS │ DASH │ YouTube/Vimeo│─────┘
//! │  (memoized)  │  └────────────────┬──────────────────┘
//! └──────────────┘                   │ StateDelta (gated on liveness)
//!                                    ▼
//!                          ┌──────────────────┐
//!                          │  PlaybackStore   │──► watch / broadcast
//!                          └──────────────────┘
//! ```
//!
//! Host objects (the media element, the SDK instances, script injection)
//! are reached through the traits in [`bindings`] and [`loader`].

pub mod adapter;
pub mod bindings;
pub mod classify;
pub mod context;
pub mod error;
pub mod handle;
pub mod loader;
pub mod options;
pub mod reconcile;
pub mod session;
pub mod state;
pub mod types;

pub use classify::{classify, Classification};
pub use context::{ActiveBackend, ControlContext, PlaybackCommand};
pub use error::{Error, Result};
pub use handle::PlayerHandle;
pub use loader::{HttpScriptHost, ScriptHost, ScriptLoader, SdkLoaders, SdkScript};
pub use options::PlayerOptions;
pub use session::Bindings;
pub use state::{PlaybackState, PlaybackStore, StateDelta, StateError, StateErrorKind};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version once at startup
pub fn init() {
    tracing::info!(version = VERSION, "Reelkit core initialized");
}
