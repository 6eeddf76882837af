//! Streaming engines and the per-preview session state machine.
//!
//! # Layers
//!
//! - [`StreamingEngine`] / [`EngineSession`]: the opaque playback engine
//!   (adaptive HLS or a progressive fallback). Engines report progress
//!   asynchronously through an [`EngineEventSink`].
//! - [`StreamingSession`]: wraps one engine session attached to one
//!   [`VideoSurface`], drives the attach → manifest → ready → playing state
//!   machine, performs bounded engine-level recovery, and owns the budget
//!   permit that admitted it.
//!
//! # Engines
//!
//! - [`HlsEngine`]: fetches and parses HLS playlists over HTTP
//! - [`ProgressiveEngine`]: plain file playback, used when adaptive streaming is unavailable

mod hls;
mod manifest;
mod progressive;
mod session;
mod surface;

pub use hls::{fetch_manifest, FetchError, HlsEngine};
pub use manifest::{parse_manifest, Manifest, ManifestError, ManifestKind};
pub use progressive::ProgressiveEngine;
pub use session::{SessionUpdate, StreamState, StreamingSession};
pub use surface::VideoSurface;

use futures::future::BoxFuture;
use marquee_common::{SessionId, StreamLevel};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::{AutoplayPolicy, EngineConfig, EngineKind};

/// Completion of an engine `play()` call.
pub type PlayFuture = BoxFuture<'static, Result<(), PlaybackRejected>>;

/// The host refused to start playback (autoplay restrictions and the like).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("playback rejected: {0}")]
pub struct PlaybackRejected(pub String);

/// Broad class of an engine error, deciding which recovery primitive applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// Fetch failures and timeouts; recovered with `start_load`.
    Network,
    /// Decode stalls and buffer errors; recovered with `recover_media_error`.
    Media,
    /// The manifest could not be parsed. Not recoverable.
    Manifest,
    Other,
}

/// Lifecycle notifications from an engine session.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    MediaAttached,
    ManifestParsed {
        levels: Vec<StreamLevel>,
        duration: Option<Duration>,
    },
    Error {
        kind: EngineErrorKind,
        fatal: bool,
        details: String,
    },
    /// Natural end of the clip.
    Ended,
}

/// An [`EngineEvent`] tagged with the session that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub session: SessionId,
    pub event: EngineEvent,
}

/// Where an engine session sends its events.
#[derive(Debug, Clone)]
pub struct EngineEventSink {
    session: SessionId,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EngineEventSink {
    pub fn new(session: SessionId, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn emit(&self, event: EngineEvent) {
        let event = SessionEvent {
            session: self.session,
            event,
        };
        if self.tx.send(event).is_err() {
            tracing::trace!(session_id = %self.session, "Engine event dropped, listener gone");
        }
    }
}

/// Factory for engine sessions.
pub trait StreamingEngine: Send + Sync {
    /// Short, lowercase identifier (e.g. `"hls"`).
    fn name(&self) -> &'static str;

    fn create_session(&self, events: EngineEventSink) -> Box<dyn EngineSession>;
}

/// One engine-level playback, mirroring the primitives of an adaptive
/// streaming library.
///
/// All methods return immediately; progress is reported through the
/// session's [`EngineEventSink`]. `destroy` must stop every in-flight load
/// and be safe to call more than once.
pub trait EngineSession: Send {
    fn attach_media(&mut self, surface: &VideoSurface);

    fn load_source(&mut self, url: &str);

    /// Restart loading after a network error.
    fn start_load(&mut self);

    /// Reset the media pipeline after a decode error.
    fn recover_media_error(&mut self);

    /// Seek back to the start of the clip.
    fn restart(&mut self);

    fn play(&mut self, muted: bool) -> PlayFuture;

    fn destroy(&mut self);
}

impl AutoplayPolicy {
    /// Decide whether a `play()` with the given mute state may start.
    pub fn check(self, muted: bool) -> Result<(), PlaybackRejected> {
        match (self, muted) {
            (AutoplayPolicy::Allowed, _) | (AutoplayPolicy::MutedOnly, true) => Ok(()),
            (AutoplayPolicy::MutedOnly, false) => Err(PlaybackRejected(
                "unmuted autoplay is not allowed".to_string(),
            )),
            (AutoplayPolicy::Blocked, _) => {
                Err(PlaybackRejected("autoplay is blocked".to_string()))
            }
        }
    }
}

/// Build the engine selected in configuration.
pub fn engine_from_config(config: &EngineConfig) -> Arc<dyn StreamingEngine> {
    match config.kind {
        EngineKind::Progressive => Arc::new(ProgressiveEngine::new(config.autoplay)),
        EngineKind::Hls => match HlsEngine::new(config) {
            Ok(engine) => Arc::new(engine),
            Err(e) => {
                tracing::warn!("Failed to build HTTP client with timeout: {}", e);
                Arc::new(HlsEngine::with_client(
                    reqwest::Client::new(),
                    config.autoplay,
                ))
            }
        },
        EngineKind::Auto => match HlsEngine::new(config) {
            Ok(engine) => Arc::new(engine),
            Err(e) => {
                tracing::warn!(
                    "Adaptive streaming unavailable ({}), using progressive playback",
                    e
                );
                Arc::new(ProgressiveEngine::new(config.autoplay))
            }
        },
    }
}
