//! Shared test harness for integration tests.
//!
//! Provides [`Harness`], a [`PreviewContext`] wired to a [`ScriptedEngine`]
//! and a [`ScriptedResolver`] whose timing and outcomes tests can change
//! between episodes. Use with `#[tokio::test(start_paused = true)]` so the
//! hover debounce and scripted delays run on virtual time.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use marquee::config::{AutoplayPolicy, PreviewConfig};
use marquee::preview::{PreviewContext, PreviewSessionManager};
use marquee::resolver::{ResolveError, ResolveOptions, ResolvedStream, StreamResolver};
use marquee::streaming::{
    EngineErrorKind, EngineEvent, EngineEventSink, EngineSession, PlayFuture, StreamingEngine,
    VideoSurface,
};
use marquee_common::{MediaRef, SessionId, StreamLevel};

// ---------------------------------------------------------------------------
// Scripted engine
// ---------------------------------------------------------------------------

/// What a scripted session reports once its manifest "loads".
#[derive(Debug, Clone)]
pub enum ManifestScript {
    Levels(usize),
    Fatal(EngineErrorKind),
}

struct EngineShared {
    manifest: Mutex<ManifestScript>,
    manifest_delay: Mutex<Duration>,
    autoplay: Mutex<AutoplayPolicy>,
    created: AtomicUsize,
    destroyed: AtomicUsize,
    recoveries: AtomicUsize,
    plays: Mutex<Vec<bool>>,
    live: Mutex<Vec<EngineEventSink>>,
}

/// Engine whose sessions follow a script instead of touching the network.
pub struct ScriptedEngine {
    shared: Arc<EngineShared>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(EngineShared {
                manifest: Mutex::new(ManifestScript::Levels(3)),
                manifest_delay: Mutex::new(Duration::from_millis(20)),
                autoplay: Mutex::new(AutoplayPolicy::Allowed),
                created: AtomicUsize::new(0),
                destroyed: AtomicUsize::new(0),
                recoveries: AtomicUsize::new(0),
                plays: Mutex::new(Vec::new()),
                live: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn set_manifest(&self, script: ManifestScript) {
        *self.shared.manifest.lock() = script;
    }

    pub fn set_manifest_delay(&self, delay: Duration) {
        *self.shared.manifest_delay.lock() = delay;
    }

    pub fn set_autoplay(&self, policy: AutoplayPolicy) {
        *self.shared.autoplay.lock() = policy;
    }

    pub fn created(&self) -> usize {
        self.shared.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.shared.destroyed.load(Ordering::SeqCst)
    }

    pub fn recoveries(&self) -> usize {
        self.shared.recoveries.load(Ordering::SeqCst)
    }

    /// Mute flag of every `play()` call, in order.
    pub fn plays(&self) -> Vec<bool> {
        self.shared.plays.lock().clone()
    }

    /// Sessions created and not yet destroyed.
    pub fn live(&self) -> usize {
        self.shared.live.lock().len()
    }

    /// Inject `event` into every live session.
    pub fn emit_all(&self, event: EngineEvent) {
        for sink in self.shared.live.lock().iter() {
            sink.emit(event.clone());
        }
    }
}

impl StreamingEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn create_session(&self, events: EngineEventSink) -> Box<dyn EngineSession> {
        self.shared.created.fetch_add(1, Ordering::SeqCst);
        self.shared.live.lock().push(events.clone());
        Box::new(ScriptedSession {
            shared: Arc::clone(&self.shared),
            events,
            surface: None,
            loader: None,
            destroyed: false,
        })
    }
}

struct ScriptedSession {
    shared: Arc<EngineShared>,
    events: EngineEventSink,
    surface: Option<VideoSurface>,
    loader: Option<JoinHandle<()>>,
    destroyed: bool,
}

impl ScriptedSession {
    fn id(&self) -> SessionId {
        self.events.session()
    }
}

impl EngineSession for ScriptedSession {
    fn attach_media(&mut self, surface: &VideoSurface) {
        self.surface = Some(surface.clone());
        self.events.emit(EngineEvent::MediaAttached);
    }

    fn load_source(&mut self, url: &str) {
        if let Some(surface) = &self.surface {
            surface.set_source(Some(url.to_string()));
        }

        let script = self.shared.manifest.lock().clone();
        let delay = *self.shared.manifest_delay.lock();
        let events = self.events.clone();
        let url = url.to_string();

        self.loader = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let event = match script {
                ManifestScript::Levels(n) => EngineEvent::ManifestParsed {
                    levels: (0..n)
                        .map(|i| StreamLevel::single(format!("{}#level{}", url, i)))
                        .collect(),
                    duration: None,
                },
                ManifestScript::Fatal(kind) => EngineEvent::Error {
                    kind,
                    fatal: true,
                    details: "scripted failure".to_string(),
                },
            };
            events.emit(event);
        }));
    }

    fn start_load(&mut self) {
        self.shared.recoveries.fetch_add(1, Ordering::SeqCst);
    }

    fn recover_media_error(&mut self) {
        self.shared.recoveries.fetch_add(1, Ordering::SeqCst);
    }

    fn restart(&mut self) {
        if let Some(surface) = &self.surface {
            surface.rewind();
        }
    }

    fn play(&mut self, muted: bool) -> PlayFuture {
        self.shared.plays.lock().push(muted);
        let outcome = self.shared.autoplay.lock().check(muted);
        if outcome.is_ok() {
            if let Some(surface) = &self.surface {
                surface.set_muted(muted);
                surface.set_playing(true);
            }
        }
        futures::future::ready(outcome).boxed()
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        if let Some(loader) = self.loader.take() {
            loader.abort();
        }
        let id = self.id();
        self.shared.live.lock().retain(|sink| sink.session() != id);
        self.shared.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.destroy();
    }
}

// ---------------------------------------------------------------------------
// Scripted resolver
// ---------------------------------------------------------------------------

/// Resolver answering `https://cdn.test/{id}/...` after a configurable delay.
pub struct ScriptedResolver {
    delay: Mutex<Duration>,
    fail: Mutex<bool>,
    calls: AtomicUsize,
    requested: Mutex<Vec<(String, ResolveOptions)>>,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self {
            delay: Mutex::new(Duration::from_millis(50)),
            fail: Mutex::new(false),
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Media ids and options of every call, in order.
    pub fn requested(&self) -> Vec<(String, ResolveOptions)> {
        self.requested.lock().clone()
    }
}

pub fn stream_url(media_id: &str) -> String {
    format!("https://cdn.test/{}/playlist.m3u8", media_id)
}

pub fn poster_url(media_id: &str) -> String {
    format!("https://cdn.test/{}/thumbnail.jpg", media_id)
}

#[async_trait]
impl StreamResolver for ScriptedResolver {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn resolve(
        &self,
        media_id: &str,
        options: ResolveOptions,
    ) -> Result<ResolvedStream, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().push((media_id.to_string(), options));

        let delay = *self.delay.lock();
        tokio::time::sleep(delay).await;

        if *self.fail.lock() {
            return Err(ResolveError::Unavailable("scripted failure".to_string()));
        }

        Ok(ResolvedStream {
            stream_url: stream_url(media_id),
            poster_url: poster_url(media_id),
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub ctx: PreviewContext,
    pub engine: Arc<ScriptedEngine>,
    pub resolver: Arc<ScriptedResolver>,
}

impl Harness {
    /// Default timing: 300 ms debounce, 100 ms close delay, 1 s cooldown,
    /// two concurrent sessions.
    pub fn new() -> Self {
        Self::with_config(PreviewConfig::default())
    }

    pub fn with_config(config: PreviewConfig) -> Self {
        let engine = Arc::new(ScriptedEngine::new());
        let resolver = Arc::new(ScriptedResolver::new());
        let ctx = PreviewContext::new(
            config,
            Arc::clone(&resolver) as Arc<dyn StreamResolver>,
            Arc::clone(&engine) as Arc<dyn StreamingEngine>,
        );

        Self {
            ctx,
            engine,
            resolver,
        }
    }

    /// Mount a card for `media_id` on a fresh surface.
    pub fn mount(&self, media_id: &str) -> (PreviewSessionManager, VideoSurface) {
        let surface = VideoSurface::new();
        let manager =
            PreviewSessionManager::spawn(self.ctx.clone(), media(media_id), surface.clone());
        (manager, surface)
    }

    pub fn active(&self) -> usize {
        self.ctx.budget.active()
    }
}

pub fn media(id: &str) -> MediaRef {
    MediaRef::new(id, id.to_uppercase(), format!("/posters/{}.png", id))
}

/// Advance virtual time by `ms` and let every task run.
pub async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Enter, wait `ms` of virtual time, then flush pending commands.
pub async fn hover_for(manager: &PreviewSessionManager, ms: u64) {
    manager.notify_pointer_enter();
    advance(ms).await;
    manager.flush().await;
}

/// Leave, wait `ms` of virtual time, then flush pending commands.
pub async fn leave_for(manager: &PreviewSessionManager, ms: u64) {
    manager.notify_pointer_leave();
    advance(ms).await;
    manager.flush().await;
}
