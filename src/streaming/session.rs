//! Streaming session lifecycle.
//!
//! A [`StreamingSession`] lives from one `attach` to one `destroy`. It is
//! driven by the events its engine session reports and never outlives the
//! budget permit that admitted it.

use marquee_common::{Error, SessionId, StreamLevel};
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;

use super::{
    EngineErrorKind, EngineEvent, EngineEventSink, EngineSession, PlayFuture, SessionEvent,
    StreamingEngine, VideoSurface,
};
use crate::budget::BudgetPermit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Idle,
    Attaching,
    LoadingManifest,
    Ready,
    Playing,
    Failed,
    Destroyed,
}

impl StreamState {
    /// States in which the engine may be holding network connections.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            Self::Attaching | Self::LoadingManifest | Self::Ready | Self::Playing
        )
    }
}

/// What the owner of a session needs to react to after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// Nothing for the owner to do.
    None,
    /// Manifest parsed; the session can be played.
    Ready,
    /// A recoverable engine error is being retried.
    Recovering { attempt: u32 },
    /// The clip ended and playback restarted from the beginning.
    Looped,
    /// Recovery is exhausted or the error is not recoverable.
    Failed { details: String },
}

pub struct StreamingSession {
    id: SessionId,
    state: StreamState,
    engine: Box<dyn EngineSession>,
    surface: Option<VideoSurface>,
    permit: Option<BudgetPermit>,
    levels: Vec<StreamLevel>,
    max_recovery_attempts: u32,
    recovery_attempts: u32,
}

impl StreamingSession {
    /// Create an idle session whose engine reports to `events`.
    pub fn new(
        engine: &dyn StreamingEngine,
        events: mpsc::UnboundedSender<SessionEvent>,
        permit: BudgetPermit,
        max_recovery_attempts: u32,
    ) -> Self {
        let id = SessionId::new();
        let engine_session = engine.create_session(EngineEventSink::new(id, events));

        tracing::debug!(session_id = %id, engine = engine.name(), "Streaming session created");

        Self {
            id,
            state: StreamState::Idle,
            engine: engine_session,
            surface: None,
            permit: Some(permit),
            levels: Vec::new(),
            max_recovery_attempts,
            recovery_attempts: 0,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Renditions reported by the last parsed manifest.
    pub fn levels(&self) -> &[StreamLevel] {
        &self.levels
    }

    pub fn recovery_attempts(&self) -> u32 {
        self.recovery_attempts
    }

    pub fn holds_permit(&self) -> bool {
        self.permit.is_some()
    }

    /// Attach to `surface` and start loading `url`.
    ///
    /// Only valid from [`StreamState::Idle`], and only when no other session
    /// occupies the surface. Both violations are misuse errors; an empty
    /// `url` is invalid input.
    pub fn attach(&mut self, surface: &VideoSurface, url: &str) -> marquee_common::Result<()> {
        if self.state != StreamState::Idle {
            return Err(Error::misuse(format!(
                "attach called on session {} in state {:?}",
                self.id, self.state
            )));
        }

        if url.trim().is_empty() {
            return Err(Error::invalid_input("empty stream url"));
        }

        surface.claim(self.id)?;
        self.surface = Some(surface.clone());
        self.state = StreamState::Attaching;

        self.engine.attach_media(surface);
        self.engine.load_source(url);

        tracing::debug!(session_id = %self.id, url = %url, "Attaching stream");
        Ok(())
    }

    /// Apply one engine event to the state machine.
    pub fn handle_event(&mut self, event: EngineEvent) -> SessionUpdate {
        if !self.state.is_live() {
            tracing::trace!(session_id = %self.id, state = ?self.state, ?event, "Ignoring engine event");
            return SessionUpdate::None;
        }

        match event {
            EngineEvent::MediaAttached => {
                if self.state == StreamState::Attaching {
                    self.state = StreamState::LoadingManifest;
                }
                SessionUpdate::None
            }
            EngineEvent::ManifestParsed { levels, .. } => {
                self.levels = levels;
                match self.state {
                    StreamState::Attaching | StreamState::LoadingManifest => {
                        self.state = StreamState::Ready;
                        tracing::debug!(
                            session_id = %self.id,
                            levels = self.levels.len(),
                            "Manifest parsed"
                        );
                        SessionUpdate::Ready
                    }
                    _ => SessionUpdate::None,
                }
            }
            EngineEvent::Error {
                fatal: false,
                kind,
                details,
            } => {
                tracing::debug!(session_id = %self.id, ?kind, %details, "Non-fatal engine error");
                SessionUpdate::None
            }
            EngineEvent::Error { kind, details, .. } => self.on_fatal_error(kind, details),
            EngineEvent::Ended => {
                if self.state == StreamState::Playing {
                    self.engine.restart();
                    tracing::trace!(session_id = %self.id, "Preview clip ended, looping");
                    SessionUpdate::Looped
                } else {
                    SessionUpdate::None
                }
            }
        }
    }

    fn on_fatal_error(&mut self, kind: EngineErrorKind, details: String) -> SessionUpdate {
        let recoverable = matches!(kind, EngineErrorKind::Network | EngineErrorKind::Media)
            && self.state != StreamState::Attaching;

        if !recoverable {
            return self.fail(format!("{:?} error: {}", kind, details));
        }

        if self.recovery_attempts >= self.max_recovery_attempts {
            return self.fail(format!(
                "{:?} error after {} recovery attempts: {}",
                kind, self.recovery_attempts, details
            ));
        }

        self.recovery_attempts += 1;
        tracing::warn!(
            session_id = %self.id,
            ?kind,
            attempt = self.recovery_attempts,
            max = self.max_recovery_attempts,
            %details,
            "Recovering streaming session"
        );

        match kind {
            EngineErrorKind::Network => self.engine.start_load(),
            _ => self.engine.recover_media_error(),
        }

        SessionUpdate::Recovering {
            attempt: self.recovery_attempts,
        }
    }

    fn fail(&mut self, details: String) -> SessionUpdate {
        tracing::warn!(session_id = %self.id, state = ?self.state, %details, "Streaming session failed");
        self.state = StreamState::Failed;
        SessionUpdate::Failed { details }
    }

    /// Ask the engine to start playback.
    ///
    /// The returned future settles once the host accepted or refused;
    /// call [`mark_playing`](Self::mark_playing) on success.
    pub fn play(&mut self, muted: bool) -> marquee_common::Result<PlayFuture> {
        match self.state {
            StreamState::Ready | StreamState::Playing => Ok(self.engine.play(muted)),
            state => Err(Error::misuse(format!(
                "play called on session {} in state {:?}",
                self.id, state
            ))),
        }
    }

    /// Record that playback started; returns `false` if the session moved on.
    pub fn mark_playing(&mut self) -> bool {
        match self.state {
            StreamState::Ready => {
                self.state = StreamState::Playing;
                true
            }
            StreamState::Playing => true,
            _ => false,
        }
    }

    /// Stop all engine activity, detach from the surface and give the
    /// budget slot back. Idempotent.
    pub fn destroy(&mut self) {
        if self.state == StreamState::Destroyed {
            return;
        }

        let from = self.state;
        self.engine.destroy();
        if let Some(surface) = self.surface.take() {
            surface.release(self.id);
        }
        self.levels.clear();
        if let Some(permit) = self.permit.take() {
            permit.release();
        }
        self.state = StreamState::Destroyed;

        tracing::debug!(session_id = %self.id, from = ?from, "Streaming session destroyed");
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("levels", &self.levels.len())
            .field("recovery_attempts", &self.recovery_attempts)
            .field("holds_permit", &self.permit.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::SessionBudget;
    use futures::FutureExt;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct CallLog(Mutex<Vec<&'static str>>);

    impl CallLog {
        fn push(&self, call: &'static str) {
            self.0.lock().push(call);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.0.lock().clone()
        }
    }

    struct RecordingEngine {
        log: Arc<CallLog>,
    }

    struct RecordingSession {
        log: Arc<CallLog>,
    }

    impl StreamingEngine for RecordingEngine {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn create_session(&self, _events: EngineEventSink) -> Box<dyn EngineSession> {
            Box::new(RecordingSession {
                log: Arc::clone(&self.log),
            })
        }
    }

    impl EngineSession for RecordingSession {
        fn attach_media(&mut self, _surface: &VideoSurface) {
            self.log.push("attach_media");
        }
        fn load_source(&mut self, _url: &str) {
            self.log.push("load_source");
        }
        fn start_load(&mut self) {
            self.log.push("start_load");
        }
        fn recover_media_error(&mut self) {
            self.log.push("recover_media_error");
        }
        fn restart(&mut self) {
            self.log.push("restart");
        }
        fn play(&mut self, _muted: bool) -> PlayFuture {
            self.log.push("play");
            futures::future::ready(Ok(())).boxed()
        }
        fn destroy(&mut self) {
            self.log.push("destroy");
        }
    }

    struct Fixture {
        budget: Arc<SessionBudget>,
        log: Arc<CallLog>,
        surface: VideoSurface,
        session: StreamingSession,
    }

    fn fixture(max_recovery: u32) -> Fixture {
        let budget = SessionBudget::new(2);
        let log = Arc::new(CallLog::default());
        let engine = RecordingEngine {
            log: Arc::clone(&log),
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let permit = budget.try_acquire().unwrap();
        let session = StreamingSession::new(&engine, tx, permit, max_recovery);

        Fixture {
            budget,
            log,
            surface: VideoSurface::new(),
            session,
        }
    }

    fn fatal(kind: EngineErrorKind) -> EngineEvent {
        EngineEvent::Error {
            kind,
            fatal: true,
            details: "boom".to_string(),
        }
    }

    fn parsed() -> EngineEvent {
        EngineEvent::ManifestParsed {
            levels: vec![StreamLevel::single("a.m3u8")],
            duration: None,
        }
    }

    fn to_ready(f: &mut Fixture) {
        f.session.attach(&f.surface, "a.m3u8").unwrap();
        assert_eq!(f.session.handle_event(EngineEvent::MediaAttached), SessionUpdate::None);
        assert_eq!(f.session.state(), StreamState::LoadingManifest);
        assert_eq!(f.session.handle_event(parsed()), SessionUpdate::Ready);
        assert_eq!(f.session.state(), StreamState::Ready);
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut f = fixture(3);
        assert_eq!(f.session.state(), StreamState::Idle);

        to_ready(&mut f);
        assert_eq!(f.session.levels().len(), 1);

        let play = f.session.play(true).unwrap();
        assert!(play.now_or_never().unwrap().is_ok());
        assert!(f.session.mark_playing());
        assert_eq!(f.session.state(), StreamState::Playing);
        assert_eq!(f.surface.attached_session(), Some(f.session.id()));
        assert_eq!(f.log.calls(), vec!["attach_media", "load_source", "play"]);
    }

    #[test]
    fn test_attach_twice_is_misuse() {
        let mut f = fixture(3);
        f.session.attach(&f.surface, "a.m3u8").unwrap();

        let err = f.session.attach(&f.surface, "a.m3u8").unwrap_err();
        assert!(err.is_misuse());
    }

    #[test]
    fn test_attach_to_occupied_surface_is_misuse() {
        let mut f = fixture(3);
        f.surface.claim(SessionId::new()).unwrap();

        let err = f.session.attach(&f.surface, "a.m3u8").unwrap_err();
        assert!(err.is_misuse());
        assert_eq!(f.session.state(), StreamState::Idle);
    }

    #[test]
    fn test_attach_empty_url_is_rejected() {
        let mut f = fixture(3);
        let err = f.session.attach(&f.surface, " ").unwrap_err();
        assert!(!err.is_misuse());
        assert!(!f.surface.is_attached());
        assert_eq!(f.session.state(), StreamState::Idle);
    }

    #[test]
    fn test_play_before_ready_is_misuse() {
        let mut f = fixture(3);
        f.session.attach(&f.surface, "a.m3u8").unwrap();
        let err = f.session.play(false).err().expect("play before ready must fail");
        assert!(err.is_misuse());
        assert_eq!(f.log.calls(), vec!["attach_media", "load_source"]);
    }

    #[test]
    fn test_recovery_is_bounded() {
        let mut f = fixture(2);
        to_ready(&mut f);
        f.session.mark_playing();

        assert_eq!(
            f.session.handle_event(fatal(EngineErrorKind::Network)),
            SessionUpdate::Recovering { attempt: 1 }
        );
        assert_eq!(
            f.session.handle_event(fatal(EngineErrorKind::Media)),
            SessionUpdate::Recovering { attempt: 2 }
        );
        assert_eq!(f.session.state(), StreamState::Playing);

        let update = f.session.handle_event(fatal(EngineErrorKind::Network));
        assert!(matches!(update, SessionUpdate::Failed { .. }));
        assert_eq!(f.session.state(), StreamState::Failed);

        let calls = f.log.calls();
        assert!(calls.contains(&"start_load"));
        assert!(calls.contains(&"recover_media_error"));
    }

    #[test]
    fn test_manifest_error_is_not_recoverable() {
        let mut f = fixture(3);
        f.session.attach(&f.surface, "a.m3u8").unwrap();
        f.session.handle_event(EngineEvent::MediaAttached);

        let update = f.session.handle_event(fatal(EngineErrorKind::Manifest));
        assert!(matches!(update, SessionUpdate::Failed { .. }));
        assert_eq!(f.session.recovery_attempts(), 0);
    }

    #[test]
    fn test_fatal_while_attaching_fails() {
        let mut f = fixture(3);
        f.session.attach(&f.surface, "a.m3u8").unwrap();

        let update = f.session.handle_event(fatal(EngineErrorKind::Network));
        assert!(matches!(update, SessionUpdate::Failed { .. }));
    }

    #[test]
    fn test_non_fatal_error_is_ignored() {
        let mut f = fixture(3);
        to_ready(&mut f);

        let update = f.session.handle_event(EngineEvent::Error {
            kind: EngineErrorKind::Network,
            fatal: false,
            details: "segment retry".to_string(),
        });
        assert_eq!(update, SessionUpdate::None);
        assert_eq!(f.session.state(), StreamState::Ready);
    }

    #[test]
    fn test_end_of_clip_loops() {
        let mut f = fixture(3);
        to_ready(&mut f);
        f.session.mark_playing();

        assert_eq!(f.session.handle_event(EngineEvent::Ended), SessionUpdate::Looped);
        assert_eq!(f.session.state(), StreamState::Playing);
        assert!(f.log.calls().contains(&"restart"));
    }

    #[test]
    fn test_destroy_is_idempotent_and_releases_once() {
        let mut f = fixture(3);
        to_ready(&mut f);
        assert_eq!(f.budget.active(), 1);

        f.session.destroy();
        f.session.destroy();

        assert_eq!(f.session.state(), StreamState::Destroyed);
        assert_eq!(f.budget.active(), 0);
        assert!(!f.surface.is_attached());
        assert_eq!(f.surface.detach_count(), 1);
        assert_eq!(
            f.log.calls().iter().filter(|c| **c == "destroy").count(),
            1
        );
    }

    #[test]
    fn test_destroy_mid_attach() {
        let mut f = fixture(3);
        f.session.attach(&f.surface, "a.m3u8").unwrap();

        f.session.destroy();
        assert_eq!(f.budget.active(), 0);
        assert_eq!(f.session.handle_event(parsed()), SessionUpdate::None);
        assert!(!f.session.mark_playing());
    }

    #[test]
    fn test_drop_releases_permit() {
        let f = fixture(3);
        assert_eq!(f.budget.active(), 1);

        let Fixture {
            budget, session, ..
        } = f;
        drop(session);
        assert_eq!(budget.active(), 0);
    }
}
