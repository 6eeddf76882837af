//! The per-card preview orchestrator.
//!
//! Each card runs one worker task. The worker owns every piece of card state
//! (hover controller, resolved handle, streaming session) and multiplexes its
//! inputs with `select!`:
//!
//! - commands from the [`PreviewSessionManager`] handle
//! - resolve and play completions from the tasks it spawned
//! - engine events from the current streaming session
//! - the hover controller's next deadline
//!
//! Every preview episode gets a number. Completions carry the episode that
//! started them and are dropped unless that episode is still wanted, so a
//! slow resolver can never attach a stream the user has already left.

use marquee_common::{CardId, MediaRef, PreviewErrorReason, SessionId, StreamHandle};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, trace, warn};

use super::state::{PresentationSignal, PreviewSnapshot, SessionState};
use super::PreviewContext;
use crate::hover::{HoverController, HoverSignal, HoverTiming};
use crate::resolver::{ResolveError, ResolveOptions, ResolvedStream};
use crate::streaming::{
    PlaybackRejected, SessionEvent, SessionUpdate, StreamingSession, VideoSurface,
};

#[derive(Debug)]
enum Command {
    PointerEnter,
    PointerLeave,
    SetMedia(MediaRef),
    Flush(oneshot::Sender<()>),
    Unmount,
}

#[derive(Debug)]
enum Completion {
    Resolved {
        episode: u64,
        media_id: String,
        result: Result<ResolvedStream, ResolveError>,
    },
    Played {
        episode: u64,
        session: SessionId,
        muted: bool,
        result: Result<(), PlaybackRejected>,
    },
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle to one card's preview worker.
///
/// Dropping the handle unmounts the card.
pub struct PreviewSessionManager {
    card: CardId,
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<PreviewSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl PreviewSessionManager {
    /// Mount a card for `media` rendering into `surface`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(ctx: PreviewContext, media: MediaRef, surface: VideoSurface) -> Self {
        let card = CardId::new();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let hover = HoverController::new(HoverTiming::from(ctx.config.as_ref()));
        let initial = PreviewSnapshot {
            media_id: media.id.clone(),
            state: SessionState::Idle,
            hover: hover.state(),
            poster_url: media.poster_fallback_url.clone(),
            episodes: 0,
        };
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);

        debug!(card = %card, media_id = %media.id, surface = %surface.id(), "Mounting preview card");

        let worker = CardWorker {
            card,
            ctx,
            media,
            surface,
            hover,
            state: SessionState::Idle,
            handle: None,
            session: None,
            episode: 0,
            wanted: None,
            snapshot: snapshot_tx,
            completions: completions_tx,
            events: events_tx,
        };
        let task = tokio::spawn(worker.run(commands_rx, completions_rx, events_rx));

        Self {
            card,
            commands: commands_tx,
            snapshot: snapshot_rx,
            task: Some(task),
        }
    }

    pub fn card(&self) -> CardId {
        self.card
    }

    pub fn notify_pointer_enter(&self) {
        self.send(Command::PointerEnter);
    }

    pub fn notify_pointer_leave(&self) {
        self.send(Command::PointerLeave);
    }

    /// Re-target the card. A different media id tears the current preview
    /// down and resets hover tracking.
    pub fn set_media(&self, media: MediaRef) {
        self.send(Command::SetMedia(media));
    }

    /// Wait until every command sent so far has been processed.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Flush(tx));
        let _ = rx.await;
    }

    /// Tear everything down and wait for the worker to exit.
    pub async fn unmount(mut self) {
        self.send(Command::Unmount);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(card = %self.card, "Preview worker ended abnormally: {}", e);
            }
        }
    }

    pub fn snapshot(&self) -> PreviewSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.snapshot.borrow().state
    }

    pub fn signal(&self) -> PresentationSignal {
        self.snapshot.borrow().signal()
    }

    /// Watch snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<PreviewSnapshot> {
        self.snapshot.clone()
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            trace!(card = %self.card, "Preview worker already stopped");
        }
    }
}

impl Drop for PreviewSessionManager {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.send(Command::Unmount);
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct CardWorker {
    card: CardId,
    ctx: PreviewContext,
    media: MediaRef,
    surface: VideoSurface,
    hover: HoverController,
    state: SessionState,
    handle: Option<StreamHandle>,
    session: Option<StreamingSession>,
    /// Last episode number handed out.
    episode: u64,
    /// The episode whose async results are still accepted.
    wanted: Option<u64>,
    snapshot: watch::Sender<PreviewSnapshot>,
    completions: mpsc::UnboundedSender<Completion>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl CardWorker {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        loop {
            let deadline = self.hover.next_deadline();

            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Unmount) | None => {
                        self.unmount();
                        break;
                    }
                    Some(command) => self.on_command(command),
                },
                Some(completion) = completions.recv() => self.on_completion(completion),
                Some(event) = events.recv() => self.on_session_event(event),
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_deadline();
                }
            }
        }

        trace!(card = %self.card, "Preview worker exiting");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::PointerEnter => {
                self.hover.on_pointer_enter(Instant::now());
                self.publish();
            }
            Command::PointerLeave => {
                self.hover.on_pointer_leave(Instant::now());
                self.publish();
            }
            Command::SetMedia(media) => self.retarget(media),
            Command::Flush(ack) => {
                let _ = ack.send(());
            }
            Command::Unmount => self.unmount(),
        }
    }

    fn on_deadline(&mut self) {
        let now = Instant::now();
        while let Some(signal) = self.hover.poll(now) {
            match signal {
                HoverSignal::PreviewRequested => self.start_episode(),
                HoverSignal::PreviewCancelled => self.stop(),
            }
        }
        self.publish();
    }

    // -- episode lifecycle ---------------------------------------------------

    fn start_episode(&mut self) {
        if self.state != SessionState::Idle {
            debug!(card = %self.card, state = %self.state, "Preview requested while busy, ignoring");
            return;
        }

        self.episode += 1;
        let episode = self.episode;
        self.wanted = Some(episode);
        info!(card = %self.card, media_id = %self.media.id, episode, "Starting preview");
        self.transition(SessionState::Resolving);

        let resolver = Arc::clone(&self.ctx.resolver);
        let media_id = self.media.id.clone();
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = resolver.resolve(&media_id, ResolveOptions::fresh()).await;
            let _ = completions.send(Completion::Resolved {
                episode,
                media_id,
                result,
            });
        });
    }

    /// Cancel the current episode and return to idle.
    fn stop(&mut self) {
        self.teardown();
        self.handle = None;
        info!(card = %self.card, media_id = %self.media.id, episode = self.episode, "Stopping preview");
        self.transition(SessionState::Stopped);
        self.transition(SessionState::Idle);
    }

    fn retarget(&mut self, media: MediaRef) {
        if media.id == self.media.id {
            self.media = media;
            self.publish();
            return;
        }

        debug!(card = %self.card, from = %self.media.id, to = %media.id, "Re-targeting card");
        self.teardown();
        self.handle = None;
        self.hover.reset();
        self.media = media;
        self.transition(SessionState::Stopped);
        self.transition(SessionState::Idle);
    }

    fn unmount(&mut self) {
        self.teardown();
        self.handle = None;
        self.hover.reset();
        debug!(card = %self.card, media_id = %self.media.id, "Unmounting preview card");
        self.transition(SessionState::Stopped);
    }

    /// Forget the current episode and destroy its session.
    fn teardown(&mut self) {
        self.wanted = None;
        if let Some(mut session) = self.session.take() {
            session.destroy();
        }
    }

    fn fail(&mut self, reason: PreviewErrorReason) {
        self.teardown();
        warn!(card = %self.card, media_id = %self.media.id, episode = self.episode, %reason, "Preview failed");
        self.transition(SessionState::Error(reason));
    }

    fn is_current(&self, episode: u64) -> bool {
        self.wanted == Some(episode)
    }

    // -- async results ------------------------------------------------------

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Resolved {
                episode,
                media_id,
                result,
            } => {
                if !self.is_current(episode)
                    || self.state != SessionState::Resolving
                    || media_id != self.media.id
                {
                    debug!(card = %self.card, episode, media_id = %media_id, "Discarding stale resolve");
                    return;
                }
                self.on_resolved(result);
            }
            Completion::Played {
                episode,
                session,
                muted,
                result,
            } => {
                let same_session = self.session.as_ref().map(StreamingSession::id) == Some(session);
                if !self.is_current(episode) || !same_session {
                    debug!(card = %self.card, episode, session_id = %session, "Discarding stale play result");
                    return;
                }
                self.on_played(muted, result);
            }
        }
    }

    fn on_resolved(&mut self, result: Result<ResolvedStream, ResolveError>) {
        let stream = match result {
            Ok(stream) => stream,
            Err(e) => {
                warn!(card = %self.card, media_id = %self.media.id, "Resolve failed: {}", e);
                self.fail(PreviewErrorReason::ResolveFailed);
                return;
            }
        };

        let handle = StreamHandle::new(&self.media.id, stream.stream_url, stream.poster_url);
        let stream_url = handle.stream_url.clone();
        self.handle = Some(handle);

        let Some(permit) = self.ctx.budget.try_acquire() else {
            debug!(
                card = %self.card,
                active = self.ctx.budget.active(),
                max = self.ctx.budget.max(),
                "Preview budget exhausted"
            );
            self.fail(PreviewErrorReason::TooManyPreviews);
            return;
        };

        let mut session = StreamingSession::new(
            self.ctx.engine.as_ref(),
            self.events.clone(),
            permit,
            self.ctx.config.max_recovery_attempts,
        );
        self.transition(SessionState::Attaching);

        if let Err(e) = session.attach(&self.surface, &stream_url) {
            error!(card = %self.card, session_id = %session.id(), "Failed to attach stream: {}", e);
            session.destroy();
            self.fail(PreviewErrorReason::StreamingFatal);
            return;
        }
        self.session = Some(session);
    }

    fn on_session_event(&mut self, event: SessionEvent) {
        let Some(session) = self.session.as_mut() else {
            trace!(card = %self.card, session_id = %event.session, "Engine event without a session");
            return;
        };
        if session.id() != event.session {
            trace!(card = %self.card, session_id = %event.session, "Engine event from a destroyed session");
            return;
        }

        match session.handle_event(event.event) {
            SessionUpdate::None => {}
            SessionUpdate::Ready => self.start_play(self.ctx.config.start_muted),
            SessionUpdate::Recovering { attempt } => {
                debug!(card = %self.card, attempt, "Stream recovering");
            }
            SessionUpdate::Looped => {
                trace!(card = %self.card, "Preview looped");
            }
            SessionUpdate::Failed { details } => {
                debug!(card = %self.card, %details, "Streaming session gave up");
                self.fail(PreviewErrorReason::StreamingFatal);
            }
        }
    }

    fn start_play(&mut self, muted: bool) {
        let Some(episode) = self.wanted else {
            return;
        };
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let session_id = session.id();
        match session.play(muted) {
            Ok(play) => {
                let completions = self.completions.clone();
                tokio::spawn(async move {
                    let result = play.await;
                    let _ = completions.send(Completion::Played {
                        episode,
                        session: session_id,
                        muted,
                        result,
                    });
                });
            }
            Err(e) => {
                error!(card = %self.card, session_id = %session_id, "Failed to start playback: {}", e);
                self.fail(PreviewErrorReason::StreamingFatal);
            }
        }
    }

    fn on_played(&mut self, muted: bool, result: Result<(), PlaybackRejected>) {
        match result {
            Ok(()) => {
                let started = self
                    .session
                    .as_mut()
                    .is_some_and(StreamingSession::mark_playing);
                if started && self.state != SessionState::Playing {
                    info!(card = %self.card, media_id = %self.media.id, episode = self.episode, muted, "Preview playing");
                    self.transition(SessionState::Playing);
                }
            }
            Err(rejected) if !muted => {
                debug!(card = %self.card, "Playback rejected ({}), retrying muted", rejected);
                self.start_play(true);
            }
            Err(rejected) => {
                debug!(card = %self.card, "Muted playback rejected: {}", rejected);
                self.fail(PreviewErrorReason::PlaybackBlocked);
            }
        }
    }

    // -- observation ---------------------------------------------------------

    fn transition(&mut self, state: SessionState) {
        if self.state != state {
            debug!(card = %self.card, from = %self.state, to = %state, "Preview state changed");
            self.state = state;
        }
        self.publish();
    }

    fn publish(&self) {
        let poster_url = self
            .handle
            .as_ref()
            .filter(|handle| handle.is_for(&self.media))
            .map(|handle| handle.poster_url.clone())
            .unwrap_or_else(|| self.media.poster_fallback_url.clone());

        let next = PreviewSnapshot {
            media_id: self.media.id.clone(),
            state: self.state,
            hover: self.hover.state(),
            poster_url,
            episodes: self.episode,
        };
        self.snapshot.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}
