//! The render target a streaming session attaches to.
//!
//! A [`VideoSurface`] is a cheap, cloneable handle shared by the card (which
//! reads what to show) and the engine (which writes the source and playback
//! flags). It enforces that only one session is attached at a time and keeps
//! counters so tests can check that attach and detach strictly alternate.

use marquee_common::{Error, SessionId, SurfaceId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct VideoSurface {
    inner: Arc<SurfaceInner>,
}

#[derive(Debug)]
struct SurfaceInner {
    id: SurfaceId,
    attached: Mutex<Option<SessionId>>,
    source: Mutex<Option<String>>,
    muted: AtomicBool,
    playing: AtomicBool,
    attaches: AtomicU64,
    detaches: AtomicU64,
    loops: AtomicU64,
}

impl VideoSurface {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SurfaceInner {
                id: SurfaceId::new(),
                attached: Mutex::new(None),
                source: Mutex::new(None),
                muted: AtomicBool::new(true),
                playing: AtomicBool::new(false),
                attaches: AtomicU64::new(0),
                detaches: AtomicU64::new(0),
                loops: AtomicU64::new(0),
            }),
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.inner.id
    }

    /// Bind `session` to this surface.
    ///
    /// Fails if another session is still attached; callers must destroy the
    /// previous session first.
    pub fn claim(&self, session: SessionId) -> marquee_common::Result<()> {
        let mut attached = self.inner.attached.lock();
        if let Some(current) = *attached {
            return Err(Error::misuse(format!(
                "surface {} already hosts session {}",
                self.inner.id, current
            )));
        }
        *attached = Some(session);
        self.inner.attaches.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Unbind `session`; a no-op if it is not the attached one.
    pub fn release(&self, session: SessionId) {
        let mut attached = self.inner.attached.lock();
        if *attached == Some(session) {
            *attached = None;
            *self.inner.source.lock() = None;
            self.inner.playing.store(false, Ordering::Release);
            self.inner.detaches.fetch_add(1, Ordering::AcqRel);
        }
    }

    pub fn attached_session(&self) -> Option<SessionId> {
        *self.inner.attached.lock()
    }

    pub fn is_attached(&self) -> bool {
        self.attached_session().is_some()
    }

    pub fn set_source(&self, url: Option<String>) {
        *self.inner.source.lock() = url;
    }

    pub fn source(&self) -> Option<String> {
        self.inner.source.lock().clone()
    }

    pub fn set_muted(&self, muted: bool) {
        self.inner.muted.store(muted, Ordering::Release);
    }

    pub fn is_muted(&self) -> bool {
        self.inner.muted.load(Ordering::Acquire)
    }

    pub fn set_playing(&self, playing: bool) {
        self.inner.playing.store(playing, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.inner.playing.load(Ordering::Acquire)
    }

    /// Record a seek back to the start of the clip.
    pub fn rewind(&self) {
        self.inner.loops.fetch_add(1, Ordering::AcqRel);
    }

    pub fn attach_count(&self) -> u64 {
        self.inner.attaches.load(Ordering::Acquire)
    }

    pub fn detach_count(&self) -> u64 {
        self.inner.detaches.load(Ordering::Acquire)
    }

    pub fn loop_count(&self) -> u64 {
        self.inner.loops.load(Ordering::Acquire)
    }
}

impl Default for VideoSurface {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_occupant() {
        let surface = VideoSurface::new();
        let first = SessionId::new();
        let second = SessionId::new();

        surface.claim(first).unwrap();
        let err = surface.claim(second).unwrap_err();
        assert!(err.is_misuse());
        assert_eq!(surface.attached_session(), Some(first));

        surface.release(first);
        surface.claim(second).unwrap();
        assert_eq!(surface.attach_count(), 2);
        assert_eq!(surface.detach_count(), 1);
    }

    #[test]
    fn test_release_by_stranger_is_ignored() {
        let surface = VideoSurface::new();
        let owner = SessionId::new();

        surface.claim(owner).unwrap();
        surface.release(SessionId::new());
        assert!(surface.is_attached());
        assert_eq!(surface.detach_count(), 0);
    }

    #[test]
    fn test_release_clears_playback() {
        let surface = VideoSurface::new();
        let owner = SessionId::new();

        surface.claim(owner).unwrap();
        surface.set_source(Some("https://cdn/a.m3u8".into()));
        surface.set_playing(true);
        surface.release(owner);

        assert_eq!(surface.source(), None);
        assert!(!surface.is_playing());
    }
}
