//! Progressive (single file) playback.
//!
//! Used where adaptive streaming is not available. There is no manifest to
//! fetch: the source itself is the only level, so it is reported as soon as
//! it is set.

use futures::FutureExt;
use marquee_common::StreamLevel;

use super::{
    EngineEvent, EngineEventSink, EngineSession, PlayFuture, PlaybackRejected, StreamingEngine,
    VideoSurface,
};
use crate::config::AutoplayPolicy;

pub struct ProgressiveEngine {
    autoplay: AutoplayPolicy,
}

impl ProgressiveEngine {
    pub fn new(autoplay: AutoplayPolicy) -> Self {
        Self { autoplay }
    }
}

impl StreamingEngine for ProgressiveEngine {
    fn name(&self) -> &'static str {
        "progressive"
    }

    fn create_session(&self, events: EngineEventSink) -> Box<dyn EngineSession> {
        Box::new(ProgressiveSession {
            autoplay: self.autoplay,
            events,
            surface: None,
            destroyed: false,
        })
    }
}

struct ProgressiveSession {
    autoplay: AutoplayPolicy,
    events: EngineEventSink,
    surface: Option<VideoSurface>,
    destroyed: bool,
}

impl EngineSession for ProgressiveSession {
    fn attach_media(&mut self, surface: &VideoSurface) {
        if self.destroyed {
            return;
        }
        self.surface = Some(surface.clone());
        self.events.emit(EngineEvent::MediaAttached);
    }

    fn load_source(&mut self, url: &str) {
        if self.destroyed {
            return;
        }
        if let Some(surface) = &self.surface {
            surface.set_source(Some(url.to_string()));
        }
        self.events.emit(EngineEvent::ManifestParsed {
            levels: vec![StreamLevel::single(url)],
            duration: None,
        });
    }

    // Nothing is buffered ahead of the decoder.
    fn start_load(&mut self) {}

    fn recover_media_error(&mut self) {}

    fn restart(&mut self) {
        if let Some(surface) = &self.surface {
            surface.rewind();
        }
    }

    fn play(&mut self, muted: bool) -> PlayFuture {
        let outcome = if self.destroyed {
            Err(PlaybackRejected("session destroyed".to_string()))
        } else {
            self.autoplay.check(muted)
        };

        if outcome.is_ok() {
            if let Some(surface) = &self.surface {
                surface.set_muted(muted);
                surface.set_playing(true);
            }
        }
        futures::future::ready(outcome).boxed()
    }

    fn destroy(&mut self) {
        self.destroyed = true;
        self.surface = None;
    }
}
