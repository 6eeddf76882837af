//! Adaptive HLS engine.
//!
//! Fetches the playlist over HTTP, reports the advertised renditions, and
//! runs a playback clock so the session sees the end of the clip. Every load
//! runs in its own task; `destroy` aborts them so nothing keeps a connection
//! open after the session is gone.

use futures::FutureExt;
use marquee_common::StreamLevel;
use parking_lot::Mutex;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use super::manifest::{parse_manifest, Manifest, ManifestError, ManifestKind};
use super::{
    EngineErrorKind, EngineEvent, EngineEventSink, EngineSession, PlayFuture, StreamingEngine,
    VideoSurface,
};
use crate::config::{AutoplayPolicy, EngineConfig};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("invalid playlist: {0}")]
    Parse(#[from] ManifestError),
}

impl FetchError {
    fn kind(&self) -> EngineErrorKind {
        match self {
            FetchError::Http(_) | FetchError::Status(_) => EngineErrorKind::Network,
            FetchError::Parse(_) => EngineErrorKind::Manifest,
        }
    }
}

/// Download and parse the playlist at `url`.
pub async fn fetch_manifest(client: &Client, url: &str) -> Result<Manifest, FetchError> {
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(FetchError::Status(response.status().as_u16()));
    }

    let body = response.text().await?;
    Ok(parse_manifest(url, &body)?)
}

/// Resolve the levels and clip length of `url`.
///
/// A master playlist carries no durations, so the lowest-bandwidth rendition
/// is fetched as well. Failing that second fetch only loses the duration.
async fn load(client: &Client, url: &str) -> Result<(Vec<StreamLevel>, Option<Duration>), FetchError> {
    let manifest = fetch_manifest(client, url).await?;
    if manifest.kind == ManifestKind::Media {
        return Ok((manifest.levels, manifest.duration));
    }

    let duration = match manifest.levels.iter().min_by_key(|l| l.bandwidth.unwrap_or(u64::MAX)) {
        Some(level) => match fetch_manifest(client, &level.uri).await {
            Ok(media) => media.duration,
            Err(e) => {
                tracing::debug!(url = %level.uri, "Could not load rendition playlist: {}", e);
                None
            }
        },
        None => None,
    };

    Ok((manifest.levels, duration))
}

pub struct HlsEngine {
    client: Client,
    autoplay: AutoplayPolicy,
}

impl HlsEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self::with_client(client, config.autoplay))
    }

    pub fn with_client(client: Client, autoplay: AutoplayPolicy) -> Self {
        Self { client, autoplay }
    }
}

impl StreamingEngine for HlsEngine {
    fn name(&self) -> &'static str {
        "hls"
    }

    fn create_session(&self, events: EngineEventSink) -> Box<dyn EngineSession> {
        Box::new(HlsSession {
            client: self.client.clone(),
            autoplay: self.autoplay,
            events,
            surface: None,
            source: None,
            duration: Arc::new(Mutex::new(None)),
            loader: None,
            clock: None,
            destroyed: false,
        })
    }
}

struct HlsSession {
    client: Client,
    autoplay: AutoplayPolicy,
    events: EngineEventSink,
    surface: Option<VideoSurface>,
    source: Option<String>,
    duration: Arc<Mutex<Option<Duration>>>,
    loader: Option<JoinHandle<()>>,
    clock: Option<JoinHandle<()>>,
    destroyed: bool,
}

impl HlsSession {
    fn spawn_loader(&mut self) {
        let Some(url) = self.source.clone() else {
            return;
        };
        if let Some(handle) = self.loader.take() {
            handle.abort();
        }

        let client = self.client.clone();
        let events = self.events.clone();
        let duration = Arc::clone(&self.duration);

        self.loader = Some(tokio::spawn(async move {
            match load(&client, &url).await {
                Ok((levels, clip)) => {
                    *duration.lock() = clip;
                    events.emit(EngineEvent::ManifestParsed {
                        levels,
                        duration: clip,
                    });
                }
                Err(e) => {
                    tracing::debug!(session_id = %events.session(), url = %url, "Manifest load failed: {}", e);
                    events.emit(EngineEvent::Error {
                        kind: e.kind(),
                        fatal: true,
                        details: e.to_string(),
                    });
                }
            }
        }));
    }

    fn start_clock(&mut self) {
        if let Some(handle) = self.clock.take() {
            handle.abort();
        }
        let Some(clip) = *self.duration.lock() else {
            return;
        };
        if clip.is_zero() {
            return;
        }

        let events = self.events.clone();
        self.clock = Some(tokio::spawn(async move {
            tokio::time::sleep(clip).await;
            events.emit(EngineEvent::Ended);
        }));
    }

    fn is_playing(&self) -> bool {
        self.surface.as_ref().is_some_and(VideoSurface::is_playing)
    }
}

impl EngineSession for HlsSession {
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
        self.source = Some(url.to_string());
        if let Some(surface) = &self.surface {
            surface.set_source(Some(url.to_string()));
        }
        self.spawn_loader();
    }

    fn start_load(&mut self) {
        if !self.destroyed {
            self.spawn_loader();
        }
    }

    fn recover_media_error(&mut self) {
        if !self.destroyed && self.is_playing() {
            self.start_clock();
        }
    }

    fn restart(&mut self) {
        if self.destroyed {
            return;
        }
        if let Some(surface) = &self.surface {
            surface.rewind();
        }
        self.start_clock();
    }

    fn play(&mut self, muted: bool) -> PlayFuture {
        if self.destroyed {
            return futures::future::ready(Err(super::PlaybackRejected(
                "session destroyed".to_string(),
            )))
            .boxed();
        }

        let outcome = self.autoplay.check(muted);
        if outcome.is_ok() {
            if let Some(surface) = &self.surface {
                surface.set_muted(muted);
                surface.set_playing(true);
            }
            self.start_clock();
        }
        futures::future::ready(outcome).boxed()
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        if let Some(handle) = self.loader.take() {
            handle.abort();
        }
        if let Some(handle) = self.clock.take() {
            handle.abort();
        }
        self.surface = None;
    }
}

impl Drop for HlsSession {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::SessionEvent;
    use marquee_common::SessionId;
    use tokio::sync::mpsc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MASTER: &str = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=1280x720
playlist_720p.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360
playlist_360p.m3u8
";

    const MEDIA: &str = "#EXTM3U
#EXT-X-TARGETDURATION:2
#EXTINF:2.0,
seg0.ts
#EXTINF:1.5,
seg1.ts
#EXT-X-ENDLIST
";

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> EngineEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for engine event")
            .expect("event channel closed")
            .event
    }

    fn session(autoplay: AutoplayPolicy) -> (Box<dyn EngineSession>, mpsc::UnboundedReceiver<SessionEvent>) {
        let engine = HlsEngine::with_client(Client::new(), autoplay);
        let (tx, rx) = mpsc::unbounded_channel();
        let session = engine.create_session(EngineEventSink::new(SessionId::new(), tx));
        (session, rx)
    }

    #[tokio::test]
    async fn test_fetch_manifest_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.m3u8"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = format!("{}/missing.m3u8", server.uri());
        let err = fetch_manifest(&Client::new(), &url).await.unwrap_err();
        assert!(matches!(err, FetchError::Status(404)));
        assert_eq!(err.kind(), EngineErrorKind::Network);
    }

    #[tokio::test]
    async fn test_load_reports_levels_and_duration() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v/playlist.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MASTER))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v/playlist_360p.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MEDIA))
            .expect(1)
            .mount(&server)
            .await;

        let (mut session, mut rx) = session(AutoplayPolicy::Allowed);
        let surface = VideoSurface::new();
        let url = format!("{}/v/playlist.m3u8", server.uri());

        session.attach_media(&surface);
        session.load_source(&url);

        assert_eq!(next_event(&mut rx).await, EngineEvent::MediaAttached);
        match next_event(&mut rx).await {
            EngineEvent::ManifestParsed { levels, duration } => {
                assert_eq!(levels.len(), 2);
                assert_eq!(levels[0].label(), "720p");
                assert_eq!(duration, Some(Duration::from_millis(3_500)));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(surface.source().as_deref(), Some(url.as_str()));
    }

    #[tokio::test]
    async fn test_unparseable_playlist_is_manifest_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bad.m3u8"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let (mut session, mut rx) = session(AutoplayPolicy::Allowed);
        session.attach_media(&VideoSurface::new());
        session.load_source(&format!("{}/bad.m3u8", server.uri()));

        next_event(&mut rx).await;
        assert!(matches!(
            next_event(&mut rx).await,
            EngineEvent::Error {
                kind: EngineErrorKind::Manifest,
                fatal: true,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_negative_segment_duration_is_manifest_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/live.m3u8"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("#EXTM3U\n#EXTINF:-1,\nseg0.ts\n"),
            )
            .mount(&server)
            .await;

        let (mut session, mut rx) = session(AutoplayPolicy::Allowed);
        session.attach_media(&VideoSurface::new());
        session.load_source(&format!("{}/live.m3u8", server.uri()));

        assert!(matches!(next_event(&mut rx).await, EngineEvent::MediaAttached));
        match next_event(&mut rx).await {
            EngineEvent::Error {
                kind: EngineErrorKind::Manifest,
                fatal: true,
                details,
            } => assert!(details.contains("EXTINF"), "details: {}", details),
            other => panic!("expected fatal manifest error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_play_respects_autoplay_policy() {
        let (mut session, _rx) = session(AutoplayPolicy::MutedOnly);
        let surface = VideoSurface::new();
        session.attach_media(&surface);

        assert!(session.play(false).await.is_err());
        assert!(!surface.is_playing());

        assert!(session.play(true).await.is_ok());
        assert!(surface.is_playing());
        assert!(surface.is_muted());
    }

    #[tokio::test]
    async fn test_destroyed_session_is_inert() {
        let (mut session, mut rx) = session(AutoplayPolicy::Allowed);
        session.destroy();
        session.destroy();

        session.attach_media(&VideoSurface::new());
        assert!(session.play(true).await.is_err());
        assert!(rx.try_recv().is_err());
    }
}
