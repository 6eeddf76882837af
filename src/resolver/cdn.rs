//! Stream-hosting service resolver.
//!
//! Looks a video up at `{api_base_url}/{library_id}/videos/{id}` and derives
//! the playlist and thumbnail URLs from the returned `guid`:
//!
//! - `{cdn_base_url}/{guid}/playlist.m3u8`
//! - `{cdn_base_url}/{guid}/thumbnail.jpg`
//!
//! Answers are cached per media id and re-validated with a `HEAD` request
//! before a cached URL is handed out again. Any failure evicts the entry and
//! falls back to the configured fallback video, if there is one.

use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{ResolveError, ResolveOptions, ResolvedStream, StreamResolver};
use crate::config::ResolverConfig;

/// Per-rendition playlists published next to the master playlist.
pub const QUALITY_LEVELS: [&str; 4] = ["1080p", "720p", "480p", "360p"];

#[derive(Debug, Deserialize)]
struct VideoDetails {
    #[serde(default)]
    guid: Option<String>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    stream: ResolvedStream,
    cached_at: Instant,
}

pub struct CdnResolver {
    client: Client,
    api_base_url: String,
    library_id: String,
    api_key: String,
    cdn_base_url: String,
    cache_ttl: Duration,
    validate_urls: bool,
    fallback_video_id: Option<String>,
    cache: DashMap<String, CacheEntry>,
}

impl CdnResolver {
    pub fn new(config: &ResolverConfig) -> anyhow::Result<Self> {
        let api_base_url = config
            .api_base_url
            .as_deref()
            .context("CDN resolver requires resolver.api_base_url")?;
        let library_id = config
            .library_id
            .as_deref()
            .context("CDN resolver requires resolver.library_id")?;
        let cdn_base_url = config
            .cdn_base_url
            .as_deref()
            .context("CDN resolver requires resolver.cdn_base_url")?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with timeout: {}", e);
                Client::new()
            });

        Ok(Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            library_id: library_id.to_string(),
            api_key: config.api_key.clone(),
            cdn_base_url: cdn_base_url.trim_end_matches('/').to_string(),
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            validate_urls: config.validate_urls,
            fallback_video_id: config.fallback_video_id.clone(),
            cache: DashMap::new(),
        })
    }

    pub fn playlist_url(&self, guid: &str) -> String {
        format!("{}/{}/playlist.m3u8", self.cdn_base_url, guid)
    }

    pub fn thumbnail_url(&self, guid: &str) -> String {
        format!("{}/{}/thumbnail.jpg", self.cdn_base_url, guid)
    }

    /// Fixed-rendition playlists for `guid`, highest first.
    pub fn quality_urls(&self, guid: &str) -> Vec<(&'static str, String)> {
        QUALITY_LEVELS
            .iter()
            .map(|q| (*q, format!("{}/{}/playlist_{}.m3u8", self.cdn_base_url, guid, q)))
            .collect()
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    pub fn invalidate(&self, media_id: &str) {
        self.cache.remove(media_id);
    }

    fn streams_for(&self, guid: &str) -> ResolvedStream {
        ResolvedStream {
            stream_url: self.playlist_url(guid),
            poster_url: self.thumbnail_url(guid),
        }
    }

    fn cached(&self, media_id: &str) -> Option<ResolvedStream> {
        let fresh = self
            .cache
            .get(media_id)
            .filter(|entry| entry.cached_at.elapsed() < self.cache_ttl)
            .map(|entry| entry.stream.clone());

        if fresh.is_none() {
            self.cache
                .remove_if(media_id, |_, entry| entry.cached_at.elapsed() >= self.cache_ttl);
        }
        fresh
    }

    /// Drop every entry whose TTL has run out.
    fn evict_expired(&self) {
        self.cache
            .retain(|_, entry| entry.cached_at.elapsed() < self.cache_ttl);
    }

    async fn validate(&self, url: &str) -> Result<(), ResolveError> {
        if !self.validate_urls {
            return Ok(());
        }

        let response = self.client.head(url).send().await?;
        if !response.status().is_success() {
            return Err(ResolveError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }

    async fn lookup(&self, media_id: &str) -> Result<ResolvedStream, ResolveError> {
        let url = format!(
            "{}/{}/videos/{}",
            self.api_base_url, self.library_id, media_id
        );

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .header("AccessKey", &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ResolveError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        let details: VideoDetails = response
            .json()
            .await
            .map_err(|e| ResolveError::InvalidResponse(e.to_string()))?;
        let guid = details
            .guid
            .filter(|g| !g.trim().is_empty())
            .ok_or_else(|| ResolveError::InvalidResponse("video details without guid".into()))?;

        let stream = self.streams_for(&guid);
        self.validate(&stream.stream_url).await?;
        Ok(stream)
    }

    async fn fallback(&self, cause: ResolveError) -> Result<ResolvedStream, ResolveError> {
        let Some(guid) = &self.fallback_video_id else {
            return Err(ResolveError::Unavailable(cause.to_string()));
        };

        let stream = self.streams_for(guid);
        match self.validate(&stream.stream_url).await {
            Ok(()) => {
                debug!(fallback = %guid, "Serving fallback preview video");
                Ok(stream)
            }
            Err(e) => Err(ResolveError::Unavailable(format!(
                "{}; fallback failed: {}",
                cause, e
            ))),
        }
    }
}

#[async_trait]
impl StreamResolver for CdnResolver {
    fn name(&self) -> &'static str {
        "cdn"
    }

    async fn resolve(
        &self,
        media_id: &str,
        options: ResolveOptions,
    ) -> Result<ResolvedStream, ResolveError> {
        if !options.force_refresh {
            if let Some(stream) = self.cached(media_id) {
                match self.validate(&stream.stream_url).await {
                    Ok(()) => {
                        debug!(media_id = %media_id, "Using cached stream");
                        return Ok(stream);
                    }
                    Err(e) => {
                        debug!(media_id = %media_id, "Cached stream is no longer valid: {}", e);
                        self.cache.remove(media_id);
                    }
                }
            }
        }

        match self.lookup(media_id).await {
            Ok(stream) => {
                self.evict_expired();
                self.cache.insert(
                    media_id.to_string(),
                    CacheEntry {
                        stream: stream.clone(),
                        cached_at: Instant::now(),
                    },
                );
                Ok(stream)
            }
            Err(e) => {
                warn!(media_id = %media_id, "Stream lookup failed: {}", e);
                self.cache.remove(media_id);
                self.fallback(e).await
            }
        }
    }
}
