//! Resolver backed by the configured media catalog.

use async_trait::async_trait;
use std::collections::HashMap;

use super::{ResolveError, ResolveOptions, ResolvedStream, StreamResolver};
use crate::config::MediaEntry;

/// Answers from a fixed table; `force_refresh` has nothing to bypass.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    streams: HashMap<String, ResolvedStream>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every entry that carries a `stream_url`.
    pub fn from_entries(entries: &[MediaEntry]) -> Self {
        let mut resolver = Self::new();
        for entry in entries {
            if let Some(stream_url) = &entry.stream_url {
                resolver.insert(&entry.id, stream_url, &entry.poster_url);
            }
        }
        resolver
    }

    pub fn insert(
        &mut self,
        media_id: impl Into<String>,
        stream_url: impl Into<String>,
        poster_url: impl Into<String>,
    ) {
        self.streams.insert(
            media_id.into(),
            ResolvedStream {
                stream_url: stream_url.into(),
                poster_url: poster_url.into(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

#[async_trait]
impl StreamResolver for StaticResolver {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn resolve(
        &self,
        media_id: &str,
        _options: ResolveOptions,
    ) -> Result<ResolvedStream, ResolveError> {
        self.streams
            .get(media_id)
            .cloned()
            .ok_or_else(|| ResolveError::NotFound(media_id.to_string()))
    }
}
