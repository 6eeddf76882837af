//! Resolving a media id to a playable stream.
//!
//! The preview manager only sees the [`StreamResolver`] trait. Two adapters
//! ship with marquee:
//!
//! - [`StaticResolver`]: answers from the `[[media]]` catalog in the config
//! - [`CdnResolver`]: looks videos up in a stream-hosting API and derives
//!   playlist and thumbnail URLs on its CDN

mod cdn;
mod static_catalog;

pub use cdn::{CdnResolver, QUALITY_LEVELS};
pub use static_catalog::StaticResolver;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{Config, ResolverKind};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Skip any cached answer and ask the upstream service again.
    pub force_refresh: bool,
}

impl ResolveOptions {
    pub fn fresh() -> Self {
        Self {
            force_refresh: true,
        }
    }
}

/// What a resolver hands back for one media id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedStream {
    pub stream_url: String,
    pub poster_url: String,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no stream for media {0}")]
    NotFound(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("Video preview is currently unavailable ({0})")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Resolver trait
// ---------------------------------------------------------------------------

/// Async lookup from media id to stream and poster URLs.
///
/// Implementations may be slow and may fail; callers must not assume the
/// answer arrives before the user has moved on.
#[async_trait]
pub trait StreamResolver: Send + Sync {
    /// Short, lowercase identifier (e.g. `"cdn"`).
    fn name(&self) -> &'static str;

    async fn resolve(
        &self,
        media_id: &str,
        options: ResolveOptions,
    ) -> Result<ResolvedStream, ResolveError>;
}

/// Build the resolver selected in configuration.
pub fn resolver_from_config(config: &Config) -> anyhow::Result<Arc<dyn StreamResolver>> {
    match config.resolver.kind {
        ResolverKind::Static => Ok(Arc::new(StaticResolver::from_entries(&config.media))),
        ResolverKind::Cdn => Ok(Arc::new(CdnResolver::new(&config.resolver)?)),
    }
}
