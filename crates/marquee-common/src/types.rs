//! Media and preview types shared across marquee.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a previewable item, created when a card is built from catalog data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    /// Catalog / stream-service identifier.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Poster shown until (or instead of) the resolved poster.
    pub poster_fallback_url: String,
}

impl MediaRef {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        poster_fallback_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            poster_fallback_url: poster_fallback_url.into(),
        }
    }
}

/// Result of a successful resolve, owned by the card that requested it.
///
/// A handle is only meaningful for the media id it was resolved for; see
/// [`StreamHandle::is_for`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHandle {
    /// Media id this handle was resolved for.
    pub media_id: String,
    /// Adaptive manifest (or progressive file) URL.
    pub stream_url: String,
    /// Poster image URL returned alongside the stream.
    pub poster_url: String,
    /// When the resolver answered.
    pub resolved_at: DateTime<Utc>,
}

impl StreamHandle {
    pub fn new(
        media_id: impl Into<String>,
        stream_url: impl Into<String>,
        poster_url: impl Into<String>,
    ) -> Self {
        Self {
            media_id: media_id.into(),
            stream_url: stream_url.into(),
            poster_url: poster_url.into(),
            resolved_at: Utc::now(),
        }
    }

    /// Whether this handle may be used for `media`.
    pub fn is_for(&self, media: &MediaRef) -> bool {
        self.media_id == media.id
    }
}

/// One rendition advertised by a stream manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamLevel {
    /// Peak bandwidth in bits per second, if advertised.
    pub bandwidth: Option<u64>,
    /// Frame width, if advertised.
    pub width: Option<u32>,
    /// Frame height, if advertised.
    pub height: Option<u32>,
    /// Codec string (RFC 6381), if advertised.
    pub codecs: Option<String>,
    /// Playlist or file URI for this rendition.
    pub uri: String,
}

impl StreamLevel {
    /// A single level with no advertised attributes (progressive files, media playlists).
    pub fn single(uri: impl Into<String>) -> Self {
        Self {
            bandwidth: None,
            width: None,
            height: None,
            codecs: None,
            uri: uri.into(),
        }
    }

    /// Human label such as `720p` or `2.5 Mbps`.
    pub fn label(&self) -> String {
        match (self.height, self.bandwidth) {
            (Some(h), _) => format!("{}p", h),
            (None, Some(bw)) => format!("{:.1} Mbps", bw as f64 / 1_000_000.0),
            (None, None) => "source".to_string(),
        }
    }
}

/// Why a card's preview ended up in the error state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreviewErrorReason {
    /// The stream resolver failed or returned unusable data.
    ResolveFailed,
    /// The process-wide preview cap was reached.
    TooManyPreviews,
    /// The streaming engine gave up after its internal recovery attempts.
    StreamingFatal,
    /// `play()` was rejected even after a muted retry.
    PlaybackBlocked,
}

impl PreviewErrorReason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ResolveFailed => "resolve-failed",
            Self::TooManyPreviews => "too-many-previews",
            Self::StreamingFatal => "streaming-fatal",
            Self::PlaybackBlocked => "playback-blocked",
        }
    }

    /// Inline text for the preview surface.
    pub fn message(&self) -> &'static str {
        match self {
            Self::ResolveFailed => "Unable to load preview",
            Self::TooManyPreviews => "Too many previews playing",
            Self::StreamingFatal => "Failed to load preview",
            Self::PlaybackBlocked => "Preview playback was blocked",
        }
    }
}

impl fmt::Display for PreviewErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
