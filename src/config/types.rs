use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub preview: PreviewConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub media: Vec<MediaEntry>,
}

/// Hover timing and session limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PreviewConfig {
    /// Pointer must rest this long before a preview is requested
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Grace period after leaving before the preview is cancelled
    #[serde(default = "default_close_delay_ms")]
    pub close_delay_ms: u64,

    /// Minimum gap between two preview requests on the same card
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Process-wide cap on live streaming sessions
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Engine-level recovery attempts before a session fails
    #[serde(default = "default_max_recovery_attempts")]
    pub max_recovery_attempts: u32,

    /// Start previews muted instead of trying with sound first
    #[serde(default)]
    pub start_muted: bool,
}

fn default_debounce_ms() -> u64 {
    300
}
fn default_close_delay_ms() -> u64 {
    100
}
fn default_cooldown_ms() -> u64 {
    1000
}
fn default_max_concurrent() -> usize {
    2
}
fn default_max_recovery_attempts() -> u32 {
    3
}

impl PreviewConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn close_delay(&self) -> Duration {
        Duration::from_millis(self.close_delay_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            close_delay_ms: default_close_delay_ms(),
            cooldown_ms: default_cooldown_ms(),
            max_concurrent: default_max_concurrent(),
            max_recovery_attempts: default_max_recovery_attempts(),
            start_muted: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub kind: EngineKind,

    /// Timeout for manifest requests
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Host autoplay restrictions applied by the engines
    #[serde(default)]
    pub autoplay: AutoplayPolicy,
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::default(),
            request_timeout_secs: default_request_timeout(),
            autoplay: AutoplayPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Adaptive engine, progressive if the HTTP client cannot be built
    #[default]
    Auto,
    Hls,
    Progressive,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AutoplayPolicy {
    #[default]
    Allowed,
    /// Only muted playback may start without a user gesture
    MutedOnly,
    Blocked,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolverConfig {
    #[serde(default)]
    pub kind: ResolverKind,

    /// Stream service API root, e.g. `https://video.bunnycdn.com/library`
    #[serde(default)]
    pub api_base_url: Option<String>,

    #[serde(default)]
    pub library_id: Option<String>,

    /// Sent as the `AccessKey` header
    #[serde(default)]
    pub api_key: String,

    /// CDN origin serving playlists and thumbnails
    #[serde(default)]
    pub cdn_base_url: Option<String>,

    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_resolver_timeout")]
    pub timeout_secs: u64,

    /// HEAD-check stream URLs before handing them out
    #[serde(default = "default_validate_urls")]
    pub validate_urls: bool,

    /// Video served when a lookup fails (default: none)
    #[serde(default)]
    pub fallback_video_id: Option<String>,
}

fn default_cache_ttl() -> u64 {
    300
}
fn default_resolver_timeout() -> u64 {
    5
}
fn default_validate_urls() -> bool {
    true
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            kind: ResolverKind::default(),
            api_base_url: None,
            library_id: None,
            api_key: String::new(),
            cdn_base_url: None,
            cache_ttl_secs: default_cache_ttl(),
            timeout_secs: default_resolver_timeout(),
            validate_urls: default_validate_urls(),
            fallback_video_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    /// Resolve from the `[[media]]` entries
    #[default]
    Static,
    Cdn,
}

/// One catalog entry a card can be built from.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaEntry {
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub poster_url: String,

    /// Used by the static resolver
    #[serde(default)]
    pub stream_url: Option<String>,
}

impl MediaEntry {
    pub fn media_ref(&self) -> marquee_common::MediaRef {
        marquee_common::MediaRef::new(&self.id, &self.title, &self.poster_url)
    }
}
