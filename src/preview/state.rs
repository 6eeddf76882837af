//! Per-card preview state and its presentation projection.

use marquee_common::PreviewErrorReason;
use serde::Serialize;
use std::fmt;

use crate::hover::HoverState;

/// Where a card's preview is in its lifecycle. Exactly one per card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    /// Waiting for the resolver.
    Resolving,
    /// Budget slot held; the stream is attaching, loading or starting.
    Attaching,
    Playing,
    Error(PreviewErrorReason),
    /// Torn down; returns to `Idle` unless the card unmounted.
    Stopped,
}

impl SessionState {
    /// States in which a budget slot may be held.
    pub fn holds_slot(&self) -> bool {
        matches!(self, Self::Attaching | Self::Playing)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Resolving | Self::Attaching)
    }

    pub fn error(&self) -> Option<PreviewErrorReason> {
        match self {
            Self::Error(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Resolving => write!(f, "resolving"),
            Self::Attaching => write!(f, "attaching"),
            Self::Playing => write!(f, "playing"),
            Self::Error(reason) => write!(f, "error({})", reason),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// What the presentation layer renders. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresentationSignal {
    pub show_poster: bool,
    pub show_video: bool,
    pub is_loading: bool,
    pub error_message: Option<String>,
    pub poster_url: String,
}

impl PresentationSignal {
    pub fn project(state: SessionState, poster_url: &str) -> Self {
        Self {
            show_poster: state != SessionState::Playing,
            show_video: state == SessionState::Playing,
            is_loading: state.is_loading(),
            error_message: state.error().map(|reason| reason.message().to_string()),
            poster_url: poster_url.to_string(),
        }
    }
}

/// Observable state of one card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewSnapshot {
    pub media_id: String,
    pub state: SessionState,
    pub hover: HoverState,
    /// Resolved poster, or the card's fallback until one is resolved.
    pub poster_url: String,
    /// Number of preview episodes started on this card.
    pub episodes: u64,
}

impl PreviewSnapshot {
    pub fn signal(&self) -> PresentationSignal {
        PresentationSignal::project(self.state, &self.poster_url)
    }
}
