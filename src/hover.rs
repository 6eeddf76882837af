//! Debounced hover intent for a single card.
//!
//! [`HoverController`] turns raw pointer enter/leave notifications into at most
//! one [`HoverSignal::PreviewRequested`] per settled hover episode, each later
//! matched by exactly one [`HoverSignal::PreviewCancelled`].
//!
//! The controller owns no timers. It records deadlines, exposes the earliest
//! one through [`HoverController::next_deadline`], and the owning task calls
//! [`HoverController::poll`] once that instant has passed. Rapid re-triggering
//! therefore only moves deadlines around; it can never stack callbacks.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::PreviewConfig;

/// Pointer position relative to a card's trigger area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoverState {
    /// Pointer is elsewhere.
    Out,
    /// Pointer is over the trigger, debounce window still open.
    Pending,
    /// Pointer has settled over the card (or its preview surface).
    In,
}

/// Intent emitted to the preview manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoverSignal {
    PreviewRequested,
    PreviewCancelled,
}

/// Debounce, close-grace and cooldown windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoverTiming {
    pub debounce: Duration,
    pub close_delay: Duration,
    pub cooldown: Duration,
}

impl Default for HoverTiming {
    fn default() -> Self {
        Self::from(&PreviewConfig::default())
    }
}

impl From<&PreviewConfig> for HoverTiming {
    fn from(config: &PreviewConfig) -> Self {
        Self {
            debounce: config.debounce(),
            close_delay: config.close_delay(),
            cooldown: config.cooldown(),
        }
    }
}

#[derive(Debug)]
pub struct HoverController {
    timing: HoverTiming,
    state: HoverState,
    debounce_at: Option<Instant>,
    close_at: Option<Instant>,
    /// Settled, but the request waits for the cooldown to run out.
    deferred_until: Option<Instant>,
    /// A request was emitted this episode and still owes a cancel.
    requested: bool,
    last_request: Option<Instant>,
}

impl HoverController {
    pub fn new(timing: HoverTiming) -> Self {
        Self {
            timing,
            state: HoverState::Out,
            debounce_at: None,
            close_at: None,
            deferred_until: None,
            requested: false,
            last_request: None,
        }
    }

    pub fn state(&self) -> HoverState {
        self.state
    }

    pub fn timing(&self) -> HoverTiming {
        self.timing
    }

    /// Whether a request is outstanding for the current episode.
    pub fn is_requested(&self) -> bool {
        self.requested
    }

    pub fn on_pointer_enter(&mut self, now: Instant) {
        match self.state {
            HoverState::Out => {
                self.state = HoverState::Pending;
                self.debounce_at = Some(now + self.timing.debounce);
            }
            HoverState::Pending => {}
            HoverState::In => {
                if self.close_at.take().is_some() {
                    tracing::trace!("Pointer re-entered before close, keeping preview");
                }
            }
        }
    }

    pub fn on_pointer_leave(&mut self, now: Instant) {
        match self.state {
            HoverState::Out => {}
            HoverState::Pending => {
                self.debounce_at = None;
                self.state = HoverState::Out;
            }
            HoverState::In => {
                if self.close_at.is_none() {
                    self.close_at = Some(now + self.timing.close_delay);
                }
            }
        }
    }

    /// Earliest instant at which [`poll`](Self::poll) has work to do.
    ///
    /// A deferred request is parked while the close grace runs.
    pub fn next_deadline(&self) -> Option<Instant> {
        let deferred = self.deferred_until.filter(|_| self.close_at.is_none());
        [self.debounce_at, self.close_at, deferred]
            .into_iter()
            .flatten()
            .min()
    }

    /// Advance expired deadlines, returning at most one signal.
    ///
    /// Call repeatedly until it returns `None`.
    pub fn poll(&mut self, now: Instant) -> Option<HoverSignal> {
        if self.debounce_at.is_some_and(|at| now >= at) {
            self.debounce_at = None;
            self.state = HoverState::In;

            match self.cooldown_until(now) {
                Some(until) => {
                    tracing::debug!(
                        remaining_ms = (until - now).as_millis() as u64,
                        "Hover settled during cooldown, deferring preview request"
                    );
                    self.deferred_until = Some(until);
                }
                None => return Some(self.emit_request(now)),
            }
        }

        if self.close_at.is_some_and(|at| now >= at) {
            self.close_at = None;
            self.deferred_until = None;
            self.state = HoverState::Out;
            return std::mem::take(&mut self.requested).then_some(HoverSignal::PreviewCancelled);
        }

        if self.close_at.is_none() && self.deferred_until.is_some_and(|at| now >= at) {
            self.deferred_until = None;
            return Some(self.emit_request(now));
        }

        None
    }

    /// Force the pointer out, e.g. when the card unmounts.
    ///
    /// Returns the cancel owed to an outstanding request, if any. The cooldown
    /// clock is kept.
    pub fn reset(&mut self) -> Option<HoverSignal> {
        self.state = HoverState::Out;
        self.debounce_at = None;
        self.close_at = None;
        self.deferred_until = None;
        std::mem::take(&mut self.requested).then_some(HoverSignal::PreviewCancelled)
    }

    fn emit_request(&mut self, now: Instant) -> HoverSignal {
        self.requested = true;
        self.last_request = Some(now);
        HoverSignal::PreviewRequested
    }

    fn cooldown_until(&self, now: Instant) -> Option<Instant> {
        self.last_request
            .map(|at| at + self.timing.cooldown)
            .filter(|until| *until > now)
    }
}

impl Default for HoverController {
    fn default() -> Self {
        Self::new(HoverTiming::default())
    }
}
