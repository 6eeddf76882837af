//! Marquee - hover-driven video previews for media browsing cards
//!
//! This library crate exposes the preview session manager and its
//! collaborators for the `marquee` binary and for integration testing.

pub mod budget;
pub mod config;
pub mod hover;
pub mod preview;
pub mod resolver;
pub mod streaming;
