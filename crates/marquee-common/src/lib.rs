//! Marquee-Common: shared ids, media types, and errors.
//!
//! This crate holds the pieces every other part of marquee agrees on:
//!
//! - **Typed IDs**: UUID wrappers for cards, streaming sessions and video surfaces
//! - **Media types**: [`MediaRef`], [`StreamHandle`], [`StreamLevel`]
//! - **Preview errors**: the user-facing [`PreviewErrorReason`] taxonomy
//! - **Error Handling**: a common error type and result alias
//!
//! # Examples
//!
//! ```
//! use marquee_common::{CardId, MediaRef, PreviewErrorReason};
//!
//! let card = CardId::new();
//! let media = MediaRef::new("pantheon-highlight", "Pantheon Highlights", "/posters/pantheon.png");
//!
//! assert_eq!(media.id, "pantheon-highlight");
//! assert_eq!(PreviewErrorReason::TooManyPreviews.code(), "too-many-previews");
//! assert_ne!(card, CardId::new());
//! ```

pub mod error;
pub mod ids;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
