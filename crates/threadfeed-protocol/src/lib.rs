//! Wire and feed types for threadfeed.
//!
//! This crate defines the shapes that cross the boundaries of the feed
//! reconstruction engine:
//!
//! ```text
//! Transport --[wire messages]--> threadfeed --[feed items]--> UI / persistence
//!     |                              ^
//!     +--[transcript entries]--> Store --(replay on reopen)
//! ```
//!
//! ## Design Principles
//!
//! 1. **Chunks are opaque until normalized.** A [`RawChunk`] keeps its `part`
//!    as an untyped JSON bag; everything past the normalizer speaks the closed
//!    [`UpdateKind`] set.
//! 2. **Feed items have stable ids.** An id assigned to an entity never changes.
//! 3. **Transcripts are stored verbatim.** A [`TranscriptEntry`] payload is the
//!    exact message sent or received.
//! 4. **Forward-compatible.** Unknown shapes degrade to fallbacks, never errors.

pub mod chunks;
pub mod feed;
pub mod transcript;
pub mod wire;

pub use chunks::{RawChunk, ReasoningMode, StreamUpdate, UpdateKind};
pub use feed::{FeedBody, FeedItem, Role, ToolStatus};
pub use transcript::{Direction, TranscriptEntry};
pub use wire::WireMessage;
