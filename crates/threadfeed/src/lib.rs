//! Stream reduction and feed reconstruction for agent workspace threads.
//!
//! Model output arrives as a stream of fine-grained chunks. This crate turns
//! those chunks into a stable sequence of feed items, and can replay a stored
//! transcript to reach the identical feed when a thread is reopened.
//!
//! ```text
//! live:    wire message -> normalize -> Reducer (+ AccumulationState) -> LiveFeed
//! reopen:  transcript   -> replay    -> Reducer (+ fresh state)        -> VecSink
//! ```
//!
//! ## Components
//!
//! - **normalize**: raw chunk to canonical [`UpdateKind`](threadfeed_protocol::UpdateKind)
//! - **state**: per-thread accumulation scratch space
//! - **reducer**: the state machine driving a [`FeedSink`]
//! - **sink**: the append/update capability and its list-backed adapter
//! - **legacy**: reconciliation of whole-message and debug-log events
//! - **replay**: transcript-to-feed reconstruction
//! - **session**: live per-thread contexts and their registry
//! - **transcript**: JSONL transcript persistence

pub mod args;
pub mod config;
pub mod dispatch;
pub mod ids;
pub mod legacy;
pub mod normalize;
pub mod reducer;
pub mod replay;
pub mod session;
pub mod sink;
pub mod state;
pub mod transcript;

pub use dispatch::Dispatcher;
pub use ids::{Clock, FixedClock, IdSource, SequentialIds, SystemClock, UuidIds};
pub use normalize::normalize;
pub use reducer::{Reducer, ToolSettled, ToolSettledHook};
pub use replay::replay_transcript;
pub use sink::{FeedSink, VecSink};
pub use state::AccumulationState;
