//! Live thread sessions.
//!
//! A [`ThreadSession`] is the explicit per-thread context: accumulation state,
//! dispatcher, live feed and unflushed transcript traffic. The
//! [`ThreadRegistry`] owns the sessions of open threads and ties them to a
//! [`TranscriptStore`](crate::transcript::TranscriptStore).

mod live;
mod registry;
mod thread;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::reducer::{ToolSettled, ToolSettledHook};
use crate::transcript::TranscriptError;

pub use live::{DEFAULT_MAX_ITEMS, FeedChange, LiveFeed};
pub use registry::{RegistryOptions, ThreadRegistry};
pub use thread::ThreadSession;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors surfaced to callers of a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The transport refused the message.
    #[error("not connected: {0}")]
    NotConnected(String),

    /// Transcript persistence failed.
    #[error("transcript error: {0}")]
    Transcript(#[from] TranscriptError),
}

/// Outbound half of the connection to a server session.
pub trait Transport: Send + Sync {
    /// Hand a message to the connection. `false` when it was not accepted.
    fn send(&self, message: &Value) -> bool;
}

/// Tool-settled hook that forwards notifications to a channel.
///
/// Sending never blocks; notifications are dropped once the receiver is gone.
pub fn tool_settled_channel() -> (ToolSettledHook, mpsc::UnboundedReceiver<ToolSettled>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let hook: ToolSettledHook = Arc::new(move |settled: &ToolSettled| {
        let _ = tx.send(settled.clone());
    });
    (hook, rx)
}
