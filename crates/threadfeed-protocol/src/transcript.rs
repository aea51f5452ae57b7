//! Transcript entry types.
//!
//! A transcript is the append-only, time-ordered log of wire traffic for one
//! thread. Payloads are stored exactly as sent or received.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which side produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Received from the server.
    Server,
    /// Sent by this client.
    Client,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Client => "client",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    /// Accepts surrounding whitespace and any letter case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "server" => Ok(Self::Server),
            "client" => Ok(Self::Client),
            other => Err(format!("direction must be 'server' or 'client', got '{other}'")),
        }
    }
}

/// One persisted wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    /// When the message was sent or received (RFC 3339).
    pub ts: String,

    /// Owning thread.
    pub thread_id: String,

    /// Origin of the message.
    pub direction: Direction,

    /// The wire message, stored opaquely.
    pub payload: Value,
}

impl TranscriptEntry {
    pub fn new(
        ts: impl Into<String>,
        thread_id: impl Into<String>,
        direction: Direction,
        payload: Value,
    ) -> Self {
        Self {
            ts: ts.into(),
            thread_id: thread_id.into(),
            direction,
            payload,
        }
    }

    pub fn server(ts: impl Into<String>, thread_id: impl Into<String>, payload: Value) -> Self {
        Self::new(ts, thread_id, Direction::Server, payload)
    }

    pub fn client(ts: impl Into<String>, thread_id: impl Into<String>, payload: Value) -> Self {
        Self::new(ts, thread_id, Direction::Client, payload)
    }
}
