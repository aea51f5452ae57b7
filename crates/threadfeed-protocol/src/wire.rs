//! Decoded server/client messages.
//!
//! Payloads arrive as untyped JSON. [`WireMessage::decode`] never fails: a
//! payload whose `type` is unknown, or whose fields do not match the declared
//! type, becomes [`WireMessage::Other`] carrying the declared type name.

use serde::Deserialize;
use serde_json::Value;

use crate::chunks::RawChunk;

/// Message type carrying a stream chunk.
pub const MODEL_STREAM_CHUNK: &str = "model_stream_chunk";

/// A wire message the feed engine knows how to interpret.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    /// Granular model output.
    ModelStreamChunk(RawChunk),
    /// A user prompt (client send or server echo).
    UserMessage {
        text: String,
        client_message_id: Option<String>,
    },
    /// Whole assistant message (legacy, may echo streamed text).
    AssistantMessage { text: String },
    /// Whole reasoning block (legacy, may echo streamed reasoning).
    Reasoning { kind: Option<String>, text: String },
    /// Replacement todo list.
    Todos { items: Vec<Value> },
    /// Free-text debug line.
    Log { line: String },
    /// Error surfaced by the server.
    Error {
        message: String,
        code: Option<String>,
        source: Option<String>,
    },
    /// Busy/idle transition of the server session.
    SessionBusy { busy: bool },
    /// Anything else, identified only by its declared type.
    Other { message_type: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KnownMessage {
    ModelStreamChunk(RawChunk),
    #[serde(rename_all = "camelCase")]
    UserMessage {
        text: String,
        #[serde(default)]
        client_message_id: Option<String>,
    },
    AssistantMessage {
        text: String,
    },
    Reasoning {
        #[serde(default)]
        kind: Option<String>,
        text: String,
    },
    Todos {
        #[serde(default)]
        items: Vec<Value>,
    },
    Log {
        line: String,
    },
    Error {
        message: String,
        #[serde(default)]
        code: Option<Value>,
        #[serde(default)]
        source: Option<String>,
    },
    SessionBusy {
        busy: bool,
    },
}

impl From<KnownMessage> for WireMessage {
    fn from(msg: KnownMessage) -> Self {
        match msg {
            KnownMessage::ModelStreamChunk(chunk) => Self::ModelStreamChunk(chunk),
            KnownMessage::UserMessage {
                text,
                client_message_id,
            } => Self::UserMessage {
                text,
                client_message_id,
            },
            KnownMessage::AssistantMessage { text } => Self::AssistantMessage { text },
            KnownMessage::Reasoning { kind, text } => Self::Reasoning { kind, text },
            KnownMessage::Todos { items } => Self::Todos { items },
            KnownMessage::Log { line } => Self::Log { line },
            KnownMessage::Error {
                message,
                code,
                source,
            } => Self::Error {
                message,
                code: code.and_then(code_to_string),
                source,
            },
            KnownMessage::SessionBusy { busy } => Self::SessionBusy { busy },
        }
    }
}

fn code_to_string(code: Value) -> Option<String> {
    match code {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

impl WireMessage {
    /// Decode a payload by its declared `type`.
    pub fn decode(payload: &Value) -> Self {
        let message_type = message_type(payload).unwrap_or("unknown");
        match serde_json::from_value::<KnownMessage>(payload.clone()) {
            Ok(known) => known.into(),
            Err(_) => Self::Other {
                message_type: message_type.to_string(),
            },
        }
    }

    /// The wire `type` this message was decoded from.
    pub fn message_type(&self) -> &str {
        match self {
            Self::ModelStreamChunk(_) => MODEL_STREAM_CHUNK,
            Self::UserMessage { .. } => "user_message",
            Self::AssistantMessage { .. } => "assistant_message",
            Self::Reasoning { .. } => "reasoning",
            Self::Todos { .. } => "todos",
            Self::Log { .. } => "log",
            Self::Error { .. } => "error",
            Self::SessionBusy { .. } => "session_busy",
            Self::Other { message_type } => message_type,
        }
    }
}

/// Declared `type` of a raw payload.
pub fn message_type(payload: &Value) -> Option<&str> {
    payload.get("type").and_then(Value::as_str)
}

/// Session the payload claims to belong to, if any.
pub fn session_id(payload: &Value) -> Option<&str> {
    payload.get("sessionId").and_then(Value::as_str)
}
