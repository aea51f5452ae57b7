//! Feed item types.
//!
//! Feed items are the rendered and persisted units of a conversation. Each
//! carries a stable `id` and the timestamp at which it was first created.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chunks::ReasoningMode;

/// One stable-id unit of conversation content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    /// Stable for the lifetime of the entity the item represents.
    pub id: String,

    /// Creation timestamp (RFC 3339).
    pub ts: String,

    /// Variant content.
    #[serde(flatten)]
    pub body: FeedBody,
}

impl FeedItem {
    pub fn new(id: impl Into<String>, ts: impl Into<String>, body: FeedBody) -> Self {
        Self {
            id: id.into(),
            ts: ts.into(),
            body,
        }
    }

    /// Text of a message or reasoning item.
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            FeedBody::Message { text, .. } | FeedBody::Reasoning { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Line of a system or log item.
    pub fn line(&self) -> Option<&str> {
        match &self.body {
            FeedBody::System { line } | FeedBody::Log { line } => Some(line),
            _ => None,
        }
    }

    pub fn is_tool(&self) -> bool {
        matches!(self.body, FeedBody::Tool { .. })
    }
}

/// Feed item content, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedBody {
    Message {
        role: Role,
        text: String,
    },
    Reasoning {
        mode: ReasoningMode,
        text: String,
    },
    Tool {
        status: ToolStatus,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    Todos {
        items: Vec<Value>,
    },
    Log {
        line: String,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
    System {
        line: String,
    },
}

/// Author of a message item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// Lifecycle of a tool item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Running,
    Done,
    Error,
}

impl ToolStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Done => write!(f, "done"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_serialization() {
        let item = FeedItem::new(
            "item-1",
            "2025-01-01T00:00:00.000Z",
            FeedBody::Message {
                role: Role::Assistant,
                text: "Hello".to_string(),
            },
        );

        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"kind\":\"message\""));
        assert!(json.contains("\"role\":\"assistant\""));

        let parsed: FeedItem = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, item);
        assert_eq!(parsed.text(), Some("Hello"));
    }

    #[test]
    fn test_tool_omits_missing_fields() {
        let item = FeedItem::new(
            "item-2",
            "ts",
            FeedBody::Tool {
                status: ToolStatus::Running,
                name: "bash".to_string(),
                args: None,
                result: None,
            },
        );

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["kind"], "tool");
        assert_eq!(json["status"], "running");
        assert!(json.get("args").is_none());
        assert!(json.get("result").is_none());
        assert!(item.is_tool());
    }

    #[test]
    fn test_error_item_round_trip() {
        let value = json!({
            "id": "e1",
            "ts": "ts",
            "kind": "error",
            "message": "boom",
            "code": "E42"
        });
        let item: FeedItem = serde_json::from_value(value).unwrap();
        match &item.body {
            FeedBody::Error {
                message,
                code,
                source,
            } => {
                assert_eq!(message, "boom");
                assert_eq!(code.as_deref(), Some("E42"));
                assert!(source.is_none());
            }
            other => panic!("expected error item, got {other:?}"),
        }
    }

    #[test]
    fn test_tool_status_terminal() {
        assert!(!ToolStatus::Running.is_terminal());
        assert!(ToolStatus::Done.is_terminal());
        assert!(ToolStatus::Error.is_terminal());
    }
}
