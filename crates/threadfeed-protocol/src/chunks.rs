//! Stream chunk types.
//!
//! A [`RawChunk`] is what the server sends inside a `model_stream_chunk`
//! message. The normalizer turns it into a [`StreamUpdate`], whose
//! [`UpdateKind`] is a closed set the reducer matches exhaustively.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Raw chunk
// ============================================================================

/// One granular chunk of model output as delivered on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChunk {
    /// Identifies the model-generation turn this chunk belongs to.
    #[serde(default)]
    pub turn_id: String,

    /// Position of the chunk within its turn.
    #[serde(default)]
    pub index: u64,

    /// Discriminator for `part`.
    pub part_type: String,

    /// Untyped payload; shape depends on `part_type`.
    #[serde(default)]
    pub part: Value,
}

// ============================================================================
// Canonical updates
// ============================================================================

/// Reasoning block flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningMode {
    #[default]
    Reasoning,
    Summary,
}

impl ReasoningMode {
    /// `Summary` iff the label is exactly `"summary"`.
    pub fn from_label(label: Option<&str>) -> Self {
        match label {
            Some("summary") => Self::Summary,
            _ => Self::Reasoning,
        }
    }
}

impl std::fmt::Display for ReasoningMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reasoning => write!(f, "reasoning"),
            Self::Summary => write!(f, "summary"),
        }
    }
}

/// A normalized stream update with its turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamUpdate {
    /// Turn that produced the update.
    pub turn_id: String,

    /// What happened.
    #[serde(flatten)]
    pub kind: UpdateKind,
}

impl StreamUpdate {
    pub fn new(turn_id: impl Into<String>, kind: UpdateKind) -> Self {
        Self {
            turn_id: turn_id.into(),
            kind,
        }
    }
}

/// Every update the reducer understands, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateKind {
    // -- Turn lifecycle --
    TurnStart,
    TurnFinish {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Value>,
    },
    TurnAbort {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    TurnError {
        error: Value,
    },

    // -- Provider step boundaries (never rendered) --
    StepStart {
        part: Value,
    },
    StepFinish {
        part: Value,
    },

    // -- Assistant text --
    AssistantTextStart {
        stream_id: String,
    },
    AssistantDelta {
        stream_id: String,
        text: String,
    },
    AssistantTextEnd {
        stream_id: String,
    },

    // -- Reasoning --
    ReasoningStart {
        stream_id: String,
        mode: ReasoningMode,
    },
    ReasoningDelta {
        stream_id: String,
        mode: ReasoningMode,
        text: String,
    },
    ReasoningEnd {
        stream_id: String,
        mode: ReasoningMode,
    },

    // -- Tools --
    ToolInputStart {
        key: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Value>,
    },
    ToolInputDelta {
        key: String,
        delta: String,
    },
    ToolInputEnd {
        key: String,
        name: String,
    },
    ToolCall {
        key: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Value>,
    },
    ToolResult {
        key: String,
        name: String,
        result: Value,
    },
    ToolError {
        key: String,
        name: String,
        error: Value,
    },
    ToolOutputDenied {
        key: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    ToolApprovalRequest {
        approval_id: String,
        tool_call: Value,
    },

    // -- Escape hatches --
    Source {
        source: Value,
    },
    File {
        file: Value,
    },
    Raw {
        raw: Value,
    },
    Unknown {
        part_type: String,
        payload: Value,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_chunk_camel_case() {
        let chunk: RawChunk = serde_json::from_value(serde_json::json!({
            "turnId": "t1",
            "index": 3,
            "partType": "text-delta",
            "part": {"id": "s", "text": "hi"}
        }))
        .unwrap();
        assert_eq!(chunk.turn_id, "t1");
        assert_eq!(chunk.index, 3);
        assert_eq!(chunk.part_type, "text-delta");
        assert_eq!(chunk.part["text"], "hi");
    }

    #[test]
    fn test_raw_chunk_defaults() {
        let chunk: RawChunk =
            serde_json::from_value(serde_json::json!({"partType": "start"})).unwrap();
        assert_eq!(chunk.turn_id, "");
        assert_eq!(chunk.index, 0);
        assert!(chunk.part.is_null());
    }

    #[test]
    fn test_update_serialization_is_flat() {
        let update = StreamUpdate::new(
            "t1",
            UpdateKind::AssistantDelta {
                stream_id: "0".to_string(),
                text: "Hel".to_string(),
            },
        );
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["turn_id"], "t1");
        assert_eq!(json["type"], "assistant_delta");
        assert_eq!(json["text"], "Hel");
    }

    #[test]
    fn test_reasoning_mode_from_label() {
        assert_eq!(
            ReasoningMode::from_label(Some("summary")),
            ReasoningMode::Summary
        );
        assert_eq!(
            ReasoningMode::from_label(Some("Summary")),
            ReasoningMode::Reasoning
        );
        assert_eq!(ReasoningMode::from_label(None), ReasoningMode::Reasoning);
        assert_eq!(ReasoningMode::Summary.to_string(), "summary");
    }
}
