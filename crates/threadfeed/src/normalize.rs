//! Chunk normalizer.
//!
//! Maps a [`RawChunk`] onto the closed [`UpdateKind`] set. The raw `part` is
//! treated as an untyped bag here and nowhere else.
//!
//! ## Rules
//!
//! 1. Every recognised `partType` maps to its update kind. Snake-case
//!    spellings (`text_delta`) are accepted for kebab-case ones (`text-delta`).
//! 2. An unrecognised `partType`, or a recognised one whose present payload
//!    lacks a required field, becomes `Unknown { part_type, payload }`.
//! 3. A recognised `partType` with required fields whose payload is entirely
//!    absent (`null`) is dropped.

use log::debug;
use serde_json::Value;

use threadfeed_protocol::{RawChunk, ReasoningMode, StreamUpdate, UpdateKind};

/// Name used when a tool update does not carry `toolName`.
pub const DEFAULT_TOOL_NAME: &str = "tool";

/// Stream id used when a text or reasoning part does not carry `id`.
pub const DEFAULT_STREAM_ID: &str = "0";

enum Rejected {
    /// A required field is missing.
    Missing,
    /// The discriminator is not one we know.
    Unrecognized,
}

/// Normalize one raw chunk into a canonical stream update.
pub fn normalize(chunk: &RawChunk) -> Option<StreamUpdate> {
    match part_kind(chunk) {
        Ok(kind) => Some(StreamUpdate::new(chunk.turn_id.clone(), kind)),
        Err(Rejected::Missing) if chunk.part.is_null() => {
            debug!(
                "dropping {} chunk {} of turn {} without payload",
                chunk.part_type, chunk.index, chunk.turn_id
            );
            None
        }
        Err(_) => Some(StreamUpdate::new(
            chunk.turn_id.clone(),
            UpdateKind::Unknown {
                part_type: chunk.part_type.clone(),
                payload: chunk.part.clone(),
            },
        )),
    }
}

fn part_kind(chunk: &RawChunk) -> Result<UpdateKind, Rejected> {
    let part = &chunk.part;
    let kind = match canonical_part_type(&chunk.part_type).as_str() {
        "start" => UpdateKind::TurnStart,
        "finish" => UpdateKind::TurnFinish {
            finish_reason: string_field(part, &["finishReason"]),
            usage: value_field(part, &["totalUsage", "usage"]),
        },
        "abort" => UpdateKind::TurnAbort {
            reason: string_field(part, &["reason"]),
        },
        "error" => UpdateKind::TurnError {
            error: present_field(part, &["error"]).ok_or(Rejected::Missing)?,
        },
        "start-step" => UpdateKind::StepStart { part: part.clone() },
        "finish-step" => UpdateKind::StepFinish { part: part.clone() },

        "text-start" => UpdateKind::AssistantTextStart {
            stream_id: stream_id(part),
        },
        "text-delta" => UpdateKind::AssistantDelta {
            stream_id: stream_id(part),
            text: string_field(part, &["text", "delta", "textDelta"]).ok_or(Rejected::Missing)?,
        },
        "text-end" => UpdateKind::AssistantTextEnd {
            stream_id: stream_id(part),
        },

        "reasoning-start" => UpdateKind::ReasoningStart {
            stream_id: stream_id(part),
            mode: reasoning_mode(part),
        },
        "reasoning-delta" => UpdateKind::ReasoningDelta {
            stream_id: stream_id(part),
            mode: reasoning_mode(part),
            text: string_field(part, &["text", "delta"]).ok_or(Rejected::Missing)?,
        },
        "reasoning-end" => UpdateKind::ReasoningEnd {
            stream_id: stream_id(part),
            mode: reasoning_mode(part),
        },

        "tool-input-start" => UpdateKind::ToolInputStart {
            key: tool_key(chunk),
            name: tool_name(part),
            args: value_field(part, &["input", "args"]),
        },
        "tool-input-delta" => UpdateKind::ToolInputDelta {
            key: tool_key(chunk),
            delta: string_field(part, &["delta", "inputTextDelta"]).ok_or(Rejected::Missing)?,
        },
        "tool-input-end" => UpdateKind::ToolInputEnd {
            key: tool_key(chunk),
            name: tool_name(part),
        },
        "tool-call" => UpdateKind::ToolCall {
            key: tool_key(chunk),
            name: tool_name(part),
            args: value_field(part, &["input", "args"]),
        },
        "tool-result" => UpdateKind::ToolResult {
            key: tool_key(chunk),
            name: tool_name(part),
            result: present_field(part, &["output", "result"]).ok_or(Rejected::Missing)?,
        },
        "tool-error" => UpdateKind::ToolError {
            key: tool_key(chunk),
            name: tool_name(part),
            error: present_field(part, &["error"]).ok_or(Rejected::Missing)?,
        },
        "tool-output-denied" => UpdateKind::ToolOutputDenied {
            key: tool_key(chunk),
            name: tool_name(part),
            reason: string_field(part, &["reason"]),
        },
        "tool-approval-request" => UpdateKind::ToolApprovalRequest {
            approval_id: string_field(part, &["approvalId"]).unwrap_or_default(),
            tool_call: present_field(part, &["toolCall"]).ok_or(Rejected::Missing)?,
        },

        "source" => {
            if part.is_null() {
                return Err(Rejected::Missing);
            }
            UpdateKind::Source {
                source: part.clone(),
            }
        }
        "file" => UpdateKind::File {
            file: present_field(part, &["file"]).ok_or(Rejected::Missing)?,
        },
        "raw" => UpdateKind::Raw {
            raw: present_field(part, &["rawValue", "raw"]).ok_or(Rejected::Missing)?,
        },

        _ => return Err(Rejected::Unrecognized),
    };
    Ok(kind)
}

fn canonical_part_type(part_type: &str) -> String {
    part_type.trim().replace('_', "-")
}

/// Resolve the correlation key for a tool update.
///
/// First present of `toolCallId`, `id`, `toolName`; else `"{turnId}:{index}"`.
pub fn tool_key(chunk: &RawChunk) -> String {
    id_field(&chunk.part, &["toolCallId", "id", "toolName"])
        .unwrap_or_else(|| format!("{}:{}", chunk.turn_id, chunk.index))
}

/// `toolName` if present, else `"tool"`.
pub fn tool_name(part: &Value) -> String {
    string_field(part, &["toolName"]).unwrap_or_else(|| DEFAULT_TOOL_NAME.to_string())
}

fn stream_id(part: &Value) -> String {
    id_field(part, &["id"]).unwrap_or_else(|| DEFAULT_STREAM_ID.to_string())
}

fn reasoning_mode(part: &Value) -> ReasoningMode {
    let label = string_field(part, &["mode", "kind"]);
    ReasoningMode::from_label(label.as_deref())
}

/// First field holding a string.
fn string_field(part: &Value, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| part.get(*name).and_then(Value::as_str))
        .map(str::to_string)
}

/// First field holding a non-empty string or a number, as a string.
fn id_field(part: &Value, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match part.get(*name)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First field holding a non-null value.
fn value_field(part: &Value, names: &[&str]) -> Option<Value> {
    names
        .iter()
        .find_map(|name| part.get(*name).filter(|v| !v.is_null()))
        .cloned()
}

/// First field that is present at all, `null` included.
fn present_field(part: &Value, names: &[&str]) -> Option<Value> {
    names.iter().find_map(|name| part.get(*name)).cloned()
}
