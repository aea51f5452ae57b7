//! Stream reducer.
//!
//! Applies one canonical [`StreamUpdate`] at a time against an
//! [`AccumulationState`] and a [`FeedSink`]. The same reducer drives live
//! threads and transcript replay.
//!
//! ## Design Rules
//!
//! 1. `turn_start` clears the accumulation state and emits nothing, so a tool
//!    key reused by a later turn never reaches an item from an earlier one.
//! 2. Step boundaries and text start/end markers are silent.
//! 3. Deltas append to the cumulative text of their turn (assistant) or
//!    `turn:stream` (reasoning) and rewrite the existing item in place; a new
//!    item id is allocated only when no mapping exists yet.
//! 4. Tool updates create or mutate one item per tool key. Terminal updates
//!    settle the item and notify the tool-settled hook once per key.
//! 5. Informational kinds produce at most one `system` item. `raw` produces
//!    nothing here.
//!
//! The reducer performs no I/O and never fails on data shape.

use std::sync::Arc;

use log::debug;
use serde_json::{Value, json};

use threadfeed_protocol::{
    FeedBody, FeedItem, ReasoningMode, Role, StreamUpdate, ToolStatus, UpdateKind,
};

use crate::args::{merge_args, structure_args};
use crate::ids::{Clock, IdSource};
use crate::normalize::DEFAULT_TOOL_NAME;
use crate::sink::FeedSink;
use crate::state::{AccumulationState, reasoning_key};

/// Default number of characters shown for unknown payload previews.
pub const DEFAULT_PREVIEW_CHARS: usize = 200;

/// A tool item reached a terminal status.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSettled {
    /// Correlation key of the tool call.
    pub key: String,
    /// Tool name as last reported.
    pub name: String,
    /// Feed item holding the tool.
    pub item_id: String,
    /// Terminal status the item reached.
    pub status: ToolStatus,
}

/// Callback fired once per tool key reaching a terminal status.
pub type ToolSettledHook = Arc<dyn Fn(&ToolSettled) + Send + Sync>;

/// The feed state machine.
#[derive(Clone)]
pub struct Reducer {
    ids: Arc<dyn IdSource>,
    clock: Arc<dyn Clock>,
    on_tool_settled: Option<ToolSettledHook>,
    preview_chars: usize,
}

impl std::fmt::Debug for Reducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reducer")
            .field("has_tool_settled_hook", &self.on_tool_settled.is_some())
            .field("preview_chars", &self.preview_chars)
            .finish()
    }
}

impl Reducer {
    pub fn new(ids: Arc<dyn IdSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ids,
            clock,
            on_tool_settled: None,
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }

    /// Register the tool-settled notification.
    pub fn with_tool_settled_hook(mut self, hook: ToolSettledHook) -> Self {
        self.on_tool_settled = Some(hook);
        self
    }

    /// Limit the length of unknown payload previews.
    pub fn with_preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = chars;
        self
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn new_id(&self) -> String {
        self.ids.new_id()
    }

    /// Allocate a new feed item with a fresh id and timestamp.
    pub fn new_item(&self, body: FeedBody) -> FeedItem {
        FeedItem::new(self.ids.new_id(), self.clock.now(), body)
    }

    /// Append a `system` line.
    pub fn push_system(&self, sink: &mut dyn FeedSink, line: impl Into<String>) {
        sink.append(self.new_item(FeedBody::System { line: line.into() }));
    }

    /// Apply one update.
    pub fn reduce(
        &self,
        state: &mut AccumulationState,
        update: &StreamUpdate,
        sink: &mut dyn FeedSink,
    ) {
        let turn_id = update.turn_id.as_str();
        match &update.kind {
            UpdateKind::TurnStart => {
                debug!("turn {turn_id} started, clearing accumulation state");
                state.reset();
            }

            UpdateKind::TurnFinish { .. }
            | UpdateKind::StepStart { .. }
            | UpdateKind::StepFinish { .. }
            | UpdateKind::AssistantTextStart { .. }
            | UpdateKind::AssistantTextEnd { .. } => {}

            UpdateKind::AssistantDelta { text, .. } => {
                self.on_assistant_delta(state, turn_id, text, sink);
            }
            UpdateKind::ReasoningDelta {
                stream_id,
                mode,
                text,
            } => self.on_reasoning_delta(state, turn_id, stream_id, *mode, text, sink),

            UpdateKind::ToolInputStart { key, name, args } => {
                let patch = ToolPatch {
                    name: Some(name.clone()),
                    status: Some(ToolStatus::Running),
                    args: args.clone().map_or(ArgsPatch::Keep, ArgsPatch::Merge),
                    result: None,
                };
                self.upsert_tool(state, key, patch, sink);
            }
            UpdateKind::ToolInputDelta { key, delta } => {
                let buffer = state.tool_input_by_key.entry(key.clone()).or_default();
                buffer.push_str(delta);
                let patch = ToolPatch {
                    args: ArgsPatch::Structure(buffer.clone()),
                    ..ToolPatch::default()
                };
                self.upsert_tool(state, key, patch, sink);
            }
            UpdateKind::ToolInputEnd { key, name } => {
                let args = match state.tool_input_by_key.get(key) {
                    Some(buffer) => ArgsPatch::Structure(buffer.clone()),
                    None if state.tool_item_id_by_key.contains_key(key) => ArgsPatch::Keep,
                    None => return,
                };
                let patch = ToolPatch {
                    name: Some(name.clone()),
                    args,
                    ..ToolPatch::default()
                };
                self.upsert_tool(state, key, patch, sink);
            }
            UpdateKind::ToolCall { key, name, args } => {
                let patch = ToolPatch {
                    name: Some(name.clone()),
                    status: Some(ToolStatus::Running),
                    args: args.clone().map_or(ArgsPatch::Keep, ArgsPatch::Replace),
                    result: None,
                };
                self.upsert_tool(state, key, patch, sink);
            }
            UpdateKind::ToolResult { key, name, result } => {
                self.settle_tool(state, key, name, ToolStatus::Done, result.clone(), sink);
            }
            UpdateKind::ToolError { key, name, error } => {
                let result = json!({ "error": error });
                self.settle_tool(state, key, name, ToolStatus::Done, result, sink);
            }
            UpdateKind::ToolOutputDenied { key, name, reason } => {
                let result = json!({ "denied": true, "reason": reason });
                self.settle_tool(state, key, name, ToolStatus::Done, result, sink);
            }

            UpdateKind::TurnAbort { reason } => {
                let line = match reason.as_deref().filter(|r| !r.is_empty()) {
                    Some(reason) => format!("Turn aborted: {reason}"),
                    None => "Turn aborted".to_string(),
                };
                self.push_system(sink, line);
            }
            UpdateKind::TurnError { error } => {
                self.push_system(sink, format!("Turn error: {}", describe(error)));
            }
            UpdateKind::ReasoningStart { .. } | UpdateKind::ReasoningEnd { .. } => {}
            UpdateKind::ToolApprovalRequest { tool_call, .. } => {
                let name = tool_call
                    .get("toolName")
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_TOOL_NAME);
                self.push_system(sink, format!("Tool approval requested: {name}"));
            }
            UpdateKind::Source { source } => {
                let label = first_str(source, &["url", "title", "id"])
                    .map(str::to_string)
                    .unwrap_or_else(|| self.preview(source));
                self.push_system(sink, format!("Source: {label}"));
            }
            UpdateKind::File { file } => {
                let label = first_str(file, &["name", "filename", "mediaType"])
                    .map(str::to_string)
                    .unwrap_or_else(|| self.preview(file));
                self.push_system(sink, format!("File: {label}"));
            }
            UpdateKind::Raw { .. } => {}
            UpdateKind::Unknown { part_type, payload } => {
                debug!("unhandled stream part {part_type} in turn {turn_id}");
                self.push_system(
                    sink,
                    format!(
                        "Unhandled stream part ({part_type}): {}",
                        self.preview(payload)
                    ),
                );
            }
        }
    }

    fn on_assistant_delta(
        &self,
        state: &mut AccumulationState,
        turn_id: &str,
        delta: &str,
        sink: &mut dyn FeedSink,
    ) {
        let accumulated = state
            .assistant_text_by_turn
            .entry(turn_id.to_string())
            .or_default();
        accumulated.push_str(delta);
        let full = accumulated.clone();
        state.last_assistant_turn_id = Some(turn_id.to_string());

        match state.assistant_item_id_by_turn.get(turn_id) {
            Some(id) => sink.update(id, &mut |item| set_text(item, &full)),
            None => {
                let item = self.new_item(FeedBody::Message {
                    role: Role::Assistant,
                    text: delta.to_string(),
                });
                state
                    .assistant_item_id_by_turn
                    .insert(turn_id.to_string(), item.id.clone());
                sink.append(item);
            }
        }
    }

    fn on_reasoning_delta(
        &self,
        state: &mut AccumulationState,
        turn_id: &str,
        stream_id: &str,
        mode: ReasoningMode,
        delta: &str,
        sink: &mut dyn FeedSink,
    ) {
        let key = reasoning_key(turn_id, stream_id);
        let accumulated = state
            .reasoning_text_by_stream
            .entry(key.clone())
            .or_default();
        accumulated.push_str(delta);
        let full = accumulated.clone();
        state.reasoning_turns.insert(turn_id.to_string());
        state.last_reasoning_turn_id = Some(turn_id.to_string());

        match state.reasoning_item_id_by_stream.get(&key) {
            Some(id) => sink.update(id, &mut |item| set_text(item, &full)),
            None => {
                let item = self.new_item(FeedBody::Reasoning {
                    mode,
                    text: delta.to_string(),
                });
                state
                    .reasoning_item_id_by_stream
                    .insert(key, item.id.clone());
                sink.append(item);
            }
        }
    }

    fn upsert_tool(
        &self,
        state: &mut AccumulationState,
        key: &str,
        patch: ToolPatch,
        sink: &mut dyn FeedSink,
    ) -> String {
        if let Some(id) = state.tool_item_id_by_key.get(key) {
            sink.update(id, &mut |item| patch.apply(&mut item.body));
            return id.clone();
        }

        let item = self.new_item(patch.into_body());
        let id = item.id.clone();
        state
            .tool_item_id_by_key
            .insert(key.to_string(), id.clone());
        sink.append(item);
        id
    }

    fn settle_tool(
        &self,
        state: &mut AccumulationState,
        key: &str,
        name: &str,
        status: ToolStatus,
        result: Value,
        sink: &mut dyn FeedSink,
    ) {
        let patch = ToolPatch {
            name: Some(name.to_string()),
            status: Some(status),
            args: ArgsPatch::Keep,
            result: Some(result),
        };
        let item_id = self.upsert_tool(state, key, patch, sink);

        // Only the first terminal update of a key notifies.
        if !status.is_terminal() || !state.settled_tool_keys.insert(key.to_string()) {
            return;
        }
        if let Some(hook) = &self.on_tool_settled {
            hook(&ToolSettled {
                key: key.to_string(),
                name: name.to_string(),
                item_id,
                status,
            });
        }
    }

    fn preview(&self, value: &Value) -> String {
        truncate_chars(&compact(value), self.preview_chars)
    }
}

// ============================================================================
// Tool patches
// ============================================================================

#[derive(Debug, Default)]
enum ArgsPatch {
    #[default]
    Keep,
    /// Merge over existing object args.
    Merge(Value),
    /// Replace existing args.
    Replace(Value),
    /// Re-derive from the full raw buffer, using existing args as fallback.
    Structure(String),
}

#[derive(Debug, Default)]
struct ToolPatch {
    name: Option<String>,
    status: Option<ToolStatus>,
    args: ArgsPatch,
    result: Option<Value>,
}

impl ToolPatch {
    fn apply(&self, body: &mut FeedBody) {
        let FeedBody::Tool {
            status,
            name,
            args,
            result,
        } = body
        else {
            return;
        };

        // The placeholder name never overwrites a real one.
        if let Some(new_name) = self.name.as_ref().filter(|n| n.as_str() != DEFAULT_TOOL_NAME) {
            name.clone_from(new_name);
        }
        if let Some(new_status) = self.status {
            *status = new_status;
        }
        match &self.args {
            ArgsPatch::Keep => {}
            ArgsPatch::Merge(incoming) => *args = Some(merge_args(args.take(), incoming.clone())),
            ArgsPatch::Replace(incoming) => *args = Some(incoming.clone()),
            ArgsPatch::Structure(raw) => *args = Some(structure_args(raw, args.as_ref())),
        }
        if let Some(new_result) = &self.result {
            *result = Some(new_result.clone());
        }
    }

    fn into_body(self) -> FeedBody {
        let args = match self.args {
            ArgsPatch::Keep => None,
            ArgsPatch::Merge(v) | ArgsPatch::Replace(v) => Some(v),
            ArgsPatch::Structure(raw) => Some(structure_args(&raw, None)),
        };
        FeedBody::Tool {
            status: self.status.unwrap_or(ToolStatus::Running),
            name: self.name.unwrap_or_else(|| DEFAULT_TOOL_NAME.to_string()),
            args,
            result: self.result,
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn set_text(item: &mut FeedItem, full: &str) {
    match &mut item.body {
        FeedBody::Message { text, .. } | FeedBody::Reasoning { text, .. } => {
            text.clear();
            text.push_str(full);
        }
        _ => {}
    }
}

fn first_str<'a>(value: &'a Value, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|name| value.get(*name).and_then(Value::as_str))
}

/// Human-readable rendering of an error value.
pub(crate) fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => compact(value),
        },
        other => compact(other),
    }
}

fn compact(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{FixedClock, SequentialIds};
    use crate::sink::VecSink;
    use std::sync::Mutex;

    fn reducer() -> Reducer {
        Reducer::new(
            Arc::new(SequentialIds::new("item")),
            Arc::new(FixedClock::default()),
        )
    }

    fn up(turn: &str, kind: UpdateKind) -> StreamUpdate {
        StreamUpdate::new(turn, kind)
    }

    fn delta(turn: &str, text: &str) -> StreamUpdate {
        up(
            turn,
            UpdateKind::AssistantDelta {
                stream_id: "0".to_string(),
                text: text.to_string(),
            },
        )
    }

    fn run(r: &Reducer, updates: &[StreamUpdate]) -> (AccumulationState, VecSink) {
        let mut state = AccumulationState::new();
        let mut sink = VecSink::new();
        for update in updates {
            r.reduce(&mut state, update, &mut sink);
        }
        (state, sink)
    }

    fn tool_parts(item: &FeedItem) -> (ToolStatus, &str, Option<&Value>, Option<&Value>) {
        match &item.body {
            FeedBody::Tool {
                status,
                name,
                args,
                result,
            } => (*status, name, args.as_ref(), result.as_ref()),
            other => panic!("expected tool item, got {other:?}"),
        }
    }

    #[test]
    fn test_assistant_deltas_concatenate() {
        let r = reducer();
        let (state, sink) = run(
            &r,
            &[
                up("t1", UpdateKind::TurnStart),
                delta("t1", "Hel"),
                delta("t1", "lo"),
                up(
                    "t1",
                    UpdateKind::TurnFinish {
                        finish_reason: Some("stop".to_string()),
                        usage: None,
                    },
                ),
            ],
        );

        assert_eq!(sink.len(), 1);
        let item = &sink.items()[0];
        assert_eq!(item.id, "item-1");
        assert_eq!(
            item.body,
            FeedBody::Message {
                role: Role::Assistant,
                text: "Hello".to_string()
            }
        );
        assert_eq!(state.last_assistant_turn_id.as_deref(), Some("t1"));
        assert_eq!(state.last_assistant_text(), Some("Hello"));
    }

    #[test]
    fn test_turn_start_resets_state() {
        let r = reducer();
        let (state, sink) = run(
            &r,
            &[delta("t1", "a"), up("t2", UpdateKind::TurnStart)],
        );
        assert_eq!(sink.len(), 1);
        assert!(state.is_empty());
    }

    #[test]
    fn test_reasoning_streams_are_separate() {
        let r = reducer();
        let reasoning = |stream: &str, text: &str| {
            up(
                "t1",
                UpdateKind::ReasoningDelta {
                    stream_id: stream.to_string(),
                    mode: ReasoningMode::Reasoning,
                    text: text.to_string(),
                },
            )
        };
        let (state, sink) = run(
            &r,
            &[
                reasoning("a", "think"),
                reasoning("b", "other"),
                reasoning("a", "ing"),
            ],
        );

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.items()[0].text(), Some("thinking"));
        assert_eq!(sink.items()[1].text(), Some("other"));
        assert!(state.reasoning_turns.contains("t1"));
        assert_eq!(state.last_reasoning_turn_id.as_deref(), Some("t1"));
    }

    #[test]
    fn test_streamed_tool_args() {
        let r = reducer();
        let (_, sink) = run(
            &r,
            &[
                up(
                    "t1",
                    UpdateKind::ToolInputStart {
                        key: "k".to_string(),
                        name: "bash".to_string(),
                        args: None,
                    },
                ),
                up(
                    "t1",
                    UpdateKind::ToolInputDelta {
                        key: "k".to_string(),
                        delta: r#"{"cmd":"#.to_string(),
                    },
                ),
                up(
                    "t1",
                    UpdateKind::ToolInputDelta {
                        key: "k".to_string(),
                        delta: r#""ls"}"#.to_string(),
                    },
                ),
                up(
                    "t1",
                    UpdateKind::ToolResult {
                        key: "k".to_string(),
                        name: "bash".to_string(),
                        result: json!({"stdout": "a b"}),
                    },
                ),
            ],
        );

        assert_eq!(sink.len(), 1);
        let (status, name, args, result) = tool_parts(&sink.items()[0]);
        assert_eq!(status, ToolStatus::Done);
        assert_eq!(name, "bash");
        assert_eq!(args, Some(&json!({"cmd": "ls"})));
        assert_eq!(result, Some(&json!({"stdout": "a b"})));
    }

    #[test]
    fn test_partial_args_show_raw_input() {
        let r = reducer();
        let (_, sink) = run(
            &r,
            &[up(
                "t1",
                UpdateKind::ToolInputDelta {
                    key: "k".to_string(),
                    delta: r#"{"cmd":"#.to_string(),
                },
            )],
        );
        let (status, name, args, _) = tool_parts(&sink.items()[0]);
        assert_eq!(status, ToolStatus::Running);
        assert_eq!(name, DEFAULT_TOOL_NAME);
        assert_eq!(args, Some(&json!({"input": "{\"cmd\":"})));
    }

    #[test]
    fn test_tool_input_end_without_anything_is_silent() {
        let r = reducer();
        let (state, sink) = run(
            &r,
            &[up(
                "t1",
                UpdateKind::ToolInputEnd {
                    key: "k".to_string(),
                    name: "bash".to_string(),
                },
            )],
        );
        assert!(sink.is_empty());
        assert!(state.tool_item_id_by_key.is_empty());
    }

    #[test]
    fn test_placeholder_name_keeps_real_name() {
        let r = reducer();
        let (_, sink) = run(
            &r,
            &[
                up(
                    "t1",
                    UpdateKind::ToolCall {
                        key: "k".to_string(),
                        name: "read".to_string(),
                        args: Some(json!({"path": "a"})),
                    },
                ),
                up(
                    "t1",
                    UpdateKind::ToolResult {
                        key: "k".to_string(),
                        name: DEFAULT_TOOL_NAME.to_string(),
                        result: json!("ok"),
                    },
                ),
            ],
        );
        let (status, name, args, result) = tool_parts(&sink.items()[0]);
        assert_eq!(status, ToolStatus::Done);
        assert_eq!(name, "read");
        assert_eq!(args, Some(&json!({"path": "a"})));
        assert_eq!(result, Some(&json!("ok")));
    }

    #[test]
    fn test_tool_error_and_denied_results() {
        let r = reducer();
        let (_, sink) = run(
            &r,
            &[
                up(
                    "t1",
                    UpdateKind::ToolError {
                        key: "a".to_string(),
                        name: "bash".to_string(),
                        error: json!("exit 1"),
                    },
                ),
                up(
                    "t1",
                    UpdateKind::ToolOutputDenied {
                        key: "b".to_string(),
                        name: "write".to_string(),
                        reason: Some("user said no".to_string()),
                    },
                ),
            ],
        );
        assert_eq!(sink.len(), 2);
        let (status, _, _, result) = tool_parts(&sink.items()[0]);
        assert_eq!(status, ToolStatus::Done);
        assert_eq!(result, Some(&json!({"error": "exit 1"})));
        let (_, _, _, result) = tool_parts(&sink.items()[1]);
        assert_eq!(
            result,
            Some(&json!({"denied": true, "reason": "user said no"}))
        );
    }

    #[test]
    fn test_tool_settled_hook_fires_once_per_key() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hook_seen = Arc::clone(&seen);
        let r = reducer().with_tool_settled_hook(Arc::new(move |settled: &ToolSettled| {
            hook_seen.lock().unwrap().push(settled.clone());
        }));
        let result = |key: &str| {
            up(
                "t1",
                UpdateKind::ToolResult {
                    key: key.to_string(),
                    name: "bash".to_string(),
                    result: json!({}),
                },
            )
        };
        run(&r, &[result("k"), result("k"), result("j")]);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].key, "k");
        assert_eq!(seen[0].item_id, "item-1");
        assert_eq!(seen[0].status, ToolStatus::Done);
        assert!(seen.iter().all(|settled| settled.status.is_terminal()));
        assert_eq!(seen[1].key, "j");
    }

    #[test]
    fn test_informational_lines() {
        let r = reducer();
        let (_, sink) = run(
            &r,
            &[
                up(
                    "t1",
                    UpdateKind::TurnAbort {
                        reason: Some("user".to_string()),
                    },
                ),
                up(
                    "t1",
                    UpdateKind::TurnError {
                        error: json!({"message": "overloaded"}),
                    },
                ),
                up(
                    "t1",
                    UpdateKind::ToolApprovalRequest {
                        approval_id: "a1".to_string(),
                        tool_call: json!({"toolName": "bash"}),
                    },
                ),
                up(
                    "t1",
                    UpdateKind::Raw {
                        raw: json!("ignored"),
                    },
                ),
                up(
                    "t1",
                    UpdateKind::ReasoningStart {
                        stream_id: "r".to_string(),
                        mode: ReasoningMode::Reasoning,
                    },
                ),
            ],
        );
        let lines: Vec<_> = sink.items().iter().filter_map(FeedItem::line).collect();
        assert_eq!(
            lines,
            vec![
                "Turn aborted: user",
                "Turn error: overloaded",
                "Tool approval requested: bash",
            ]
        );
    }

    #[test]
    fn test_unknown_preview_is_truncated() {
        let r = reducer().with_preview_chars(5);
        let (_, sink) = run(
            &r,
            &[up(
                "t1",
                UpdateKind::Unknown {
                    part_type: "future".to_string(),
                    payload: json!("abcdefghij"),
                },
            )],
        );
        assert_eq!(
            sink.items()[0].line(),
            Some("Unhandled stream part (future): abcde…")
        );
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(&json!("plain")), "plain");
        assert_eq!(describe(&json!({"message": "m"})), "m");
        assert_eq!(describe(&json!({"code": 1})), "{\"code\":1}");
    }
}
