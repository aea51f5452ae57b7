//! Legacy event reconciliation.
//!
//! Older server paths deliver whole-message events (`assistant_message`,
//! `reasoning`) next to, or instead of, the granular stream, and the
//! pre-streaming protocol encoded tool calls as `tool> name {json}` /
//! `tool< name {json}` debug lines. The functions here fold those shapes into
//! the same feed without double-rendering content the reducer already built.

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use threadfeed_protocol::{FeedBody, ReasoningMode, Role, ToolStatus};

use crate::reducer::Reducer;
use crate::sink::FeedSink;
use crate::state::AccumulationState;

static TOOL_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^tool([<>])\s+([^\s{\[]+)\s*(.*)$").expect("valid tool line regex")
});

/// Substrings marking provider-internal streaming echoes.
const NOISE_MARKERS: &[&str] = &[
    "response.function_call_arguments.",
    "response.reasoning",
    "obfuscation",
];

/// Which half of a legacy tool pair a log line encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolLineDirection {
    /// `tool>`: the call started.
    Start,
    /// `tool<`: the call finished.
    Finish,
}

/// A parsed `tool>` / `tool<` debug line.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolLine {
    pub direction: ToolLineDirection,
    pub name: String,
    /// Trailing payload; JSON when it parses, the raw text otherwise.
    pub payload: Option<Value>,
}

impl ToolLine {
    pub fn parse(line: &str) -> Option<Self> {
        let caps = TOOL_LINE.captures(line.trim())?;
        let direction = match &caps[1] {
            ">" => ToolLineDirection::Start,
            _ => ToolLineDirection::Finish,
        };
        let rest = caps[3].trim();
        let payload = (!rest.is_empty()).then(|| {
            serde_json::from_str(rest).unwrap_or_else(|_| Value::String(rest.to_string()))
        });
        Some(Self {
            direction,
            name: caps[2].to_string(),
            payload,
        })
    }

    /// Whether a finish payload reports a failure.
    pub fn is_error(&self) -> bool {
        let Some(Value::Object(map)) = &self.payload else {
            return false;
        };
        map.get("error").is_some_and(|e| !e.is_null())
            || map.get("isError").and_then(Value::as_bool) == Some(true)
            || map.get("ok").and_then(Value::as_bool) == Some(false)
    }
}

/// Provider-internal debug lines that are never shown.
pub fn is_noise(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("raw stream part:") || NOISE_MARKERS.iter().any(|m| line.contains(m))
}

fn same_text(a: &str, b: &str) -> bool {
    a.trim() == b.trim()
}

/// Apply a legacy `assistant_message`.
///
/// Dropped when it repeats the streamed text of the last assistant turn.
pub fn apply_assistant_message(
    reducer: &Reducer,
    state: &AccumulationState,
    text: &str,
    sink: &mut dyn FeedSink,
) {
    if state
        .last_assistant_text()
        .is_some_and(|streamed| same_text(streamed, text))
    {
        debug!("dropping assistant_message echo of streamed turn");
        return;
    }
    sink.append(reducer.new_item(FeedBody::Message {
        role: Role::Assistant,
        text: text.to_string(),
    }));
}

/// Apply a legacy `reasoning` block.
///
/// Dropped when the last reasoning turn already streamed reasoning.
pub fn apply_reasoning(
    reducer: &Reducer,
    state: &AccumulationState,
    kind: Option<&str>,
    text: &str,
    sink: &mut dyn FeedSink,
) {
    if state.last_reasoning_turn_streamed() {
        debug!("dropping reasoning echo of streamed turn");
        return;
    }
    sink.append(reducer.new_item(FeedBody::Reasoning {
        mode: ReasoningMode::from_label(kind),
        text: text.to_string(),
    }));
}

/// Apply a free-text `log` line.
///
/// Noise is suppressed, tool lines become tool items paired FIFO per tool
/// name, everything else becomes a `log` item.
pub fn apply_log_line(
    reducer: &Reducer,
    state: &mut AccumulationState,
    line: &str,
    sink: &mut dyn FeedSink,
) {
    if is_noise(line) {
        return;
    }
    let Some(tool) = ToolLine::parse(line) else {
        sink.append(reducer.new_item(FeedBody::Log {
            line: line.to_string(),
        }));
        return;
    };

    match tool.direction {
        ToolLineDirection::Start => {
            let item = reducer.new_item(FeedBody::Tool {
                status: ToolStatus::Running,
                name: tool.name.clone(),
                args: tool.payload,
                result: None,
            });
            state
                .pending_log_tools
                .entry(tool.name)
                .or_default()
                .push_back(item.id.clone());
            sink.append(item);
        }
        ToolLineDirection::Finish => {
            let status = if tool.is_error() {
                ToolStatus::Error
            } else {
                ToolStatus::Done
            };
            let pending = state
                .pending_log_tools
                .get_mut(&tool.name)
                .and_then(|queue| queue.pop_front());
            if state
                .pending_log_tools
                .get(&tool.name)
                .is_some_and(|queue| queue.is_empty())
            {
                state.pending_log_tools.remove(&tool.name);
            }

            match pending {
                Some(id) => sink.update(&id, &mut |item| {
                    if let FeedBody::Tool {
                        status: s, result, ..
                    } = &mut item.body
                    {
                        *s = status;
                        result.clone_from(&tool.payload);
                    }
                }),
                None => sink.append(reducer.new_item(FeedBody::Tool {
                    status,
                    name: tool.name,
                    args: None,
                    result: tool.payload,
                })),
            }
        }
    }
}
