//! Wire message dispatch.
//!
//! [`Dispatcher`] is the one place a decoded wire message is turned into feed
//! mutations. Live sessions and transcript replay both go through it, so the
//! two paths cannot drift apart.

use std::collections::HashSet;

use log::debug;
use serde_json::Value;

use threadfeed_protocol::{FeedBody, Role, UpdateKind, WireMessage};

use crate::legacy;
use crate::normalize::normalize;
use crate::reducer::Reducer;
use crate::sink::FeedSink;
use crate::state::AccumulationState;

/// Applies wire messages for one thread.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    reducer: Reducer,
    /// Client message ids already rendered as user messages.
    seen_client_message_ids: HashSet<String>,
}

impl Dispatcher {
    pub fn new(reducer: Reducer) -> Self {
        Self {
            reducer,
            seen_client_message_ids: HashSet::new(),
        }
    }

    pub fn reducer(&self) -> &Reducer {
        &self.reducer
    }

    /// Decode and apply an untyped payload.
    pub fn apply_payload(
        &mut self,
        state: &mut AccumulationState,
        payload: &Value,
        sink: &mut dyn FeedSink,
    ) {
        self.apply(state, &WireMessage::decode(payload), sink);
    }

    /// Apply one decoded message.
    pub fn apply(
        &mut self,
        state: &mut AccumulationState,
        message: &WireMessage,
        sink: &mut dyn FeedSink,
    ) {
        let reducer = &self.reducer;
        match message {
            WireMessage::ModelStreamChunk(chunk) => {
                let Some(update) = normalize(chunk) else {
                    return;
                };
                if let UpdateKind::Raw { raw } = &update.kind {
                    if let Some(line) = raw_log_line(raw) {
                        legacy::apply_log_line(reducer, state, line, sink);
                    }
                }
                reducer.reduce(state, &update, sink);
            }
            WireMessage::UserMessage {
                text,
                client_message_id,
            } => {
                if let Some(id) = client_message_id {
                    if !self.seen_client_message_ids.insert(id.clone()) {
                        debug!("skipping duplicate user message {id}");
                        return;
                    }
                }
                sink.append(reducer.new_item(FeedBody::Message {
                    role: Role::User,
                    text: text.clone(),
                }));
            }
            WireMessage::AssistantMessage { text } => {
                legacy::apply_assistant_message(reducer, state, text, sink);
            }
            WireMessage::Reasoning { kind, text } => {
                legacy::apply_reasoning(reducer, state, kind.as_deref(), text, sink);
            }
            WireMessage::Todos { items } => {
                sink.append(reducer.new_item(FeedBody::Todos {
                    items: items.clone(),
                }));
            }
            WireMessage::Log { line } => legacy::apply_log_line(reducer, state, line, sink),
            WireMessage::Error {
                message,
                code,
                source,
            } => {
                sink.append(reducer.new_item(FeedBody::Error {
                    message: message.clone(),
                    code: code.clone(),
                    source: source.clone(),
                }));
            }
            WireMessage::SessionBusy { busy } => {
                if !busy {
                    state.reset();
                }
            }
            WireMessage::Other { .. } => {
                let message_type = message.message_type();
                debug!("no handler for {message_type} message");
                reducer.push_system(sink, format!("[{message_type}]"));
            }
        }
    }
}

/// Raw chunk values that carry a legacy debug line.
fn raw_log_line(raw: &Value) -> Option<&str> {
    match raw {
        Value::String(line) => Some(line),
        Value::Object(map) => map.get("line").and_then(Value::as_str),
        _ => None,
    }
}
