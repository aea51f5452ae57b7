//! Per-thread accumulation state.
//!
//! Scratch space the reducer uses to correlate successive updates with the
//! feed items they belong to. One instance per thread; never persisted.

use std::collections::{HashMap, HashSet, VecDeque};

/// Mutable in-progress bookkeeping for one thread.
///
/// Cleared wholesale on `turn_start`, on a `session_busy=false` boundary and
/// on session attach. A feed item id stored here is never reassigned to a
/// different entity until the next clear.
#[derive(Debug, Default, Clone)]
pub struct AccumulationState {
    /// turnId -> id of the streaming assistant message.
    pub assistant_item_id_by_turn: HashMap<String, String>,
    /// turnId -> cumulative assistant text.
    pub assistant_text_by_turn: HashMap<String, String>,

    /// `turnId:streamId` -> id of the streaming reasoning item.
    pub reasoning_item_id_by_stream: HashMap<String, String>,
    /// `turnId:streamId` -> cumulative reasoning text.
    pub reasoning_text_by_stream: HashMap<String, String>,
    /// Turns that produced at least one reasoning item.
    pub reasoning_turns: HashSet<String>,

    /// Tool key -> id of the tool item.
    pub tool_item_id_by_key: HashMap<String, String>,
    /// Tool key -> raw streamed argument text.
    pub tool_input_by_key: HashMap<String, String>,
    /// Tool keys whose terminal notification already fired.
    pub settled_tool_keys: HashSet<String>,

    /// Tool name -> ids of `tool>` log items awaiting their `tool<` line.
    pub pending_log_tools: HashMap<String, VecDeque<String>>,

    pub last_assistant_turn_id: Option<String>,
    pub last_reasoning_turn_id: Option<String>,
}

impl AccumulationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything. Used at turn and session boundaries.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.assistant_item_id_by_turn.is_empty()
            && self.assistant_text_by_turn.is_empty()
            && self.reasoning_item_id_by_stream.is_empty()
            && self.reasoning_text_by_stream.is_empty()
            && self.reasoning_turns.is_empty()
            && self.tool_item_id_by_key.is_empty()
            && self.tool_input_by_key.is_empty()
            && self.settled_tool_keys.is_empty()
            && self.pending_log_tools.is_empty()
            && self.last_assistant_turn_id.is_none()
            && self.last_reasoning_turn_id.is_none()
    }

    /// Cumulative streamed text of the most recently active assistant turn.
    pub fn last_assistant_text(&self) -> Option<&str> {
        let turn = self.last_assistant_turn_id.as_ref()?;
        self.assistant_text_by_turn.get(turn).map(String::as_str)
    }

    /// Whether the most recently active reasoning turn streamed any reasoning.
    pub fn last_reasoning_turn_streamed(&self) -> bool {
        self.last_reasoning_turn_id
            .as_ref()
            .is_some_and(|turn| self.reasoning_turns.contains(turn))
    }
}

/// Key for a reasoning stream within a turn.
pub fn reasoning_key(turn_id: &str, stream_id: &str) -> String {
    format!("{turn_id}:{stream_id}")
}
