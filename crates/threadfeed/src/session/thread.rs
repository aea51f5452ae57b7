//! Per-thread live context.

use log::{debug, warn};
use serde_json::{Value, json};

use threadfeed_protocol::wire::session_id;
use threadfeed_protocol::{TranscriptEntry, WireMessage};

use super::live::LiveFeed;
use super::{SessionError, SessionResult, Transport};
use crate::dispatch::Dispatcher;
use crate::replay::replay_into;
use crate::state::AccumulationState;

/// Everything a connected thread owns.
///
/// Created when the thread is opened and dropped on teardown. Nothing here is
/// shared with other threads.
#[derive(Debug)]
pub struct ThreadSession {
    thread_id: String,
    active_session_id: Option<String>,
    state: AccumulationState,
    dispatcher: Dispatcher,
    feed: LiveFeed,
    /// Traffic recorded since the last flush to the transcript store.
    pending: Vec<TranscriptEntry>,
}

impl ThreadSession {
    pub fn new(thread_id: impl Into<String>, dispatcher: Dispatcher, feed: LiveFeed) -> Self {
        Self {
            thread_id: thread_id.into(),
            active_session_id: None,
            state: AccumulationState::new(),
            dispatcher,
            feed,
            pending: Vec::new(),
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn session_id(&self) -> Option<&str> {
        self.active_session_id.as_deref()
    }

    pub fn state(&self) -> &AccumulationState {
        &self.state
    }

    pub fn feed(&self) -> &LiveFeed {
        &self.feed
    }

    pub fn feed_mut(&mut self) -> &mut LiveFeed {
        &mut self.feed
    }

    /// Rebuild the feed from stored traffic.
    ///
    /// Uses a throwaway accumulation state; the live state is reset
    /// afterwards so reconstruction of new traffic starts clean.
    pub fn restore(&mut self, entries: &[TranscriptEntry]) {
        replay_into(entries, &mut self.dispatcher, &mut self.feed);
        self.state.reset();
        debug!(
            "restored thread {} from {} transcript entries",
            self.thread_id,
            entries.len()
        );
    }

    /// Bind to a server session (connect, reconnect or resume).
    ///
    /// Always clears the accumulation state, even when re-attaching to the
    /// same session mid-turn.
    pub fn attach(&mut self, session_id: impl Into<String>) {
        let session_id = session_id.into();
        debug!("thread {} attached to session {session_id}", self.thread_id);
        self.active_session_id = Some(session_id);
        self.state.reset();
    }

    /// Apply one decoded message received from the server.
    ///
    /// Returns `false` when the message belongs to another session and was
    /// dropped.
    pub fn handle_server_message(&mut self, payload: &Value) -> bool {
        if let (Some(active), Some(incoming)) =
            (self.active_session_id.as_deref(), session_id(payload))
        {
            if active != incoming {
                warn!(
                    "thread {}: dropping message for session {incoming} (active {active})",
                    self.thread_id
                );
                return false;
            }
        }

        let ts = self.dispatcher.reducer().clock().now();
        self.pending.push(TranscriptEntry::server(
            ts,
            self.thread_id.clone(),
            payload.clone(),
        ));
        self.dispatcher
            .apply_payload(&mut self.state, payload, &mut self.feed);
        true
    }

    /// Send a user prompt.
    ///
    /// The message is shown immediately and recorded as client traffic; the
    /// server echo carrying the same client message id is skipped later. A
    /// rejected send is not recorded.
    pub fn send_user_message(
        &mut self,
        transport: &dyn Transport,
        text: &str,
        client_message_id: Option<String>,
    ) -> SessionResult<String> {
        let reducer = self.dispatcher.reducer();
        let client_message_id = client_message_id.unwrap_or_else(|| reducer.new_id());
        let ts = reducer.clock().now();

        let mut payload = json!({
            "type": "user_message",
            "text": text,
            "clientMessageId": client_message_id,
        });
        if let Some(session_id) = &self.active_session_id {
            payload["sessionId"] = Value::String(session_id.clone());
        }

        let message = WireMessage::UserMessage {
            text: text.to_string(),
            client_message_id: Some(client_message_id.clone()),
        };
        self.dispatcher
            .apply(&mut self.state, &message, &mut self.feed);

        if !transport.send(&payload) {
            return Err(SessionError::NotConnected(self.thread_id.clone()));
        }
        self.pending.push(TranscriptEntry::client(
            ts,
            self.thread_id.clone(),
            payload,
        ));
        Ok(client_message_id)
    }

    /// Entries recorded since the last call.
    pub fn take_pending(&mut self) -> Vec<TranscriptEntry> {
        std::mem::take(&mut self.pending)
    }

    /// Put back entries whose flush failed, ahead of anything newer.
    pub(crate) fn requeue(&mut self, mut entries: Vec<TranscriptEntry>) {
        entries.append(&mut self.pending);
        self.pending = entries;
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
