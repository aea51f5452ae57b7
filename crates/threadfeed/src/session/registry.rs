//! Registry of open threads.

use std::collections::HashMap;
use std::sync::Arc;

use log::{info, warn};
use tracing::instrument;

use threadfeed_protocol::TranscriptEntry;

use super::SessionResult;
use super::live::{DEFAULT_MAX_ITEMS, LiveFeed};
use super::thread::ThreadSession;
use crate::dispatch::Dispatcher;
use crate::ids::{Clock, IdSource, SystemClock, UuidIds};
use crate::reducer::{DEFAULT_PREVIEW_CHARS, Reducer, ToolSettledHook};
use crate::transcript::TranscriptStore;

/// How new sessions are built.
#[derive(Clone)]
pub struct RegistryOptions {
    pub ids: Arc<dyn IdSource>,
    pub clock: Arc<dyn Clock>,
    /// Live feed bound; 0 disables trimming.
    pub max_items: usize,
    /// Characters shown for unknown stream parts.
    pub preview_chars: usize,
    /// Shared by every session's reducer.
    pub tool_settled: Option<ToolSettledHook>,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            ids: Arc::new(UuidIds),
            clock: Arc::new(SystemClock),
            max_items: DEFAULT_MAX_ITEMS,
            preview_chars: DEFAULT_PREVIEW_CHARS,
            tool_settled: None,
        }
    }
}

impl std::fmt::Debug for RegistryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryOptions")
            .field("max_items", &self.max_items)
            .field("preview_chars", &self.preview_chars)
            .field("tool_settled", &self.tool_settled.is_some())
            .finish()
    }
}

impl RegistryOptions {
    pub fn reducer(&self) -> Reducer {
        let reducer = Reducer::new(Arc::clone(&self.ids), Arc::clone(&self.clock))
            .with_preview_chars(self.preview_chars);
        match &self.tool_settled {
            Some(hook) => reducer.with_tool_settled_hook(Arc::clone(hook)),
            None => reducer,
        }
    }
}

/// Owner of every open thread's session.
pub struct ThreadRegistry {
    store: Arc<dyn TranscriptStore>,
    options: RegistryOptions,
    sessions: HashMap<String, ThreadSession>,
}

impl ThreadRegistry {
    pub fn new(store: Arc<dyn TranscriptStore>, options: RegistryOptions) -> Self {
        Self {
            store,
            options,
            sessions: HashMap::new(),
        }
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    /// Open a thread, replaying its stored transcript on first open.
    #[instrument(skip(self))]
    pub async fn open(&mut self, thread_id: &str) -> SessionResult<&mut ThreadSession> {
        let session = match self.sessions.remove(thread_id) {
            Some(session) => session,
            None => {
                let entries = self.store.read_transcript(thread_id).await?;
                let mut session = ThreadSession::new(
                    thread_id,
                    Dispatcher::new(self.options.reducer()),
                    LiveFeed::new(self.options.max_items),
                );
                session.restore(&entries);
                info!(
                    "opened thread {thread_id} with {} feed items",
                    session.feed().len()
                );
                session
            }
        };
        Ok(self.sessions.entry(thread_id.to_string()).or_insert(session))
    }

    pub fn get(&self, thread_id: &str) -> Option<&ThreadSession> {
        self.sessions.get(thread_id)
    }

    pub fn get_mut(&mut self, thread_id: &str) -> Option<&mut ThreadSession> {
        self.sessions.get_mut(thread_id)
    }

    pub fn is_open(&self, thread_id: &str) -> bool {
        self.sessions.contains_key(thread_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Persist recorded traffic of every open thread in one batch.
    ///
    /// On failure, entries of threads the store did not write are put back
    /// in front of each session's newer traffic; threads already written are
    /// not retried.
    #[instrument(skip(self))]
    pub async fn flush(&mut self) -> SessionResult<usize> {
        let mut batch = Vec::new();
        for session in self.sessions.values_mut() {
            batch.extend(session.take_pending());
        }
        if batch.is_empty() {
            return Ok(0);
        }

        let total = batch.len();
        if let Err(err) = self.store.append_entries(&batch).await {
            let written = err.written_threads();
            let mut by_thread: HashMap<String, Vec<TranscriptEntry>> = HashMap::new();
            for entry in batch {
                if written.contains(&entry.thread_id) {
                    continue;
                }
                by_thread
                    .entry(entry.thread_id.clone())
                    .or_default()
                    .push(entry);
            }
            let kept: usize = by_thread.values().map(Vec::len).sum();
            warn!("transcript flush failed, {kept} of {total} entries kept for retry: {err}");
            for (thread_id, entries) in by_thread {
                if let Some(session) = self.sessions.get_mut(&thread_id) {
                    session.requeue(entries);
                }
            }
            return Err(err.into());
        }
        Ok(total)
    }

    /// Flush and close a thread. Returns the closed session, if it was open.
    #[instrument(skip(self))]
    pub async fn teardown(&mut self, thread_id: &str) -> SessionResult<Option<ThreadSession>> {
        let Some(mut session) = self.sessions.remove(thread_id) else {
            return Ok(None);
        };
        let pending = session.take_pending();
        if let Err(err) = self.store.append_entries(&pending).await {
            session.requeue(pending);
            self.sessions.insert(thread_id.to_string(), session);
            return Err(err.into());
        }
        info!("closed thread {thread_id}");
        Ok(Some(session))
    }

    /// Close a thread without flushing and delete its transcript.
    #[instrument(skip(self))]
    pub async fn delete(&mut self, thread_id: &str) -> SessionResult<()> {
        self.sessions.remove(thread_id);
        self.store.delete_transcript(thread_id).await?;
        info!("deleted thread {thread_id}");
        Ok(())
    }
}
