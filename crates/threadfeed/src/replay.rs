//! Transcript replay.
//!
//! Rebuilds a thread's feed from its stored transcript. Every replay starts
//! from a fresh [`AccumulationState`] and a plain [`VecSink`], so the result
//! depends only on the entries and the injected id/time sources.

use tracing::instrument;

use threadfeed_protocol::{FeedItem, TranscriptEntry};

use crate::dispatch::Dispatcher;
use crate::reducer::Reducer;
use crate::sink::{FeedSink, VecSink};
use crate::state::AccumulationState;

/// Replay `entries` in order and return the reconstructed feed.
#[instrument(skip_all, fields(entries = entries.len()))]
pub fn replay_transcript(entries: &[TranscriptEntry], reducer: &Reducer) -> Vec<FeedItem> {
    let mut dispatcher = Dispatcher::new(reducer.clone());
    let mut sink = VecSink::new();
    replay_into(entries, &mut dispatcher, &mut sink);
    sink.into_items()
}

/// Replay `entries` into an arbitrary sink with a fresh accumulation state.
///
/// The dispatcher keeps the client message ids it saw, so a live session
/// restored this way still skips server echoes of those messages.
pub fn replay_into(
    entries: &[TranscriptEntry],
    dispatcher: &mut Dispatcher,
    sink: &mut dyn FeedSink,
) {
    let mut state = AccumulationState::new();
    for entry in entries {
        dispatcher.apply_payload(&mut state, &entry.payload, sink);
    }
}
