//! Transcript persistence.
//!
//! Transcripts are append-only logs of wire traffic, replayed to rebuild a
//! thread's feed when it is reopened.

mod error;
mod store;

pub use error::{TranscriptError, TranscriptResult};
pub use store::{
    JsonlTranscriptStore, MAX_THREAD_ID_LEN, TranscriptStore, parse_transcript,
    read_transcript_file, validate_thread_id,
};
