//! JSONL transcript store.
//!
//! One `<threadId>.jsonl` file per thread, one [`TranscriptEntry`] per line.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

use threadfeed_protocol::{Direction, TranscriptEntry};

use super::error::{TranscriptError, TranscriptResult};

/// Longest accepted thread id.
pub const MAX_THREAD_ID_LEN: usize = 256;

/// Persistence for per-thread transcripts.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Append entries, possibly spanning several threads.
    ///
    /// Threads are written one at a time. When a later thread fails, the
    /// error is [`TranscriptError::PartialAppend`] naming the threads that
    /// were already written.
    async fn append_entries(&self, entries: &[TranscriptEntry]) -> TranscriptResult<()>;

    /// All entries of a thread in append order. Empty if none were stored.
    async fn read_transcript(&self, thread_id: &str) -> TranscriptResult<Vec<TranscriptEntry>>;

    /// Remove a thread's transcript. Missing transcripts are not an error.
    async fn delete_transcript(&self, thread_id: &str) -> TranscriptResult<()>;
}

/// Reject ids that could escape the transcripts directory.
pub fn validate_thread_id(thread_id: &str) -> TranscriptResult<()> {
    if thread_id.is_empty() {
        return Err(TranscriptError::InvalidThreadId(
            "thread id must not be empty".to_string(),
        ));
    }
    if thread_id.len() > MAX_THREAD_ID_LEN {
        return Err(TranscriptError::InvalidThreadId(format!(
            "thread id is longer than {MAX_THREAD_ID_LEN} bytes"
        )));
    }
    if !thread_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(TranscriptError::InvalidThreadId(thread_id.to_string()));
    }
    Ok(())
}

/// Line shape accepted on read; direction is normalised afterwards.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntry {
    ts: String,
    thread_id: String,
    direction: String,
    payload: Value,
}

/// Parse JSONL transcript text. `path` is only used in error messages.
pub fn parse_transcript(text: &str, path: &Path) -> TranscriptResult<Vec<TranscriptEntry>> {
    let mut entries = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let stored: StoredEntry =
            serde_json::from_str(trimmed).map_err(|source| TranscriptError::Parse {
                path: path.to_path_buf(),
                line: idx + 1,
                source,
            })?;
        let direction: Direction = stored
            .direction
            .parse()
            .map_err(TranscriptError::InvalidDirection)?;
        entries.push(TranscriptEntry::new(
            stored.ts,
            stored.thread_id,
            direction,
            stored.payload,
        ));
    }
    Ok(entries)
}

/// Read and parse a transcript file outside any store.
pub async fn read_transcript_file(path: &Path) -> TranscriptResult<Vec<TranscriptEntry>> {
    let text = tokio::fs::read_to_string(path).await?;
    parse_transcript(&text, path)
}

/// File-backed [`TranscriptStore`].
#[derive(Debug, Clone)]
pub struct JsonlTranscriptStore {
    dir: PathBuf,
}

impl JsonlTranscriptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a thread's transcript file.
    pub fn transcript_path(&self, thread_id: &str) -> TranscriptResult<PathBuf> {
        validate_thread_id(thread_id)?;
        Ok(self.dir.join(format!("{thread_id}.jsonl")))
    }

    /// Append one thread's entries with a single write.
    async fn append_thread(
        &self,
        thread_id: &str,
        entries: &[&TranscriptEntry],
    ) -> TranscriptResult<()> {
        let mut buf = String::new();
        for entry in entries {
            let line = serde_json::to_string(entry).map_err(TranscriptError::Serialize)?;
            buf.push_str(&line);
            buf.push('\n');
        }

        let path = self.dir.join(format!("{thread_id}.jsonl"));
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;
        debug!(
            "appended {} transcript entries to {}",
            entries.len(),
            path.display()
        );
        Ok(())
    }
}

#[async_trait]
impl TranscriptStore for JsonlTranscriptStore {
    #[instrument(skip_all, fields(entries = entries.len()))]
    async fn append_entries(&self, entries: &[TranscriptEntry]) -> TranscriptResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        // Validate everything before touching the filesystem.
        let mut order: Vec<&str> = Vec::new();
        let mut by_thread: HashMap<&str, Vec<&TranscriptEntry>> = HashMap::new();
        for entry in entries {
            validate_thread_id(&entry.thread_id)?;
            let group = by_thread.entry(entry.thread_id.as_str()).or_default();
            if group.is_empty() {
                order.push(entry.thread_id.as_str());
            }
            group.push(entry);
        }

        tokio::fs::create_dir_all(&self.dir).await?;

        let mut written: Vec<String> = Vec::new();
        for thread_id in order {
            if let Err(err) = self.append_thread(thread_id, &by_thread[thread_id]).await {
                if written.is_empty() {
                    return Err(err);
                }
                return Err(TranscriptError::PartialAppend {
                    written,
                    source: Box::new(err),
                });
            }
            written.push(thread_id.to_string());
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn read_transcript(&self, thread_id: &str) -> TranscriptResult<Vec<TranscriptEntry>> {
        let path = self.transcript_path(thread_id)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => parse_transcript(&text, &path),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self))]
    async fn delete_transcript(&self, thread_id: &str) -> TranscriptResult<()> {
        let path = self.transcript_path(thread_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_thread_id() {
        assert!(validate_thread_id("thread_01-abc").is_ok());
        assert!(validate_thread_id("").is_err());
        assert!(validate_thread_id("../escape").is_err());
        assert!(validate_thread_id("a/b").is_err());
        assert!(validate_thread_id("a.jsonl").is_err());
        assert!(validate_thread_id(&"x".repeat(MAX_THREAD_ID_LEN)).is_ok());
        assert!(validate_thread_id(&"x".repeat(MAX_THREAD_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_parse_normalises_direction() {
        let text = concat!(
            r#"{"ts":"1","threadId":"t","direction":" Server ","payload":{"type":"log","line":"a"}}"#,
            "\n\n",
            r#"{"ts":"2","threadId":"t","direction":"CLIENT","payload":{}}"#,
            "\n",
        );
        let entries = parse_transcript(text, Path::new("t.jsonl")).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].direction, Direction::Server);
        assert_eq!(entries[0].payload, json!({"type": "log", "line": "a"}));
        assert_eq!(entries[1].direction, Direction::Client);
    }

    #[test]
    fn test_parse_reports_line_number() {
        let text = "\n{\"ts\":\"1\",\"threadId\":\"t\",\"direction\":\"server\",\"payload\":1}\nnot json\n";
        let err = parse_transcript(text, Path::new("t.jsonl")).unwrap_err();
        assert!(matches!(err, TranscriptError::Parse { line: 3, .. }));
    }

    #[test]
    fn test_parse_rejects_unknown_direction() {
        let text = r#"{"ts":"1","threadId":"t","direction":"sideways","payload":{}}"#;
        let err = parse_transcript(text, Path::new("t.jsonl")).unwrap_err();
        assert!(matches!(err, TranscriptError::InvalidDirection(_)));
    }
}
