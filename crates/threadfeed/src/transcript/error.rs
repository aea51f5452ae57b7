//! Transcript persistence errors.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for transcript operations.
pub type TranscriptResult<T> = Result<T, TranscriptError>;

/// Errors that can occur while reading or writing transcripts.
#[derive(Debug, Error)]
pub enum TranscriptError {
    /// Thread id is empty, too long or contains path characters.
    #[error("invalid thread id: {0}")]
    InvalidThreadId(String),

    /// Direction is neither `server` nor `client`.
    #[error("invalid direction: {0}")]
    InvalidDirection(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored line could not be decoded.
    #[error("failed to parse line {line} of {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// An entry could not be encoded.
    #[error("failed to serialize entry: {0}")]
    Serialize(#[source] serde_json::Error),

    /// A batch append failed after some threads were already written.
    #[error("append stopped after writing {} thread(s): {source}", written.len())]
    PartialAppend {
        written: Vec<String>,
        #[source]
        source: Box<TranscriptError>,
    },
}

impl TranscriptError {
    /// Threads whose entries reached disk before this error.
    pub fn written_threads(&self) -> &[String] {
        match self {
            Self::PartialAppend { written, .. } => written,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TranscriptError::InvalidThreadId("../etc".to_string());
        assert_eq!(err.to_string(), "invalid thread id: ../etc");

        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = TranscriptError::Parse {
            path: PathBuf::from("/tmp/t.jsonl"),
            line: 3,
            source,
        };
        assert!(err.to_string().starts_with("failed to parse line 3 of /tmp/t.jsonl"));
        assert!(err.written_threads().is_empty());
    }

    #[test]
    fn test_partial_append() {
        let err = TranscriptError::PartialAppend {
            written: vec!["a".to_string()],
            source: Box::new(TranscriptError::InvalidDirection("x".to_string())),
        };
        assert_eq!(err.written_threads(), ["a".to_string()]);
        assert_eq!(
            err.to_string(),
            "append stopped after writing 1 thread(s): invalid direction: x"
        );
    }
}
