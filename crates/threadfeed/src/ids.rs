//! Identifier and time sources.
//!
//! The reducer never calls `Uuid::new_v4()` or `Utc::now()` directly so that
//! replay and live processing can be made deterministic under test.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

/// Produces unique feed item ids.
pub trait IdSource: Send + Sync {
    fn new_id(&self) -> String;
}

/// Produces timestamps for new feed items and transcript entries.
pub trait Clock: Send + Sync {
    fn now(&self) -> String;
}

/// Random v4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdSource for UuidIds {
    fn new_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic `<prefix>-<n>` ids, starting at 1.
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new("item")
    }
}

impl IdSource for SequentialIds {
    fn new_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", self.prefix, n)
    }
}

/// Wall-clock UTC time, RFC 3339 with millisecond precision.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Always returns the same timestamp.
#[derive(Debug, Clone)]
pub struct FixedClock(pub String);

impl Default for FixedClock {
    fn default() -> Self {
        Self("1970-01-01T00:00:00.000Z".to_string())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> String {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_ids() {
        let ids = SequentialIds::new("t");
        assert_eq!(ids.new_id(), "t-1");
        assert_eq!(ids.new_id(), "t-2");
    }

    #[test]
    fn test_uuid_ids_are_unique() {
        let ids = UuidIds;
        assert_ne!(ids.new_id(), ids.new_id());
    }

    #[test]
    fn test_system_clock_format() {
        let ts = SystemClock.now();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
