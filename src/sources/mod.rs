//! Backlog sources: the collaborators that report each queue's ready-entry count.
//!
//! A source answers for exactly one queue. Failures are per-queue and never
//! abort a monitoring round; the monitor skips the queue until the next tick.

#![allow(missing_docs)]

pub mod spool;

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

/// One backlog observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacklogSample {
    /// Observation time in milliseconds; must not decrease per queue.
    pub timestamp_millis: i64,
    /// Entries waiting to be processed.
    pub ready_entries: i64,
}

/// Why a source could not produce a reading this round.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// The backing queue cannot report a ready-entry count.
    #[error("queue {queue_id} does not report a ready-entry count")]
    Unsupported { queue_id: String },
    /// The reading could not be obtained right now.
    #[error("queue {queue_id} backlog unavailable: {details}")]
    Unavailable { queue_id: String, details: String },
}

impl SourceError {
    #[must_use]
    pub fn queue_id(&self) -> &str {
        match self {
            Self::Unsupported { queue_id } | Self::Unavailable { queue_id, .. } => queue_id,
        }
    }

    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}

/// Supplies backlog readings for a single queue.
pub trait BacklogSource: Send + Sync {
    fn queue_id(&self) -> &str;

    fn sample(&self) -> Result<BacklogSample, SourceError>;
}

/// In-memory source whose reading is set by the owner.
///
/// Clones share the same reading, so a test or embedding application can keep
/// one handle and give the other to the monitor. An unset reading reports
/// [`SourceError::Unsupported`].
#[derive(Debug, Clone)]
pub struct FixedSource {
    queue_id: String,
    reading: Arc<Mutex<Option<BacklogSample>>>,
}

impl FixedSource {
    #[must_use]
    pub fn new(queue_id: impl Into<String>) -> Self {
        Self {
            queue_id: queue_id.into(),
            reading: Arc::new(Mutex::new(None)),
        }
    }

    #[must_use]
    pub fn with_reading(queue_id: impl Into<String>, timestamp_millis: i64, ready: i64) -> Self {
        let source = Self::new(queue_id);
        source.set(timestamp_millis, ready);
        source
    }

    pub fn set(&self, timestamp_millis: i64, ready_entries: i64) {
        *self.reading.lock() = Some(BacklogSample {
            timestamp_millis,
            ready_entries,
        });
    }

    /// Make the source report `Unsupported` until the next [`set`](Self::set).
    pub fn clear(&self) {
        *self.reading.lock() = None;
    }
}

impl BacklogSource for FixedSource {
    fn queue_id(&self) -> &str {
        &self.queue_id
    }

    fn sample(&self) -> Result<BacklogSample, SourceError> {
        (*self.reading.lock()).ok_or_else(|| SourceError::Unsupported {
            queue_id: self.queue_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{BacklogSource, FixedSource, SourceError};

    #[test]
    fn unset_source_is_unsupported() {
        let source = FixedSource::new("orders");
        let err = source.sample().unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(err.queue_id(), "orders");
    }

    #[test]
    fn clones_share_reading() {
        let source = FixedSource::new("orders");
        let handle = source.clone();
        handle.set(1_000, 42);
        let sample = source.sample().unwrap();
        assert_eq!(sample.ready_entries, 42);
        assert_eq!(sample.timestamp_millis, 1_000);
        handle.clear();
        assert!(source.sample().is_err());
    }

    #[test]
    fn unavailable_is_not_unsupported() {
        let err = SourceError::Unavailable {
            queue_id: "q".to_string(),
            details: "io".to_string(),
        };
        assert!(!err.is_unsupported());
        assert!(err.to_string().contains("io"));
    }
}
