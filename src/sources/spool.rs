//! Spool-file source: the queue host rewrites a small JSON document every tick.
//!
//! ```json
//! { "timestamp_millis": 1760000000000,
//!   "queues": { "orders": 12, "legacy": null } }
//! ```
//!
//! A `null` count or an absent queue id means the queue cannot report a
//! backlog (`Unsupported`). An unreadable or malformed file is `Unavailable`.
//! When `timestamp_millis` is omitted the wall clock at read time is used.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::sources::{BacklogSample, BacklogSource, SourceError};

/// On-disk spool document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpoolDocument {
    pub timestamp_millis: Option<i64>,
    pub queues: HashMap<String, Option<i64>>,
}

impl SpoolDocument {
    pub fn read(path: &Path) -> std::result::Result<Self, String> {
        let raw = fs::read_to_string(path)
            .map_err(|e| format!("cannot read spool {}: {e}", path.display()))?;
        serde_json::from_str(&raw).map_err(|e| format!("invalid spool {}: {e}", path.display()))
    }
}

/// Reads one queue's count from a shared spool file.
#[derive(Debug, Clone)]
pub struct SpoolFileSource {
    queue_id: String,
    path: PathBuf,
}

impl SpoolFileSource {
    #[must_use]
    pub fn new(queue_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            queue_id: queue_id.into(),
            path: path.into(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BacklogSource for SpoolFileSource {
    fn queue_id(&self) -> &str {
        &self.queue_id
    }

    fn sample(&self) -> Result<BacklogSample, SourceError> {
        let doc = SpoolDocument::read(&self.path).map_err(|details| SourceError::Unavailable {
            queue_id: self.queue_id.clone(),
            details,
        })?;
        let Some(Some(ready_entries)) = doc.queues.get(&self.queue_id).copied() else {
            return Err(SourceError::Unsupported {
                queue_id: self.queue_id.clone(),
            });
        };
        Ok(BacklogSample {
            timestamp_millis: doc
                .timestamp_millis
                .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
            ready_entries,
        })
    }
}

/// One spool source per configured queue, all reading the same file.
#[must_use]
pub fn sources_for(queues: &[String], path: &Path) -> Vec<Box<dyn BacklogSource>> {
    queues
        .iter()
        .map(|queue| Box::new(SpoolFileSource::new(queue.clone(), path)) as Box<dyn BacklogSource>)
        .collect()
}
