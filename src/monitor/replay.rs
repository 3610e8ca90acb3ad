//! Offline replay: feed a recorded JSONL sample log through a fresh monitor.
//!
//! One sample per line:
//!
//! ```json
//! {"queue": "orders", "timestamp_millis": 1000, "ready_entries": 12}
//! {"queue": "legacy", "timestamp_millis": 1000, "ready_entries": null}
//! ```
//!
//! Consecutive lines sharing a timestamp form one monitoring round. Blank
//! lines and lines starting with `#` are ignored.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::config::MonitorConfig;
use crate::core::errors::{QgmError, Result};
use crate::monitor::growth::{GrowthHealthMonitor, MonitorResult};
use crate::sources::{BacklogSource, FixedSource};

/// One recorded observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub queue: String,
    pub timestamp_millis: i64,
    /// `None` when the queue could not report a count.
    pub ready_entries: Option<i64>,
}

/// Summary of a replay run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub rounds: usize,
    pub samples: usize,
    pub unhealthy_rounds: usize,
    /// Timestamp of the first round that reported unhealthy.
    pub first_unhealthy_at: Option<i64>,
    pub result: MonitorResult,
}

/// Parse a sample log; errors carry the 1-based line number.
pub fn parse_sample_log<R: BufRead>(reader: R) -> Result<Vec<SampleRecord>> {
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| QgmError::SampleParse {
            line: line_no,
            details: e.to_string(),
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let record: SampleRecord =
            serde_json::from_str(trimmed).map_err(|e| QgmError::SampleParse {
                line: line_no,
                details: e.to_string(),
            })?;
        records.push(record);
    }
    Ok(records)
}

/// Read and parse a sample log file.
pub fn read_sample_log(path: &Path) -> Result<Vec<SampleRecord>> {
    let file = File::open(path).map_err(|source| QgmError::io(path, source))?;
    parse_sample_log(BufReader::new(file))
}

/// Group consecutive records with equal timestamps into rounds.
#[must_use]
pub fn rounds(records: &[SampleRecord]) -> Vec<&[SampleRecord]> {
    records
        .chunk_by(|a, b| a.timestamp_millis == b.timestamp_millis)
        .collect()
}

/// Replay `records` through a monitor built from `config`.
///
/// `active` overrides the configured start state so a log can be evaluated
/// without flipping the toggle by hand.
pub fn replay(config: MonitorConfig, records: &[SampleRecord], active: bool) -> Result<ReplayReport> {
    let monitor = GrowthHealthMonitor::new(config)?;
    if active {
        monitor.activate();
    } else {
        monitor.deactivate();
    }

    let mut unhealthy_rounds = 0;
    let mut first_unhealthy_at = None;
    let mut round_count = 0;
    let mut last: Arc<MonitorResult> = monitor.latest();

    for round in rounds(records) {
        let sources = round_sources(round);
        last = monitor.check(&sources);
        round_count += 1;
        if !last.healthy {
            unhealthy_rounds += 1;
            first_unhealthy_at.get_or_insert(round[0].timestamp_millis);
        }
    }

    Ok(ReplayReport {
        rounds: round_count,
        samples: records.len(),
        unhealthy_rounds,
        first_unhealthy_at,
        result: (*last).clone(),
    })
}

/// One source per queue in the round; the last line for a queue wins.
fn round_sources(round: &[SampleRecord]) -> Vec<Box<dyn BacklogSource>> {
    let mut by_queue: BTreeMap<&str, &SampleRecord> = BTreeMap::new();
    for record in round {
        by_queue.insert(record.queue.as_str(), record);
    }
    by_queue
        .into_values()
        .map(|record| {
            let source = FixedSource::new(record.queue.clone());
            if let Some(ready) = record.ready_entries {
                source.set(record.timestamp_millis, ready);
            }
            Box::new(source) as Box<dyn BacklogSource>
        })
        .collect()
}
