//! JSONL logger: append-only line-delimited JSON activity log.
//!
//! Each line is a self-contained JSON object, assembled in memory and written
//! with a single `write_all` so a tailing reader never sees a partial line.
//!
//! Degradation chain when writes fail:
//! 1. Primary file path
//! 2. Fallback path (e.g. `/dev/shm/qgm.jsonl`)
//! 3. stderr with `[QGM-JSONL]` prefix
//! 4. Silent discard (the monitor must never stop for logging failures)

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions, rename};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::core::errors::{QgmError, Result};

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Log event types of the monitor's activity model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    DaemonStart,
    DaemonStop,
    HealthChange,
    QueueGrowth,
    QueueRecovered,
    QueueSkipped,
    MonitorToggle,
    ConfigReload,
    Error,
}

/// A single JSONL log entry; only `ts`, `event` and `severity` are always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    /// Queue the event concerns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    /// Aggregate health after the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healthy: Option<bool>,
    /// Monitor status label ("active" / "deactivated").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Scaled regression slope of the queue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slope_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_raw: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_smoothed: Option<f64>,
    /// QGM error code if something failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Freeform details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Create a new entry stamped with the current UTC time.
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            severity,
            queue: None,
            healthy: None,
            status: None,
            slope_percent: None,
            last_raw: None,
            last_smoothed: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }
}

/// Where lines currently go.
enum Sink {
    File {
        writer: BufWriter<File>,
        path: PathBuf,
        bytes: u64,
        fallback: bool,
    },
    Stderr,
    Discard,
}

/// Configuration for the JSONL writer.
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    /// Primary log file path.
    pub path: PathBuf,
    /// Optional fallback path (e.g. on a RAM-backed filesystem).
    pub fallback_path: Option<PathBuf>,
    /// Rotate once the file would exceed this size. Default: 50 MiB.
    pub max_size_bytes: u64,
    /// Rotated generations kept (`.1` newest). Default: 3.
    pub max_rotated_files: u32,
    /// Seconds between forced data syncs. Default: 10.
    pub fsync_interval_secs: u64,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/qgm/activity.jsonl"),
            fallback_path: Some(PathBuf::from("/dev/shm/qgm.jsonl")),
            max_size_bytes: 50 * 1024 * 1024,
            max_rotated_files: 3,
            fsync_interval_secs: 10,
        }
    }
}

impl JsonlConfig {
    /// Config writing to `path` with the default limits and no fallback.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fallback_path: None,
            ..Self::default()
        }
    }
}

/// Append-only JSONL writer with size rotation and a degradation chain.
pub struct JsonlWriter {
    config: JsonlConfig,
    sink: Sink,
    last_sync: SystemTime,
}

impl JsonlWriter {
    /// Open the log, walking down the degradation chain on failure.
    pub fn open(config: JsonlConfig) -> Self {
        let sink = open_sink(&config.path, false)
            .or_else(|| {
                config.fallback_path.as_deref().and_then(|fb| {
                    let sink = open_sink(fb, true)?;
                    let _ = writeln!(
                        io::stderr(),
                        "[QGM-JSONL] primary path failed, using fallback: {}",
                        fb.display()
                    );
                    Some(sink)
                })
            })
            .unwrap_or_else(|| {
                let _ = writeln!(io::stderr(), "[QGM-JSONL] no writable log path, using stderr");
                Sink::Stderr
            });
        Self {
            config,
            sink,
            last_sync: SystemTime::now(),
        }
    }

    /// Serialize `entry` and append it as one line.
    pub fn write_entry(&mut self, entry: &LogEntry) {
        match serde_json::to_string(entry) {
            Ok(json) => self.write_line(&format!("{json}\n")),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[QGM-JSONL] serialize error: {e}");
            }
        }
    }

    pub fn flush(&mut self) {
        if let Sink::File { writer, .. } = &mut self.sink {
            let _ = writer.flush();
        }
    }

    /// Flush and sync file data to disk.
    pub fn fsync(&mut self) {
        if let Sink::File { writer, .. } = &mut self.sink {
            let _ = writer.flush();
            let _ = writer.get_ref().sync_data();
        }
        self.last_sync = SystemTime::now();
    }

    /// Current degradation state label.
    pub fn state(&self) -> &'static str {
        match &self.sink {
            Sink::File {
                fallback: false, ..
            } => "normal",
            Sink::File { fallback: true, .. } => "fallback",
            Sink::Stderr => "stderr",
            Sink::Discard => "discard",
        }
    }

    /// Bytes in the current log file (0 when not writing to a file).
    pub fn bytes_written(&self) -> u64 {
        match &self.sink {
            Sink::File { bytes, .. } => *bytes,
            _ => 0,
        }
    }

    /// Return to the primary path if it became writable again.
    pub fn try_recover(&mut self) {
        if self.state() == "normal" {
            return;
        }
        if let Some(sink) = open_sink(&self.config.path, false) {
            self.flush();
            self.sink = sink;
            let _ = writeln!(
                io::stderr(),
                "[QGM-JSONL] recovered to primary path: {}",
                self.config.path.display()
            );
        }
    }

    fn write_line(&mut self, line: &str) {
        let len = line.len() as u64;
        if let Sink::File { bytes, .. } = &self.sink
            && bytes + len > self.config.max_size_bytes
        {
            self.rotate();
        }

        match &mut self.sink {
            Sink::File { writer, bytes, .. } => {
                if writer.write_all(line.as_bytes()).is_ok() {
                    *bytes += len;
                    self.maybe_fsync();
                } else {
                    self.degrade();
                    self.write_line(line);
                }
            }
            Sink::Stderr => {
                if write!(io::stderr(), "[QGM-JSONL] {line}").is_err() {
                    self.sink = Sink::Discard;
                }
            }
            Sink::Discard => {}
        }
    }

    fn maybe_fsync(&mut self) {
        let elapsed = SystemTime::now()
            .duration_since(self.last_sync)
            .unwrap_or(Duration::ZERO);
        if elapsed.as_secs() >= self.config.fsync_interval_secs {
            self.fsync();
        }
    }

    /// Step one level down the chain: primary → fallback → stderr → discard.
    fn degrade(&mut self) {
        let next = match &self.sink {
            Sink::File {
                fallback: false, ..
            } => self
                .config
                .fallback_path
                .as_deref()
                .and_then(|fb| open_sink(fb, true))
                .unwrap_or(Sink::Stderr),
            Sink::File { fallback: true, .. } => Sink::Stderr,
            Sink::Stderr | Sink::Discard => Sink::Discard,
        };
        let _ = writeln!(io::stderr(), "[QGM-JSONL] write failed, degrading");
        self.sink = next;
    }

    /// Shift `log.N` → `log.N+1` (dropping the oldest), move the live file to
    /// `log.1`, and reopen a fresh file.
    fn rotate(&mut self) {
        self.flush();
        let (path, fallback) = match &self.sink {
            Sink::File { path, fallback, .. } => (path.clone(), *fallback),
            _ => return,
        };
        self.sink = Sink::Discard;

        let keep = self.config.max_rotated_files.max(1);
        let _ = fs::remove_file(rotated_name(&path, keep));
        for i in (1..keep).rev() {
            let _ = rename(rotated_name(&path, i), rotated_name(&path, i + 1));
        }
        let _ = rename(&path, rotated_name(&path, 1));

        self.sink = open_sink(&path, fallback).unwrap_or_else(|| {
            let _ = writeln!(io::stderr(), "[QGM-JSONL] reopen after rotation failed");
            Sink::Stderr
        });
    }
}

// ──────────────────────── helpers ────────────────────────

fn open_sink(path: &Path, fallback: bool) -> Option<Sink> {
    let (file, size) = open_append(path).ok()?;
    Some(Sink::File {
        writer: BufWriter::with_capacity(64 * 1024, file),
        path: path.to_path_buf(),
        bytes: size,
        fallback,
    })
}

/// Open or create a file for appending. Returns `(File, current_size)`.
fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| QgmError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| QgmError::io(path, source))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, size))
}

/// Build a rotated filename: `foo.jsonl` → `foo.jsonl.3`.
fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

/// Format current UTC time as ISO 8601.
fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// ──────────────────────── tests ────────────────────────
