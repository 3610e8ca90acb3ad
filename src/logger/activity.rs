//! Activity logger: a dedicated thread owns the [`JsonlWriter`]; everything else
//! sends [`ActivityEvent`]s over a bounded crossbeam channel.
//!
//! `send()` uses `try_send()`, so the monitoring loop never waits on disk I/O.
//! Events that do not fit are counted and reported by the logger thread on
//! the next event it handles.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{QgmError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

const CHANNEL_CAPACITY: usize = 1024;

/// Things worth recording about the monitor's life.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityEvent {
    DaemonStarted {
        version: String,
        config_hash: String,
    },
    DaemonStopped {
        reason: String,
        uptime_secs: u64,
    },
    HealthChanged {
        healthy: bool,
        message: String,
    },
    QueueGrowthDetected {
        queue: String,
        slope_percent: f64,
        last_raw: i64,
        last_smoothed: f64,
    },
    QueueRecovered {
        queue: String,
        slope_percent: f64,
        last_raw: i64,
        last_smoothed: f64,
    },
    QueueSkipped {
        queue: String,
        reason: String,
    },
    MonitorToggled {
        status: String,
    },
    ConfigReloaded {
        details: String,
    },
    Error {
        code: String,
        message: String,
    },
    /// Sentinel asking the logger thread to flush and exit.
    Shutdown,
}

/// Cheaply cloneable sender side of the logger.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Queue an event without blocking; drops it when the channel is full.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Events dropped since the logger last reported them.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and stop. Join the thread afterwards.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

/// Options for [`spawn_logger`].
#[derive(Debug, Clone)]
pub struct ActivityLoggerConfig {
    pub jsonl: JsonlConfig,
    pub channel_capacity: usize,
}

impl ActivityLoggerConfig {
    #[must_use]
    pub fn new(jsonl: JsonlConfig) -> Self {
        Self {
            jsonl,
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

impl Default for ActivityLoggerConfig {
    fn default() -> Self {
        Self::new(JsonlConfig::default())
    }
}

/// Start the logger thread.
///
/// It runs until [`ActivityLoggerHandle::shutdown`] is called or every handle
/// has been dropped.
pub fn spawn_logger(
    config: ActivityLoggerConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(config.channel_capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: Arc::clone(&dropped),
    };

    let jsonl = config.jsonl;
    let join = thread::Builder::new()
        .name("qgm-logger".to_string())
        .spawn(move || logger_thread_main(&rx, jsonl, &dropped))
        .map_err(|e| QgmError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

fn logger_thread_main(rx: &Receiver<ActivityEvent>, config: JsonlConfig, dropped: &AtomicU64) {
    let mut jsonl = JsonlWriter::open(config);

    while let Ok(event) = rx.recv() {
        let lost = dropped.swap(0, Ordering::Relaxed);
        if lost > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{lost} log events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if event == ActivityEvent::Shutdown {
            break;
        }
        jsonl.write_entry(&event_to_log_entry(&event));
        jsonl.flush();
        jsonl.try_recover();
    }

    jsonl.fsync();
}

/// Map an event onto its JSONL representation.
#[must_use]
pub fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::DaemonStarted {
            version,
            config_hash,
        } => {
            let mut e = LogEntry::new(EventType::DaemonStart, Severity::Info);
            e.details = Some(format!("version={version} config_hash={config_hash}"));
            e
        }
        ActivityEvent::DaemonStopped {
            reason,
            uptime_secs,
        } => {
            let mut e = LogEntry::new(EventType::DaemonStop, Severity::Info);
            e.details = Some(format!("reason={reason} uptime={uptime_secs}s"));
            e
        }
        ActivityEvent::HealthChanged { healthy, message } => {
            let severity = if *healthy {
                Severity::Info
            } else {
                Severity::Critical
            };
            let mut e = LogEntry::new(EventType::HealthChange, severity);
            e.healthy = Some(*healthy);
            e.details = Some(message.clone());
            e
        }
        ActivityEvent::QueueGrowthDetected {
            queue,
            slope_percent,
            last_raw,
            last_smoothed,
        } => queue_entry(
            EventType::QueueGrowth,
            Severity::Warning,
            queue,
            *slope_percent,
            *last_raw,
            *last_smoothed,
        ),
        ActivityEvent::QueueRecovered {
            queue,
            slope_percent,
            last_raw,
            last_smoothed,
        } => queue_entry(
            EventType::QueueRecovered,
            Severity::Info,
            queue,
            *slope_percent,
            *last_raw,
            *last_smoothed,
        ),
        ActivityEvent::QueueSkipped { queue, reason } => {
            let mut e = LogEntry::new(EventType::QueueSkipped, Severity::Info);
            e.queue = Some(queue.clone());
            e.details = Some(reason.clone());
            e
        }
        ActivityEvent::MonitorToggled { status } => {
            let mut e = LogEntry::new(EventType::MonitorToggle, Severity::Info);
            e.status = Some(status.clone());
            e
        }
        ActivityEvent::ConfigReloaded { details } => {
            let mut e = LogEntry::new(EventType::ConfigReload, Severity::Info);
            e.details = Some(details.clone());
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Warning);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e
        }
        ActivityEvent::Shutdown => {
            let mut e = LogEntry::new(EventType::DaemonStop, Severity::Info);
            e.details = Some("logger shutdown".to_string());
            e
        }
    }
}

fn queue_entry(
    event: EventType,
    severity: Severity,
    queue: &str,
    slope_percent: f64,
    last_raw: i64,
    last_smoothed: f64,
) -> LogEntry {
    let mut e = LogEntry::new(event, severity);
    e.queue = Some(queue.to_string());
    e.slope_percent = Some(slope_percent);
    e.last_raw = Some(last_raw);
    e.last_smoothed = Some(last_smoothed);
    e
}
