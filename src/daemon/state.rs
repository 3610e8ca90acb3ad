//! Health state file shared between the daemon and `qgm status`.
//!
//! The daemon rewrites the file after every tick (tmp file + rename), so a
//! reader always sees a complete document.

#![allow(missing_docs)]

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::{QgmError, Result};
use crate::monitor::growth::{MonitorResult, MonitorStatus};

/// A state file older than this many poll intervals is reported as stale.
pub const STALE_AFTER_POLL_INTERVALS: u64 = 3;

/// Snapshot of the running daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthState {
    pub version: String,
    pub pid: u32,
    /// RFC 3339.
    pub started_at: String,
    /// RFC 3339.
    pub last_updated: String,
    pub status: MonitorStatus,
    pub ticks: u64,
    #[serde(default)]
    pub dropped_log_events: u64,
    pub result: MonitorResult,
}

impl HealthState {
    /// Seconds since `last_updated`, or `None` when the timestamp is unparsable.
    #[must_use]
    pub fn age_secs(&self) -> Option<i64> {
        let updated = chrono::DateTime::parse_from_rfc3339(&self.last_updated).ok()?;
        Some(
            chrono::Utc::now()
                .signed_duration_since(updated)
                .num_seconds(),
        )
    }

    /// Whether the daemon missed enough ticks to be considered stalled.
    #[must_use]
    pub fn is_stale(&self, poll_interval_ms: u64) -> bool {
        let limit_secs = (poll_interval_ms.saturating_mul(STALE_AFTER_POLL_INTERVALS) / 1000).max(1);
        self.age_secs()
            .is_some_and(|age| age > i64::try_from(limit_secs).unwrap_or(i64::MAX))
    }

    /// Pid that may safely receive a control signal.
    ///
    /// Refuses a stale file, since the recorded pid may have been reused by an
    /// unrelated process, and pid 0, which would address the whole process group.
    pub fn signal_target(&self, poll_interval_ms: u64) -> Result<u32> {
        if self.pid == 0 {
            return Err(QgmError::StateUnavailable {
                details: "state file records pid 0".to_string(),
            });
        }
        if self.age_secs().is_none() || self.is_stale(poll_interval_ms) {
            return Err(QgmError::StateUnavailable {
                details: format!(
                    "state file last updated {}; refusing to signal pid {}",
                    self.last_updated, self.pid
                ),
            });
        }
        Ok(self.pid)
    }
}

/// Remove the state file on orderly shutdown. A missing file is fine.
pub fn clear_state(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(QgmError::io(path, source)),
    }
}

/// Write `state` atomically: serialize to `<path>.tmp`, sync, then rename.
///
/// The file is created 0o644 on Unix so `qgm status` works for other users.
pub fn write_state_atomic(path: &Path, state: &HealthState) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| QgmError::io(parent, source))?;
    }
    let json = serde_json::to_string_pretty(state)?;

    let written = (|| -> std::io::Result<()> {
        let mut opts = OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt as _;
            opts.mode(0o644);
        }
        let mut file = opts.open(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    written.map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        QgmError::io(path, source)
    })
}

/// Read the state file, warning on stderr when it looks stale.
pub fn read_state(path: &Path, poll_interval_ms: u64) -> Result<HealthState> {
    let raw = fs::read_to_string(path).map_err(|e| QgmError::StateUnavailable {
        details: format!("cannot read {}: {e}", path.display()),
    })?;
    let state: HealthState = serde_json::from_str(&raw).map_err(|e| QgmError::StateUnavailable {
        details: format!("invalid state file {}: {e}", path.display()),
    })?;

    if state.is_stale(poll_interval_ms) {
        eprintln!(
            "[QGM-STATUS] WARNING: state file is {}s old, daemon may be stalled",
            state.age_secs().unwrap_or_default()
        );
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state(last_updated: String) -> HealthState {
        HealthState {
            version: "0.1.0".to_string(),
            pid: 4242,
            started_at: last_updated.clone(),
            last_updated,
            status: MonitorStatus::Active,
            ticks: 3,
            dropped_log_events: 0,
            result: MonitorResult::pending(true),
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let state = sample_state(chrono::Utc::now().to_rfc3339());

        write_state_atomic(&path, &state).unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let read = read_state(&path, 60_000).unwrap();
        assert_eq!(read, state);
    }

    #[test]
    fn missing_file_is_state_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_state(&dir.path().join("absent.json"), 1_000).unwrap_err();
        assert_eq!(err.code(), "QGM-2002");
    }

    #[test]
    fn garbage_file_is_state_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            read_state(&path, 1_000),
            Err(QgmError::StateUnavailable { .. })
        ));
    }

    #[test]
    fn staleness_scales_with_poll_interval() {
        let old = chrono::Utc::now() - chrono::Duration::seconds(120);
        let state = sample_state(old.to_rfc3339());
        assert!(state.is_stale(10_000));
        assert!(!state.is_stale(60_000));
    }

    #[test]
    fn fresh_state_is_not_stale() {
        let state = sample_state(chrono::Utc::now().to_rfc3339());
        assert!(!state.is_stale(1_000));
        assert!(state.age_secs().unwrap() <= 1);
    }

    #[test]
    fn signal_target_requires_fresh_state_and_real_pid() {
        let fresh = sample_state(chrono::Utc::now().to_rfc3339());
        assert_eq!(fresh.signal_target(60_000).unwrap(), 4242);

        let old = chrono::Utc::now() - chrono::Duration::days(3);
        let stale = sample_state(old.to_rfc3339());
        assert_eq!(stale.signal_target(60_000).unwrap_err().code(), "QGM-2002");

        let mut group = sample_state(chrono::Utc::now().to_rfc3339());
        group.pid = 0;
        assert!(group.signal_target(60_000).is_err());

        let garbled = sample_state("yesterday".to_string());
        assert!(garbled.signal_target(60_000).is_err());
    }

    #[test]
    fn clear_state_removes_file_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        write_state_atomic(&path, &sample_state(chrono::Utc::now().to_rfc3339())).unwrap();
        clear_state(&path).unwrap();
        assert!(!path.exists());
        clear_state(&path).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn state_file_is_world_readable() {
        use std::os::unix::fs::PermissionsExt as _;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        write_state_atomic(&path, &sample_state(chrono::Utc::now().to_rfc3339())).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode & 0o044, 0o044);
    }
}
