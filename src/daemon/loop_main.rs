//! Daemon main loop: poll every source once per interval, publish the health
//! result, log transitions and keep the state file current.
//!
//! One thread runs the loop; the activity logger runs on its own thread. The
//! sleep between ticks is sliced so shutdown, reload and toggle signals are
//! picked up within [`SIGNAL_POLL_SLICE`].

#![allow(missing_docs)]

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::core::config::Config;
use crate::core::errors::Result;
use crate::daemon::signals::{SignalHandler, ToggleRequest};
use crate::daemon::state::{HealthState, clear_state, write_state_atomic};
use crate::logger::activity::{
    ActivityEvent, ActivityLoggerConfig, ActivityLoggerHandle, spawn_logger,
};
use crate::logger::jsonl::JsonlConfig;
use crate::monitor::growth::{GrowthHealthMonitor, MonitorResult};
use crate::sources::BacklogSource;
use crate::sources::spool::sources_for;

/// Granularity of the inter-tick sleep.
pub const SIGNAL_POLL_SLICE: Duration = Duration::from_millis(100);

/// Long-running queue growth monitor.
pub struct MonitorDaemon {
    config: Config,
    monitor: Arc<GrowthHealthMonitor>,
    sources: Vec<Box<dyn BacklogSource>>,
    signal_handler: SignalHandler,
    logger_handle: ActivityLoggerHandle,
    logger_join: Option<thread::JoinHandle<()>>,
    started_at: chrono::DateTime<chrono::Utc>,
    start_instant: Instant,
    ticks: u64,
    last_healthy: Option<bool>,
    growing: HashSet<String>,
    last_skipped: BTreeMap<String, String>,
}

impl MonitorDaemon {
    /// Daemon reading the configured spool file, with OS signal hooks installed.
    pub fn new(config: Config) -> Result<Self> {
        let sources = sources_for(&config.sources.queues, &config.sources.spool_file);
        Self::with_sources(config, sources, SignalHandler::new())
    }

    /// Daemon over explicit sources and signal flags.
    pub fn with_sources(
        config: Config,
        sources: Vec<Box<dyn BacklogSource>>,
        signal_handler: SignalHandler,
    ) -> Result<Self> {
        let monitor = Arc::new(GrowthHealthMonitor::new(config.monitor.clone())?);
        let (logger_handle, logger_join) = spawn_logger(ActivityLoggerConfig::new(
            JsonlConfig::at(&config.paths.jsonl_log),
        ))?;

        Ok(Self {
            config,
            monitor,
            sources,
            signal_handler,
            logger_handle,
            logger_join: Some(logger_join),
            started_at: chrono::Utc::now(),
            start_instant: Instant::now(),
            ticks: 0,
            last_healthy: None,
            growing: HashSet::new(),
            last_skipped: BTreeMap::new(),
        })
    }

    /// Shared handle to the monitor, e.g. for an embedding health endpoint.
    #[must_use]
    pub fn monitor(&self) -> Arc<GrowthHealthMonitor> {
        Arc::clone(&self.monitor)
    }

    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run until a shutdown signal arrives.
    pub fn run(&mut self) -> Result<()> {
        let config_hash = self.config.stable_hash().unwrap_or_default();
        self.logger_handle.send(ActivityEvent::DaemonStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash,
        });
        eprintln!(
            "[QGM-DAEMON] started: {} queue(s), poll every {}ms, check {}",
            self.sources.len(),
            self.config.monitor.poll_interval_ms,
            self.monitor.status().as_str()
        );
        if self.sources.is_empty() {
            eprintln!("[QGM-DAEMON] no queues configured; every round will be empty");
        }

        loop {
            if self.signal_handler.should_shutdown() {
                eprintln!("[QGM-DAEMON] shutdown requested");
                break;
            }
            if self.signal_handler.should_reload() {
                self.handle_reload();
            }
            self.apply_toggle();

            self.tick();
            self.sleep_until_next_tick();
        }

        self.shutdown("signal");
        Ok(())
    }

    /// One monitoring round: check, log transitions, persist state.
    pub fn tick(&mut self) -> Arc<MonitorResult> {
        let result = self.monitor.check(&self.sources);
        self.ticks += 1;
        self.log_transitions(&result);
        self.persist_state(&result);
        result
    }

    /// Apply a pending SIGUSR1/SIGUSR2. Returns whether the status changed.
    pub fn apply_toggle(&mut self) -> bool {
        let Some(request) = self.signal_handler.take_toggle() else {
            return false;
        };
        let was_active = self.monitor.is_active();
        match request {
            ToggleRequest::Activate => self.monitor.activate(),
            ToggleRequest::Deactivate => self.monitor.deactivate(),
        }
        let status = self.monitor.status();
        if was_active == self.monitor.is_active() {
            return false;
        }
        eprintln!("[QGM-DAEMON] growth check {}", status.as_str());
        self.logger_handle.send(ActivityEvent::MonitorToggled {
            status: status.as_str().to_string(),
        });
        true
    }

    /// Re-read the config file and adopt what can change at runtime.
    ///
    /// The growth policy applies to every queue; window and smoothing apply to
    /// queues first seen after the reload. The active status is operator
    /// state and survives reloads.
    pub fn handle_reload(&mut self) {
        eprintln!("[QGM-DAEMON] config reload requested (SIGHUP)");
        let new_config = match Config::load(Some(&self.config.paths.config_file)) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("[QGM-DAEMON] config reload failed: {e}");
                self.logger_handle.send(ActivityEvent::Error {
                    code: e.code().to_string(),
                    message: format!("config reload failed: {e}"),
                });
                return;
            }
        };

        let old_hash = self.config.stable_hash().unwrap_or_default();
        let new_hash = new_config.stable_hash().unwrap_or_default();
        if old_hash == new_hash {
            eprintln!("[QGM-DAEMON] config unchanged, skipping reload");
            return;
        }

        if let Err(e) = self.monitor.reconfigure(new_config.monitor.clone()) {
            eprintln!("[QGM-DAEMON] rejected reloaded monitor settings: {e}");
            self.logger_handle.send(ActivityEvent::Error {
                code: e.code().to_string(),
                message: format!("rejected reloaded monitor settings: {e}"),
            });
            return;
        }
        if new_config.sources != self.config.sources {
            self.sources = sources_for(&new_config.sources.queues, &new_config.sources.spool_file);
        }

        let details = format!(
            "config_hash={new_hash} queues={} threshold={} scale={}",
            new_config.sources.queues.len(),
            new_config.monitor.growth_threshold,
            new_config.monitor.slope_scale
        );
        eprintln!("[QGM-DAEMON] config reloaded: {details}");
        self.logger_handle
            .send(ActivityEvent::ConfigReloaded { details });
        self.config = new_config;
    }

    fn log_transitions(&mut self, result: &MonitorResult) {
        if self.last_healthy != Some(result.healthy) {
            eprintln!("[QGM-DAEMON] health: {}", result.message);
            self.logger_handle.send(ActivityEvent::HealthChanged {
                healthy: result.healthy,
                message: result.message.clone(),
            });
            self.last_healthy = Some(result.healthy);
        }

        if result.active {
            let threshold = self.monitor.growth_policy().threshold;
            for (queue, detail) in &result.details {
                let growing = detail.slope_percent > threshold;
                let was_growing = self.growing.contains(queue);
                if growing && !was_growing {
                    self.growing.insert(queue.clone());
                    self.logger_handle.send(ActivityEvent::QueueGrowthDetected {
                        queue: queue.clone(),
                        slope_percent: detail.slope_percent,
                        last_raw: detail.last_raw,
                        last_smoothed: detail.last_smoothed,
                    });
                } else if !growing && was_growing {
                    self.growing.remove(queue);
                    self.logger_handle.send(ActivityEvent::QueueRecovered {
                        queue: queue.clone(),
                        slope_percent: detail.slope_percent,
                        last_raw: detail.last_raw,
                        last_smoothed: detail.last_smoothed,
                    });
                }
            }
        } else {
            self.growing.clear();
        }

        for (queue, reason) in &result.skipped {
            if self.last_skipped.get(queue) != Some(reason) {
                self.logger_handle.send(ActivityEvent::QueueSkipped {
                    queue: queue.clone(),
                    reason: reason.clone(),
                });
            }
        }
        self.last_skipped.clone_from(&result.skipped);
    }

    fn persist_state(&self, result: &MonitorResult) {
        let state = HealthState {
            version: env!("CARGO_PKG_VERSION").to_string(),
            pid: std::process::id(),
            started_at: self.started_at.to_rfc3339(),
            last_updated: chrono::Utc::now().to_rfc3339(),
            status: self.monitor.status(),
            ticks: self.ticks,
            dropped_log_events: self.logger_handle.dropped_events(),
            result: result.clone(),
        };
        if let Err(e) = write_state_atomic(&self.config.paths.state_file, &state) {
            eprintln!("[QGM-DAEMON] failed to write state file: {e}");
            self.logger_handle.send(ActivityEvent::Error {
                code: e.code().to_string(),
                message: e.to_string(),
            });
        }
    }

    /// Sleep one poll interval; only shutdown cuts it short. Toggles apply
    /// immediately but the next round still runs on the regular cadence.
    fn sleep_until_next_tick(&mut self) {
        let deadline =
            Instant::now() + Duration::from_millis(self.config.monitor.poll_interval_ms);
        loop {
            if self.signal_handler.should_shutdown() {
                return;
            }
            self.apply_toggle();
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep(SIGNAL_POLL_SLICE.min(deadline - now));
        }
    }

    fn shutdown(&mut self, reason: &str) {
        self.logger_handle.send(ActivityEvent::DaemonStopped {
            reason: reason.to_string(),
            uptime_secs: self.start_instant.elapsed().as_secs(),
        });
        if let Err(e) = clear_state(&self.config.paths.state_file) {
            eprintln!("[QGM-DAEMON] failed to remove state file: {e}");
        }
        self.logger_handle.shutdown();
        if let Some(join) = self.logger_join.take()
            && join.join().is_err()
        {
            eprintln!("[QGM-DAEMON] logger thread panicked during shutdown");
        }
        eprintln!("[QGM-DAEMON] stopped after {} tick(s)", self.ticks);
    }
}

impl Drop for MonitorDaemon {
    fn drop(&mut self) {
        if let Some(join) = self.logger_join.take() {
            self.logger_handle.shutdown();
            let _ = join.join();
        }
    }
}
