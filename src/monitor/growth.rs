//! Queue-growth health check: one [`QueueStats`] per queue, evaluated once per
//! polling tick and aggregated into a single [`MonitorResult`].
//!
//! Health rule: `healthy = !active || no recorded queue is growing`. The
//! monitor starts DEACTIVATED unless the config opts in, so a freshly started
//! node reports healthy until someone activates the check.
//!
//! Concurrency: ticks serialize on the per-queue state mutex. Each finished
//! round is published as an `Arc<MonitorResult>`; readers clone the `Arc` and
//! never see a partially updated queue.

#![allow(missing_docs)]

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::core::config::MonitorConfig;
use crate::core::errors::Result;
use crate::monitor::queue_stats::{GrowthPolicy, QueueSnapshot, QueueStats, RecordOutcome};
use crate::sources::{BacklogSource, SourceError};

/// Per-queue entry in [`MonitorResult::details`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueDetail {
    pub last_raw: i64,
    pub last_smoothed: f64,
    /// Scaled slope (entries per ms × `slope_scale`), the value compared
    /// against the growth threshold.
    pub slope_percent: f64,
}

impl From<&QueueSnapshot> for QueueDetail {
    fn from(snapshot: &QueueSnapshot) -> Self {
        Self {
            last_raw: snapshot.last_raw,
            last_smoothed: snapshot.last_smoothed,
            slope_percent: snapshot.current_slope,
        }
    }
}

/// Outcome of one health round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorResult {
    pub healthy: bool,
    pub message: String,
    pub details: BTreeMap<String, QueueDetail>,
    /// Whether the growth check was active for this round.
    #[serde(default)]
    pub active: bool,
    /// Queues whose source failed this round, with the reason.
    #[serde(default)]
    pub skipped: BTreeMap<String, String>,
}

impl MonitorResult {
    /// Result published before the first round has run.
    #[must_use]
    pub fn pending(active: bool) -> Self {
        Self {
            healthy: true,
            message: "no check has run yet".to_string(),
            details: BTreeMap::new(),
            active,
            skipped: BTreeMap::new(),
        }
    }

    /// Queue ids whose reported slope is above `threshold`, in id order.
    #[must_use]
    pub fn growing_queues(&self, threshold: f64) -> Vec<&str> {
        self.details
            .iter()
            .filter(|(_, d)| d.slope_percent > threshold)
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

/// Two-state switch for the growth check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStatus {
    Active,
    Deactivated,
}

impl MonitorStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deactivated => "deactivated",
        }
    }
}

/// State guarded by the monitor's single lock.
struct MonitorState {
    config: MonitorConfig,
    queues: HashMap<String, QueueStats>,
}

/// Aggregating queue-growth health monitor.
pub struct GrowthHealthMonitor {
    active: AtomicBool,
    state: Mutex<MonitorState>,
    latest: RwLock<Arc<MonitorResult>>,
}

impl GrowthHealthMonitor {
    /// Build a monitor; fails on invalid window, smoothing or growth settings.
    pub fn new(config: MonitorConfig) -> Result<Self> {
        // Probe construction once so bad parameters fail at startup, not on
        // the first observed queue.
        QueueStats::from_config("config-check", &config)?;
        let active = config.start_active;
        Ok(Self {
            active: AtomicBool::new(active),
            state: Mutex::new(MonitorState {
                config,
                queues: HashMap::new(),
            }),
            latest: RwLock::new(Arc::new(MonitorResult::pending(active))),
        })
    }

    pub fn activate(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn status(&self) -> MonitorStatus {
        if self.active.load(Ordering::SeqCst) {
            MonitorStatus::Active
        } else {
            MonitorStatus::Deactivated
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status() == MonitorStatus::Active
    }

    /// Run one round over `sources` and publish the result.
    ///
    /// The active flag is read once up front; a toggle during the round
    /// applies to the next one.
    pub fn check(&self, sources: &[Box<dyn BacklogSource>]) -> Arc<MonitorResult> {
        let active = self.active.load(Ordering::SeqCst);
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let mut recorded: Vec<(QueueSnapshot, bool)> = Vec::with_capacity(sources.len());
        let mut skipped = BTreeMap::new();

        for source in sources {
            let queue_id = source.queue_id();
            let sample = match source.sample() {
                Ok(sample) => sample,
                Err(err) => {
                    skipped.insert(queue_id.to_string(), skip_reason(&err));
                    continue;
                }
            };

            if !state.queues.contains_key(queue_id) {
                match QueueStats::from_config(queue_id, &state.config) {
                    Ok(stats) => {
                        state.queues.insert(queue_id.to_string(), stats);
                    }
                    Err(err) => {
                        skipped.insert(queue_id.to_string(), err.to_string());
                        continue;
                    }
                }
            }
            let Some(stats) = state.queues.get_mut(queue_id) else {
                continue;
            };

            match stats.record(sample.timestamp_millis, sample.ready_entries) {
                RecordOutcome::Accepted => {
                    recorded.push((stats.snapshot(), stats.is_growing()));
                }
                RecordOutcome::OutOfOrder { previous, received } => {
                    skipped.insert(
                        queue_id.to_string(),
                        format!("timestamp {received} precedes previous sample {previous}"),
                    );
                }
            }
        }

        let result = Arc::new(aggregate(active, &recorded, skipped));
        // Publish before releasing the state lock so results land in tick order.
        *self.latest.write() = Arc::clone(&result);
        drop(guard);
        result
    }

    /// `check` reduced to its verdict.
    pub fn is_healthy(&self, sources: &[Box<dyn BacklogSource>]) -> bool {
        self.check(sources).healthy
    }

    /// Most recently published result.
    #[must_use]
    pub fn latest(&self) -> Arc<MonitorResult> {
        Arc::clone(&self.latest.read())
    }

    /// Current snapshot of one tracked queue.
    #[must_use]
    pub fn snapshot(&self, queue_id: &str) -> Option<QueueSnapshot> {
        self.state.lock().queues.get(queue_id).map(QueueStats::snapshot)
    }

    /// Ids of every queue observed since startup, sorted.
    #[must_use]
    pub fn tracked_queues(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.lock().queues.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Replace the threshold/scale pair for current and future queues.
    pub fn set_growth_policy(&self, policy: GrowthPolicy) -> Result<()> {
        policy.validate()?;
        let mut state = self.state.lock();
        state.config.growth_threshold = policy.threshold;
        state.config.slope_scale = policy.slope_scale;
        for stats in state.queues.values_mut() {
            stats.set_policy(policy);
        }
        Ok(())
    }

    /// Adopt a reloaded `[monitor]` section.
    ///
    /// The growth policy applies to every queue immediately. Window and
    /// smoothing changes only affect queues first observed after the reload;
    /// existing queues keep their accumulated trend state.
    pub fn reconfigure(&self, config: MonitorConfig) -> Result<()> {
        QueueStats::from_config("config-check", &config)?;
        let policy = config.growth_policy();
        let mut state = self.state.lock();
        for stats in state.queues.values_mut() {
            stats.set_policy(policy);
        }
        state.config = config;
        Ok(())
    }

    #[must_use]
    pub fn growth_policy(&self) -> GrowthPolicy {
        self.state.lock().config.growth_policy()
    }

    /// Copy of the effective `[monitor]` settings.
    #[must_use]
    pub fn config(&self) -> MonitorConfig {
        self.state.lock().config.clone()
    }
}

fn skip_reason(err: &SourceError) -> String {
    match err {
        SourceError::Unsupported { .. } => "unsupported".to_string(),
        SourceError::Unavailable { details, .. } => format!("unavailable: {details}"),
    }
}

fn aggregate(
    active: bool,
    recorded: &[(QueueSnapshot, bool)],
    skipped: BTreeMap<String, String>,
) -> MonitorResult {
    let mut growing: Vec<&QueueSnapshot> = recorded
        .iter()
        .filter(|(_, is_growing)| *is_growing)
        .map(|(snapshot, _)| snapshot)
        .collect();
    growing.sort_by(|a, b| a.queue_id.cmp(&b.queue_id));

    let healthy = !active || growing.is_empty();
    let message = if !active {
        "queue growth check deactivated".to_string()
    } else if growing.is_empty() {
        "no queue growth detected".to_string()
    } else {
        let mut msg = String::from("growing queues: ");
        for (i, snapshot) in growing.iter().enumerate() {
            if i > 0 {
                msg.push_str(", ");
            }
            let _ = write!(
                msg,
                "{} (slope {:.2})",
                snapshot.queue_id, snapshot.current_slope
            );
        }
        msg
    };

    let details = recorded
        .iter()
        .map(|(snapshot, _)| (snapshot.queue_id.clone(), QueueDetail::from(snapshot)))
        .collect();

    MonitorResult {
        healthy,
        message,
        details,
        active,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::{GrowthHealthMonitor, MonitorStatus};
    use crate::core::config::MonitorConfig;
    use crate::monitor::queue_stats::GrowthPolicy;
    use crate::sources::{BacklogSample, BacklogSource, FixedSource, SourceError};
    use std::sync::Arc;
    use std::thread;

    fn config(window: usize, alpha: f64, start_active: bool) -> MonitorConfig {
        let mut cfg = MonitorConfig {
            window_size: window,
            start_active,
            ..MonitorConfig::default()
        };
        cfg.smoothing.alpha = alpha;
        cfg
    }

    fn boxed(sources: &[&FixedSource]) -> Vec<Box<dyn BacklogSource>> {
        sources
            .iter()
            .map(|s| Box::new((*s).clone()) as Box<dyn BacklogSource>)
            .collect()
    }

    /// Drive `ticks` rounds where `growing` climbs by 10 per tick and `flat` stays put.
    fn drive(monitor: &GrowthHealthMonitor, growing: &FixedSource, flat: &FixedSource, ticks: i64) {
        let sources = boxed(&[growing, flat]);
        for t in 0..ticks {
            growing.set(t, 10 * t);
            flat.set(t, 5);
            monitor.check(&sources);
        }
    }

    struct Unavailable;

    impl BacklogSource for Unavailable {
        fn queue_id(&self) -> &str {
            "broken"
        }

        fn sample(&self) -> Result<BacklogSample, SourceError> {
            Err(SourceError::Unavailable {
                queue_id: "broken".to_string(),
                details: "connection refused".to_string(),
            })
        }
    }

    #[test]
    fn starts_deactivated_by_default() {
        let monitor = GrowthHealthMonitor::new(MonitorConfig::default()).unwrap();
        assert_eq!(monitor.status(), MonitorStatus::Deactivated);
        assert!(monitor.latest().healthy);
    }

    #[test]
    fn invalid_config_fails_at_construction() {
        let mut cfg = MonitorConfig::default();
        cfg.window_size = 1;
        assert!(GrowthHealthMonitor::new(cfg).is_err());

        let mut cfg = MonitorConfig::default();
        cfg.smoothing.alpha = 3.0;
        assert!(GrowthHealthMonitor::new(cfg).is_err());
    }

    #[test]
    fn growing_queue_makes_active_monitor_unhealthy() {
        let monitor = GrowthHealthMonitor::new(config(3, 1.0, true)).unwrap();
        let orders = FixedSource::new("orders");
        let billing = FixedSource::new("billing");
        drive(&monitor, &orders, &billing, 4);

        let result = monitor.latest();
        assert!(!result.healthy);
        assert!(result.message.contains("orders (slope 1000.00)"), "{}", result.message);
        assert!(!result.message.contains("billing"));
        assert_eq!(result.details.len(), 2);
        assert_eq!(result.details["billing"].last_raw, 5);
        assert!((result.details["orders"].slope_percent - 1000.0).abs() < 1e-6);
        assert_eq!(result.growing_queues(0.1), vec!["orders"]);
    }

    #[test]
    fn message_lists_every_growing_queue() {
        let monitor = GrowthHealthMonitor::new(config(2, 1.0, true)).unwrap();
        let a = FixedSource::new("a");
        let b = FixedSource::new("b");
        let sources = boxed(&[&b, &a]);
        for t in 0..3 {
            a.set(t, t);
            b.set(t, 2 * t);
            monitor.check(&sources);
        }
        let result = monitor.latest();
        assert_eq!(
            result.message,
            "growing queues: a (slope 100.00), b (slope 200.00)"
        );
    }

    #[test]
    fn unsupported_queue_is_skipped_without_affecting_others() {
        let monitor = GrowthHealthMonitor::new(config(3, 0.3, true)).unwrap();
        let a = FixedSource::new("A");
        let b = FixedSource::new("B");
        let c = FixedSource::new("C");
        let sources = boxed(&[&a, &b, &c]);
        for t in 0..5 {
            a.set(t, 10);
            c.set(t, 20);
            monitor.check(&sources);
        }
        let result = monitor.latest();
        assert!(result.healthy);
        assert_eq!(
            result.details.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["A", "C"]
        );
        assert_eq!(result.skipped.get("B").map(String::as_str), Some("unsupported"));
    }

    #[test]
    fn unavailable_source_is_skipped_with_reason() {
        let monitor = GrowthHealthMonitor::new(config(3, 0.3, true)).unwrap();
        let a = FixedSource::with_reading("A", 0, 1);
        let sources: Vec<Box<dyn BacklogSource>> = vec![Box::new(a), Box::new(Unavailable)];
        let result = monitor.check(&sources);
        assert!(result.healthy);
        assert!(result.skipped["broken"].contains("connection refused"));
        assert_eq!(monitor.tracked_queues(), vec!["A"]);
    }

    #[test]
    fn toggle_applies_on_next_check() {
        let monitor = GrowthHealthMonitor::new(config(3, 1.0, true)).unwrap();
        let orders = FixedSource::new("orders");
        let flat = FixedSource::new("flat");
        drive(&monitor, &orders, &flat, 4);
        assert!(!monitor.latest().healthy);

        let sources = boxed(&[&orders, &flat]);
        monitor.deactivate();
        orders.set(4, 40);
        flat.set(4, 5);
        let result = monitor.check(&sources);
        assert!(result.healthy);
        assert!(!result.active);
        assert_eq!(result.message, "queue growth check deactivated");
        // Details are reported regardless of the toggle.
        assert!(result.details["orders"].slope_percent > 0.1);

        monitor.activate();
        orders.set(5, 50);
        flat.set(5, 5);
        assert!(!monitor.is_healthy(&sources));
    }

    #[test]
    fn queues_are_created_lazily_and_kept() {
        let monitor = GrowthHealthMonitor::new(config(3, 0.3, true)).unwrap();
        assert!(monitor.tracked_queues().is_empty());
        let a = FixedSource::with_reading("a", 0, 3);
        let sources = boxed(&[&a]);
        monitor.check(&sources);
        assert_eq!(monitor.tracked_queues(), vec!["a"]);

        a.clear();
        let result = monitor.check(&sources);
        assert!(result.details.is_empty());
        assert_eq!(monitor.tracked_queues(), vec!["a"]);
        assert_eq!(monitor.snapshot("a").unwrap().last_raw, 3);
    }

    #[test]
    fn out_of_order_reading_is_skipped() {
        let monitor = GrowthHealthMonitor::new(config(3, 0.3, true)).unwrap();
        let a = FixedSource::with_reading("a", 100, 3);
        let sources = boxed(&[&a]);
        monitor.check(&sources);
        a.set(50, 9);
        let result = monitor.check(&sources);
        assert!(result.details.is_empty());
        assert!(result.skipped["a"].contains("precedes"));
    }

    #[test]
    fn growth_policy_can_be_raised_at_runtime() {
        let monitor = GrowthHealthMonitor::new(config(3, 1.0, true)).unwrap();
        let orders = FixedSource::new("orders");
        let flat = FixedSource::new("flat");
        drive(&monitor, &orders, &flat, 4);
        assert!(!monitor.latest().healthy);

        monitor
            .set_growth_policy(GrowthPolicy {
                threshold: 5_000.0,
                slope_scale: 100.0,
            })
            .unwrap();
        let sources = boxed(&[&orders, &flat]);
        orders.set(4, 40);
        flat.set(4, 5);
        assert!(monitor.check(&sources).healthy);
        assert!((monitor.growth_policy().threshold - 5_000.0).abs() < f64::EPSILON);

        assert!(
            monitor
                .set_growth_policy(GrowthPolicy {
                    threshold: f64::NAN,
                    slope_scale: 100.0,
                })
                .is_err()
        );
    }

    #[test]
    fn reconfigure_keeps_existing_window() {
        let monitor = GrowthHealthMonitor::new(config(3, 1.0, true)).unwrap();
        let a = FixedSource::with_reading("a", 0, 1);
        monitor.check(&boxed(&[&a]));
        monitor.reconfigure(config(10, 0.5, true)).unwrap();
        assert_eq!(monitor.config().window_size, 10);

        // "a" still uses its original 3-point window.
        let sources = boxed(&[&a]);
        for t in 1..3 {
            a.set(t, t + 1);
            monitor.check(&sources);
        }
        assert!(monitor.latest().details["a"].slope_percent > 0.0);
    }

    #[test]
    fn concurrent_readers_see_complete_results() {
        let monitor = Arc::new(GrowthHealthMonitor::new(config(3, 1.0, true)).unwrap());
        let writer = {
            let monitor = Arc::clone(&monitor);
            thread::spawn(move || {
                let a = FixedSource::new("a");
                let sources = boxed(&[&a]);
                for t in 0..500 {
                    a.set(t, t);
                    monitor.check(&sources);
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let monitor = Arc::clone(&monitor);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let result = monitor.latest();
                        if let Some(detail) = result.details.get("a") {
                            // alpha = 1: smoothed always equals raw within one result.
                            #[allow(clippy::cast_precision_loss)]
                            let raw = detail.last_raw as f64;
                            assert!((detail.last_smoothed - raw).abs() < 1e-9);
                        }
                    }
                })
            })
            .collect();
        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(monitor.latest().details["a"].last_raw, 499);
    }
}
