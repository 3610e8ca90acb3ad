//! Property-based tests for the trend pipeline.

use proptest::prelude::*;

use crate::core::config::MonitorConfig;
use crate::monitor::growth::GrowthHealthMonitor;
use crate::monitor::history::BoundedHistory;
use crate::monitor::queue_stats::{GrowthPolicy, QueueStats};
use crate::monitor::regression::{RegressionAccumulator, WindowRegressor};
use crate::monitor::smoothing::Smoother;
use crate::sources::{BacklogSource, FixedSource};

fn close(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol * a.abs().max(b.abs()).max(1.0)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// A linear series yields its own slope once the window has rolled over.
    /// Integer inputs keep every running sum exact.
    #[test]
    fn linear_series_recovers_slope(
        k in -500i32..500,
        b in -10_000i32..10_000,
        window in 2u32..40,
        extra in 0u32..40,
        x0 in 0u32..10_000,
    ) {
        let mut regressor = WindowRegressor::new(window as usize).unwrap();
        for i in 0..(window + extra) {
            let x = f64::from(x0 + i);
            regressor.push(x, f64::from(k).mul_add(x, f64::from(b)));
        }
        prop_assert!(regressor.is_full());
        prop_assert!(
            close(regressor.slope(), f64::from(k), 1e-9),
            "slope {} vs {k}",
            regressor.slope()
        );
    }

    /// Removing a point that was just added restores the previous slope.
    #[test]
    fn add_then_remove_restores_slope(
        points in prop::collection::vec((-1_000i32..1_000, -1_000i32..1_000), 2..30),
        extra in (-1_000i32..1_000, -1_000i32..1_000),
    ) {
        let mut acc = RegressionAccumulator::default();
        for (x, y) in &points {
            acc.add(f64::from(*x), f64::from(*y));
        }
        let before = acc.slope();
        acc.add(f64::from(extra.0), f64::from(extra.1));
        acc.remove(f64::from(extra.0), f64::from(extra.1));
        prop_assert!(close(acc.slope(), before, 1e-9));
    }

    /// Evicting a pair and inserting the identical pair leaves the slope unchanged.
    #[test]
    fn evict_and_reinsert_is_neutral(
        points in prop::collection::vec((0i32..1_000, -1_000i32..1_000), 3..30),
    ) {
        let mut acc = RegressionAccumulator::default();
        for (x, y) in &points {
            acc.add(f64::from(*x), f64::from(*y));
        }
        let before = acc.slope();
        let (x, y) = (f64::from(points[0].0), f64::from(points[0].1));
        acc.remove(x, y);
        acc.add(x, y);
        prop_assert!(close(acc.slope(), before, 1e-9));
    }

    /// No queue reports growth before its window has filled.
    #[test]
    fn not_growing_before_window_full(
        window in 2usize..30,
        sizes in prop::collection::vec(0i64..1_000_000, 0..30),
    ) {
        let mut stats = QueueStats::new(
            "q",
            window,
            Smoother::simple(1.0).unwrap(),
            GrowthPolicy::default(),
        )
        .unwrap();
        for (ts, size) in sizes.iter().take(window - 1).enumerate() {
            stats.record(ts as i64, *size);
            prop_assert!(!stats.is_growing());
            prop_assert!(stats.current_slope().abs() < f64::EPSILON);
        }
    }

    /// Simple smoothing never leaves the range of what it has seen.
    #[test]
    fn simple_level_stays_in_input_range(
        alpha in 0.0f64..=1.0,
        values in prop::collection::vec(-1.0e6f64..1.0e6, 1..50),
    ) {
        let mut smoother = Smoother::simple(alpha).unwrap();
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for v in values {
            lo = lo.min(v);
            hi = hi.max(v);
            let level = smoother.add_next_value(v);
            prop_assert!(level >= lo - 1e-6 && level <= hi + 1e-6);
        }
    }

    /// The ring buffer always holds the most recent `capacity` pushes in order.
    #[test]
    fn history_keeps_latest_window(
        capacity in 1usize..20,
        values in prop::collection::vec(any::<i32>(), 0..60),
    ) {
        let mut history = BoundedHistory::new(capacity);
        for v in &values {
            history.push(*v);
        }
        let start = values.len().saturating_sub(capacity);
        prop_assert_eq!(history.to_vec(), values[start..].to_vec());
    }

    /// A deactivated monitor is healthy whatever the queues do.
    #[test]
    fn deactivated_monitor_is_always_healthy(
        sizes in prop::collection::vec(0i64..1_000_000, 1..20),
    ) {
        let config = MonitorConfig {
            window_size: 2,
            ..MonitorConfig::default()
        };
        let monitor = GrowthHealthMonitor::new(config).unwrap();
        monitor.deactivate();
        let source = FixedSource::new("q");
        let sources: Vec<Box<dyn BacklogSource>> = vec![Box::new(source.clone())];
        for (ts, size) in sizes.iter().enumerate() {
            source.set(ts as i64, *size);
            prop_assert!(monitor.check(&sources).healthy);
        }
    }
}
