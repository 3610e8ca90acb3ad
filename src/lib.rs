#![forbid(unsafe_code)]

//! Queue Growth Monitor (qgm): health check that flags message queues whose
//! backlog keeps trending upward.
//!
//! Each queue's ready-entry count is exponentially smoothed, the smoothed
//! points feed a sliding-window least-squares regression, and a queue is
//! growing once the full window's scaled slope exceeds the threshold. The
//! [`monitor::growth::GrowthHealthMonitor`] aggregates every queue into one
//! healthy/unhealthy verdict and can be switched off at runtime.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use queue_growth_monitor::prelude::*;
//!
//! let monitor = GrowthHealthMonitor::new(MonitorConfig::default()).unwrap();
//! monitor.activate();
//! let orders = FixedSource::with_reading("orders", 1_000, 12);
//! let sources: Vec<Box<dyn BacklogSource>> = vec![Box::new(orders)];
//! let result = monitor.check(&sources);
//! println!("{}: {}", result.healthy, result.message);
//! ```

pub mod prelude;

pub mod core;
pub mod daemon;
pub mod logger;
pub mod monitor;
pub mod sources;
