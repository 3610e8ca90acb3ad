//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use queue_growth_monitor::prelude::*;
//! ```

// Core
pub use crate::core::config::{Config, MonitorConfig, SmoothingConfig};
pub use crate::core::errors::{QgmError, Result};

// Monitor
pub use crate::monitor::growth::{GrowthHealthMonitor, MonitorResult, MonitorStatus, QueueDetail};
pub use crate::monitor::history::BoundedHistory;
pub use crate::monitor::queue_stats::{GrowthPolicy, QueueSnapshot, QueueStats, RecordOutcome};
pub use crate::monitor::regression::WindowRegressor;
pub use crate::monitor::smoothing::{Smoother, SmoothingMode};

// Sources
pub use crate::sources::spool::SpoolFileSource;
pub use crate::sources::{BacklogSample, BacklogSource, FixedSource, SourceError};

// Daemon
#[cfg(feature = "daemon")]
pub use crate::daemon::loop_main::MonitorDaemon;
pub use crate::daemon::state::HealthState;
