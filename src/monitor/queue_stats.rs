//! Per-queue trend state: smoothing → sliding regression → growth verdict.

#![allow(missing_docs)]
#![allow(clippy::cast_precision_loss)]

use serde::{Deserialize, Serialize};

use crate::core::config::MonitorConfig;
use crate::core::errors::{QgmError, Result};
use crate::monitor::history::BoundedHistory;
use crate::monitor::regression::WindowRegressor;
use crate::monitor::smoothing::Smoother;

/// Growth threshold and the slope scale it is expressed in.
///
/// The regression slope is multiplied by `slope_scale` and rounded to two
/// decimals before being compared against `threshold`, so the two values only
/// have meaning together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthPolicy {
    pub threshold: f64,
    pub slope_scale: f64,
}

impl Default for GrowthPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            slope_scale: 100.0,
        }
    }
}

impl GrowthPolicy {
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(QgmError::invalid_config(format!(
                "monitor.growth_threshold must be finite and >= 0, got {}",
                self.threshold
            )));
        }
        if !self.slope_scale.is_finite() || self.slope_scale <= 0.0 {
            return Err(QgmError::invalid_config(format!(
                "monitor.slope_scale must be finite and > 0, got {}",
                self.slope_scale
            )));
        }
        Ok(())
    }

    /// Scale a raw slope for reporting: ×scale, rounded to 2 decimals, NaN → 0.
    #[must_use]
    pub fn scale(&self, raw_slope: f64) -> f64 {
        let scaled = (raw_slope * self.slope_scale * 100.0).round() / 100.0;
        if scaled.is_finite() { scaled } else { 0.0 }
    }
}

/// Immutable view of one queue, safe to hand to concurrent readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub queue_id: String,
    pub last_raw: i64,
    pub last_smoothed: f64,
    /// Regression slope in ready entries per millisecond of sample time,
    /// multiplied by `slope_scale` and rounded to 2 decimals.
    pub current_slope: f64,
}

/// Outcome of [`QueueStats::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Accepted,
    /// Timestamp went backwards; the sample was dropped.
    OutOfOrder { previous: i64, received: i64 },
}

/// Trend state for a single queue.
#[derive(Debug, Clone)]
pub struct QueueStats {
    queue_id: String,
    window_size: usize,
    policy: GrowthPolicy,
    smoother: Smoother,
    regressor: WindowRegressor,
    /// First timestamp ever seen; regression x values are offsets from it.
    origin: Option<i64>,
    timestamps: BoundedHistory<i64>,
    raw_sizes: BoundedHistory<i64>,
    smoothed_sizes: BoundedHistory<f64>,
    current_slope: f64,
    last_raw: i64,
    last_smoothed: f64,
}

impl QueueStats {
    pub fn new(
        queue_id: impl Into<String>,
        window_size: usize,
        smoother: Smoother,
        policy: GrowthPolicy,
    ) -> Result<Self> {
        policy.validate()?;
        let regressor = WindowRegressor::new(window_size).map_err(|_| {
            QgmError::invalid_config(format!(
                "monitor.window_size must be >= 2, got {window_size}"
            ))
        })?;
        Ok(Self {
            queue_id: queue_id.into(),
            window_size,
            policy,
            smoother,
            regressor,
            origin: None,
            timestamps: BoundedHistory::new(window_size),
            raw_sizes: BoundedHistory::new(window_size),
            smoothed_sizes: BoundedHistory::new(window_size),
            current_slope: 0.0,
            last_raw: 0,
            last_smoothed: 0.0,
        })
    }

    /// Build queue state from the `[monitor]` config section.
    pub fn from_config(queue_id: impl Into<String>, config: &MonitorConfig) -> Result<Self> {
        Self::new(
            queue_id,
            config.window_size,
            Smoother::from_config(&config.smoothing)?,
            config.growth_policy(),
        )
    }

    /// Feed one backlog observation taken at `timestamp_millis`.
    pub fn record(&mut self, timestamp_millis: i64, raw_size: i64) -> RecordOutcome {
        if let Some(&previous) = self.timestamps.latest()
            && timestamp_millis < previous
        {
            return RecordOutcome::OutOfOrder {
                previous,
                received: timestamp_millis,
            };
        }

        let smoothed = self.smoother.add_next_value(raw_size as f64);

        let origin = *self.origin.get_or_insert(timestamp_millis);
        let x = timestamp_millis.saturating_sub(origin) as f64;
        self.regressor.push(x, smoothed);

        self.timestamps.push(timestamp_millis);
        self.raw_sizes.push(raw_size);
        self.smoothed_sizes.push(smoothed);
        self.last_raw = raw_size;
        self.last_smoothed = smoothed;

        if self.regressor.len() >= self.window_size {
            self.current_slope = self.policy.scale(self.regressor.slope());
        }
        RecordOutcome::Accepted
    }

    #[must_use]
    pub fn is_growing(&self) -> bool {
        self.current_slope > self.policy.threshold
    }

    #[must_use]
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            queue_id: self.queue_id.clone(),
            last_raw: self.last_raw,
            last_smoothed: self.last_smoothed,
            current_slope: self.current_slope,
        }
    }

    /// Swap the threshold/scale pair; the slope is rescaled on the next record.
    pub fn set_policy(&mut self, policy: GrowthPolicy) {
        self.policy = policy;
    }

    #[must_use]
    pub fn policy(&self) -> GrowthPolicy {
        self.policy
    }

    #[must_use]
    pub fn queue_id(&self) -> &str {
        &self.queue_id
    }

    #[must_use]
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    #[must_use]
    pub fn current_slope(&self) -> f64 {
        self.current_slope
    }

    /// Samples recorded, capped at the window size.
    #[must_use]
    pub fn points_in_window(&self) -> usize {
        self.regressor.len()
    }

    /// One-step forecast error of the smoother on the latest sample.
    #[must_use]
    pub fn deviation(&self) -> f64 {
        self.smoother.deviation()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = &i64> + '_ {
        self.timestamps.iter()
    }

    pub fn raw_sizes(&self) -> impl Iterator<Item = &i64> + '_ {
        self.raw_sizes.iter()
    }

    pub fn smoothed_sizes(&self) -> impl Iterator<Item = &f64> + '_ {
        self.smoothed_sizes.iter()
    }
}
