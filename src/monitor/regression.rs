//! Sliding-window ordinary-least-squares slope, maintained incrementally.
//!
//! The window keeps running sums `{n, Σx, Σy, Σxy, Σx²}`. Each push adds the
//! new pair and, once the window is full, subtracts the pair it displaces, so
//! an update is O(1) regardless of window size.

#![allow(missing_docs)]
#![allow(clippy::cast_precision_loss)]

use serde::Serialize;

use crate::core::errors::{QgmError, Result};
use crate::monitor::history::BoundedHistory;

/// Sufficient statistics for a least-squares line over the current window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RegressionAccumulator {
    pub n: u64,
    pub sum_x: f64,
    pub sum_y: f64,
    pub sum_xy: f64,
    pub sum_xx: f64,
}

impl RegressionAccumulator {
    pub fn add(&mut self, x: f64, y: f64) {
        self.n += 1;
        self.sum_x += x;
        self.sum_y += y;
        self.sum_xy += x * y;
        self.sum_xx += x * x;
    }

    /// Remove a pair previously passed to [`add`](Self::add).
    pub fn remove(&mut self, x: f64, y: f64) {
        if self.n == 0 {
            return;
        }
        self.n -= 1;
        if self.n == 0 {
            // Drop accumulated rounding residue along with the last point.
            *self = Self::default();
            return;
        }
        self.sum_x -= x;
        self.sum_y -= y;
        self.sum_xy -= x * y;
        self.sum_xx -= x * x;
    }

    /// Least-squares slope; 0 for fewer than two points or a degenerate x spread.
    #[must_use]
    pub fn slope(&self) -> f64 {
        if self.n < 2 {
            return 0.0;
        }
        let n = self.n as f64;
        let denominator = n.mul_add(self.sum_xx, -(self.sum_x * self.sum_x));
        if denominator == 0.0 || !denominator.is_finite() {
            return 0.0;
        }
        n.mul_add(self.sum_xy, -(self.sum_x * self.sum_y)) / denominator
    }

    /// Least-squares intercept at x = 0 (mean of y when the slope is degenerate).
    #[must_use]
    pub fn intercept(&self) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        let n = self.n as f64;
        self.slope().mul_add(-self.sum_x, self.sum_y) / n
    }
}

/// Bounded sliding window over `(x, y)` pairs with an O(1) slope.
#[derive(Debug, Clone)]
pub struct WindowRegressor {
    acc: RegressionAccumulator,
    pairs: BoundedHistory<(f64, f64)>,
}

impl WindowRegressor {
    /// Create a regressor holding at most `capacity` points (must be ≥ 2).
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity < 2 {
            return Err(QgmError::invalid_config(format!(
                "regression window must hold >= 2 points, got {capacity}"
            )));
        }
        Ok(Self {
            acc: RegressionAccumulator::default(),
            pairs: BoundedHistory::new(capacity),
        })
    }

    /// Add a point, evicting the oldest one first when the window is full.
    pub fn push(&mut self, x: f64, y: f64) {
        if let Some((old_x, old_y)) = self.pairs.push((x, y)) {
            self.acc.remove(old_x, old_y);
        }
        self.acc.add(x, y);
    }

    #[must_use]
    pub fn slope(&self) -> f64 {
        self.acc.slope()
    }

    #[must_use]
    pub fn intercept(&self) -> f64 {
        self.acc.intercept()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.pairs.capacity()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.pairs.is_full()
    }

    #[must_use]
    pub fn accumulator(&self) -> &RegressionAccumulator {
        &self.acc
    }

    /// Oldest pair still inside the window.
    #[must_use]
    pub fn oldest(&self) -> Option<(f64, f64)> {
        self.pairs.oldest().copied()
    }
}
