//! Streaming exponential smoothing: simple, double (Holt) and triple
//! (Holt-Winters) order.
//!
//! ```text
//! simple:  L_t = α·x_t + (1-α)·L_{t-1}
//! double:  L_t = α·x_t + (1-α)·(L_{t-1} + T_{t-1})
//!          T_t = β·(L_t - L_{t-1}) + (1-β)·T_{t-1}
//! triple:  L_t = α·(x_t - S_0) + (1-α)·(L_{t-1} + T_{t-1})
//!          T_t = β·(L_t - L_{t-1}) + (1-β)·T_{t-1}
//!          S'  = γ·(x_t - L_t) + (1-γ)·S_0      (window shifts left, S' appended)
//! ```
//!
//! The smoothing order is fixed at construction; each [`SmoothingModel`]
//! variant carries only the state its order needs.

#![allow(missing_docs)]
#![allow(clippy::cast_precision_loss)]

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::core::config::SmoothingConfig;
use crate::core::errors::{QgmError, Result};

/// Smoothing order selector, used by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmoothingMode {
    #[default]
    Simple,
    Double,
    Triple,
}

impl std::fmt::Display for SmoothingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple => f.write_str("simple"),
            Self::Double => f.write_str("double"),
            Self::Triple => f.write_str("triple"),
        }
    }
}

impl std::str::FromStr for SmoothingMode {
    type Err = QgmError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "double" => Ok(Self::Double),
            "triple" => Ok(Self::Triple),
            other => Err(QgmError::invalid_config(format!(
                "unknown smoothing mode {other:?} (expected simple, double or triple)"
            ))),
        }
    }
}

/// Per-order smoothing state.
#[derive(Debug, Clone, PartialEq)]
pub enum SmoothingModel {
    Simple {
        alpha: f64,
        baseline: f64,
    },
    Double {
        alpha: f64,
        beta: f64,
        baseline: f64,
        slope: f64,
    },
    Triple {
        alpha: f64,
        beta: f64,
        gamma: f64,
        period: usize,
        baseline: f64,
        slope: f64,
        /// Oldest seasonal component at the front.
        seasonal: VecDeque<f64>,
    },
}

/// Streaming smoother producing a denoised level and one-step forecasts.
#[derive(Debug, Clone)]
pub struct Smoother {
    model: SmoothingModel,
    samples: u64,
    latest: f64,
    last_forecast: f64,
}

impl Smoother {
    pub fn simple(alpha: f64) -> Result<Self> {
        validate_damping("alpha", alpha)?;
        Ok(Self::from_model(SmoothingModel::Simple {
            alpha,
            baseline: 0.0,
        }))
    }

    pub fn double(alpha: f64, beta: f64) -> Result<Self> {
        validate_damping("alpha", alpha)?;
        validate_damping("beta", beta)?;
        Ok(Self::from_model(SmoothingModel::Double {
            alpha,
            beta,
            baseline: 0.0,
            slope: 0.0,
        }))
    }

    pub fn triple(alpha: f64, beta: f64, gamma: f64, period: usize) -> Result<Self> {
        validate_damping("alpha", alpha)?;
        validate_damping("beta", beta)?;
        validate_damping("gamma", gamma)?;
        if period == 0 {
            return Err(QgmError::invalid_config(
                "triple smoothing period must be >= 1",
            ));
        }
        Ok(Self::from_model(SmoothingModel::Triple {
            alpha,
            beta,
            gamma,
            period,
            baseline: 0.0,
            slope: 0.0,
            seasonal: VecDeque::with_capacity(period),
        }))
    }

    /// Build the smoother described by a `[monitor.smoothing]` section.
    pub fn from_config(config: &SmoothingConfig) -> Result<Self> {
        match config.mode {
            SmoothingMode::Simple => Self::simple(config.alpha),
            SmoothingMode::Double => Self::double(config.alpha, config.beta),
            SmoothingMode::Triple => {
                Self::triple(config.alpha, config.beta, config.gamma, config.period)
            }
        }
    }

    fn from_model(model: SmoothingModel) -> Self {
        Self {
            model,
            samples: 0,
            latest: 0.0,
            last_forecast: 0.0,
        }
    }

    /// Feed one raw observation and return the updated smoothed level.
    pub fn add_next_value(&mut self, value: f64) -> f64 {
        self.last_forecast = self.forecast(1);
        let seen = self.samples;

        match &mut self.model {
            SmoothingModel::Simple { alpha, baseline } => {
                *baseline = if seen == 0 {
                    value
                } else {
                    alpha.mul_add(value, (1.0 - *alpha) * *baseline)
                };
            }
            SmoothingModel::Double {
                alpha,
                beta,
                baseline,
                slope,
            } => holt_step(*alpha, *beta, baseline, slope, seen, value),
            SmoothingModel::Triple {
                alpha,
                beta,
                gamma,
                period,
                baseline,
                slope,
                seasonal,
            } => {
                if seasonal.len() < *period {
                    seasonal.push_back(value);
                    holt_step(*alpha, *beta, baseline, slope, seen, value);
                } else {
                    let oldest = seasonal.pop_front().unwrap_or(0.0);
                    let next_baseline =
                        alpha.mul_add(value - oldest, (1.0 - *alpha) * (*baseline + *slope));
                    *slope = beta.mul_add(next_baseline - *baseline, (1.0 - *beta) * *slope);
                    *baseline = next_baseline;
                    seasonal.push_back(gamma.mul_add(value - next_baseline, (1.0 - *gamma) * oldest));
                }
            }
        }

        self.samples = self.samples.saturating_add(1);
        self.latest = value;
        self.level()
    }

    /// Forecast `horizon` steps ahead of the latest observation.
    #[must_use]
    pub fn forecast(&self, horizon: u32) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        let h = f64::from(horizon);
        match &self.model {
            SmoothingModel::Simple { baseline, .. } => *baseline,
            SmoothingModel::Double {
                baseline, slope, ..
            } => h.mul_add(*slope, *baseline),
            SmoothingModel::Triple {
                period,
                baseline,
                slope,
                seasonal,
                ..
            } => {
                let steps = horizon.saturating_sub(1) as usize;
                let idx = (period - 1 + steps % period) % period;
                h.mul_add(*slope, *baseline) + seasonal.get(idx).copied().unwrap_or(0.0)
            }
        }
    }

    /// Absolute error of the one-step forecast made before the latest sample.
    #[must_use]
    pub fn deviation(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        (self.latest - self.last_forecast).abs()
    }

    /// Current smoothed level (baseline).
    #[must_use]
    pub fn level(&self) -> f64 {
        match &self.model {
            SmoothingModel::Simple { baseline, .. }
            | SmoothingModel::Double { baseline, .. }
            | SmoothingModel::Triple { baseline, .. } => *baseline,
        }
    }

    /// Current trend component (always 0 for simple smoothing).
    #[must_use]
    pub fn slope(&self) -> f64 {
        match &self.model {
            SmoothingModel::Simple { .. } => 0.0,
            SmoothingModel::Double { slope, .. } | SmoothingModel::Triple { slope, .. } => *slope,
        }
    }

    #[must_use]
    pub fn mode(&self) -> SmoothingMode {
        match self.model {
            SmoothingModel::Simple { .. } => SmoothingMode::Simple,
            SmoothingModel::Double { .. } => SmoothingMode::Double,
            SmoothingModel::Triple { .. } => SmoothingMode::Triple,
        }
    }

    #[must_use]
    pub fn model(&self) -> &SmoothingModel {
        &self.model
    }

    #[must_use]
    pub fn sample_count(&self) -> u64 {
        self.samples
    }

    #[must_use]
    pub fn last_forecast(&self) -> f64 {
        self.last_forecast
    }
}

/// Level/trend update shared by double smoothing and the warm-up phase of triple.
fn holt_step(alpha: f64, beta: f64, baseline: &mut f64, slope: &mut f64, seen: u64, value: f64) {
    match seen {
        0 => *baseline = value,
        1 => {
            *slope = value - *baseline;
            *baseline = value;
        }
        _ => {
            let next_baseline = alpha.mul_add(value, (1.0 - alpha) * (*baseline + *slope));
            *slope = beta.mul_add(next_baseline - *baseline, (1.0 - beta) * *slope);
            *baseline = next_baseline;
        }
    }
}

fn validate_damping(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(QgmError::invalid_config(format!(
            "smoothing {name} must be in [0,1], got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Smoother, SmoothingMode, SmoothingModel};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn rejects_out_of_range_parameters() {
        assert!(Smoother::simple(1.5).is_err());
        assert!(Smoother::simple(-0.1).is_err());
        assert!(Smoother::simple(f64::NAN).is_err());
        assert!(Smoother::double(0.5, 2.0).is_err());
        assert!(Smoother::triple(0.5, 0.5, 1.1, 4).is_err());
        assert!(Smoother::triple(0.5, 0.5, 0.5, 0).is_err());
        assert!(Smoother::simple(0.0).is_ok());
        assert!(Smoother::simple(1.0).is_ok());
    }

    #[test]
    fn empty_smoother_reports_zero() {
        let smoother = Smoother::double(0.3, 0.1).unwrap();
        assert!(approx(smoother.forecast(1), 0.0));
        assert!(approx(smoother.forecast(5), 0.0));
        assert!(approx(smoother.deviation(), 0.0));
        assert_eq!(smoother.sample_count(), 0);
    }

    #[test]
    fn simple_first_sample_seeds_baseline() {
        let mut smoother = Smoother::simple(0.3).unwrap();
        smoother.add_next_value(42.0);
        assert!(approx(smoother.forecast(1), 42.0));
        assert!(approx(smoother.forecast(10), 42.0));
    }

    #[test]
    fn simple_blends_with_alpha() {
        let mut smoother = Smoother::simple(0.25).unwrap();
        smoother.add_next_value(100.0);
        let level = smoother.add_next_value(200.0);
        assert!(approx(level, 125.0));
        assert!(approx(smoother.last_forecast(), 100.0));
        assert!(approx(smoother.deviation(), 100.0));
    }

    #[test]
    fn simple_alpha_one_tracks_input() {
        let mut smoother = Smoother::simple(1.0).unwrap();
        for v in [3.0, 9.0, 1.0] {
            assert!(approx(smoother.add_next_value(v), v));
        }
    }

    #[test]
    fn double_seeds_slope_from_first_two_samples() {
        let mut smoother = Smoother::double(0.5, 0.5).unwrap();
        smoother.add_next_value(10.0);
        smoother.add_next_value(14.0);
        assert!(approx(smoother.level(), 14.0));
        assert!(approx(smoother.slope(), 4.0));
        assert!(approx(smoother.forecast(1), 18.0));
        assert!(approx(smoother.forecast(3), 26.0));
    }

    #[test]
    fn double_recurrence_after_seeding() {
        let mut smoother = Smoother::double(0.5, 0.5).unwrap();
        smoother.add_next_value(10.0);
        smoother.add_next_value(14.0);
        smoother.add_next_value(20.0);
        // nb = 0.5*20 + 0.5*(14+4) = 19; slope = 0.5*(19-14) + 0.5*4 = 4.5
        assert!(approx(smoother.level(), 19.0));
        assert!(approx(smoother.slope(), 4.5));
        assert!(approx(smoother.last_forecast(), 18.0));
        assert!(approx(smoother.deviation(), 2.0));
    }

    #[test]
    fn triple_seeds_seasonal_window_then_rotates() {
        let mut smoother = Smoother::triple(0.5, 0.5, 0.5, 2).unwrap();
        smoother.add_next_value(10.0);
        smoother.add_next_value(12.0);
        let SmoothingModel::Triple { seasonal, .. } = smoother.model() else {
            panic!("expected triple model");
        };
        assert_eq!(seasonal.iter().copied().collect::<Vec<_>>(), vec![10.0, 12.0]);
        assert!(approx(smoother.level(), 12.0));
        assert!(approx(smoother.slope(), 2.0));

        smoother.add_next_value(30.0);
        // nb = 0.5*(30-10) + 0.5*(12+2) = 17; slope = 0.5*5 + 0.5*2 = 3.5
        // s' = 0.5*(30-17) + 0.5*10 = 11.5
        assert!(approx(smoother.level(), 17.0));
        assert!(approx(smoother.slope(), 3.5));
        let SmoothingModel::Triple { seasonal, .. } = smoother.model() else {
            panic!("expected triple model");
        };
        assert_eq!(seasonal.iter().copied().collect::<Vec<_>>(), vec![12.0, 11.5]);
        // h=1 picks index period-1.
        assert!(approx(smoother.forecast(1), 17.0 + 3.5 + 11.5));
        // h=2 wraps to index 0.
        assert!(approx(smoother.forecast(2), 17.0 + 7.0 + 12.0));
    }

    #[test]
    fn mode_is_fixed_at_construction() {
        assert_eq!(Smoother::simple(0.3).unwrap().mode(), SmoothingMode::Simple);
        assert_eq!(Smoother::double(0.3, 0.1).unwrap().mode(), SmoothingMode::Double);
        assert_eq!(
            Smoother::triple(0.3, 0.1, 0.1, 3).unwrap().mode(),
            SmoothingMode::Triple
        );
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("Triple".parse::<SmoothingMode>().unwrap(), SmoothingMode::Triple);
        assert!("quadruple".parse::<SmoothingMode>().is_err());
    }
}
