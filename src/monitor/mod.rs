//! Trend detection: exponential smoothing, sliding-window regression,
//! per-queue state and the aggregated growth health check.

pub mod growth;
pub mod history;
pub mod queue_stats;
pub mod regression;
pub mod replay;
pub mod smoothing;

#[cfg(test)]
mod test_properties;
