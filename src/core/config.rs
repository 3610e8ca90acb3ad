//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{QgmError, Result};
use crate::monitor::queue_stats::GrowthPolicy;
use crate::monitor::smoothing::SmoothingMode;

/// Full QGM configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub sources: SourcesConfig,
    pub paths: PathsConfig,
}

/// Trend detection knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Number of smoothed points the regression window holds.
    pub window_size: usize,
    /// A queue is growing when its scaled slope exceeds this value.
    pub growth_threshold: f64,
    /// Multiplier applied to the raw regression slope (ready entries per
    /// millisecond of sample time) before comparison.
    /// Expressed together with `growth_threshold`; change them as a pair.
    pub slope_scale: f64,
    /// Polling tick period.
    pub poll_interval_ms: u64,
    /// Whether the growth check starts enabled. Defaults to `false`: the
    /// monitor historically booted deactivated even though operators expect
    /// an active check. Left as-is; set `true` explicitly to opt in.
    pub start_active: bool,
    pub smoothing: SmoothingConfig,
}

/// Exponential smoothing parameters applied to each queue's raw backlog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SmoothingConfig {
    pub mode: SmoothingMode,
    pub alpha: f64,
    /// Trend damping (double/triple only).
    pub beta: f64,
    /// Seasonal damping (triple only).
    pub gamma: f64,
    /// Season length in ticks (triple only).
    pub period: usize,
}

/// Where backlog readings come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SourcesConfig {
    /// JSON spool file rewritten by the queue host every tick.
    pub spool_file: PathBuf,
    /// Queue ids to track.
    pub queues: Vec<String>,
}

/// Filesystem paths used by qgm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub state_file: PathBuf,
    pub jsonl_log: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window_size: 60,
            growth_threshold: 0.1,
            slope_scale: 100.0,
            poll_interval_ms: 60_000,
            start_active: false,
            smoothing: SmoothingConfig::default(),
        }
    }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            mode: SmoothingMode::Simple,
            alpha: 0.3,
            beta: 0.1,
            gamma: 0.1,
            period: 1,
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            spool_file: data_dir().join("backlog.json"),
            queues: Vec::new(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let data = data_dir();
        Self {
            config_file: home_dir().join(".config").join("qgm").join("config.toml"),
            state_file: data.join("state.json"),
            jsonl_log: data.join("activity.jsonl"),
        }
    }
}

impl MonitorConfig {
    /// Threshold and scale as the linked pair the detector consumes.
    #[must_use]
    pub fn growth_policy(&self) -> GrowthPolicy {
        GrowthPolicy {
            threshold: self.growth_threshold,
            slope_scale: self.slope_scale,
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| QgmError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(QgmError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize_queues();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for logging/telemetry.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    /// Render the effective config as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // monitor
        override_parsed(
            &mut lookup,
            "QGM_MONITOR_WINDOW_SIZE",
            &mut self.monitor.window_size,
        )?;
        override_parsed(
            &mut lookup,
            "QGM_MONITOR_GROWTH_THRESHOLD",
            &mut self.monitor.growth_threshold,
        )?;
        override_parsed(
            &mut lookup,
            "QGM_MONITOR_SLOPE_SCALE",
            &mut self.monitor.slope_scale,
        )?;
        override_parsed(
            &mut lookup,
            "QGM_MONITOR_POLL_INTERVAL_MS",
            &mut self.monitor.poll_interval_ms,
        )?;
        override_parsed(
            &mut lookup,
            "QGM_MONITOR_START_ACTIVE",
            &mut self.monitor.start_active,
        )?;

        // smoothing
        if let Some(raw) = lookup("QGM_SMOOTHING_MODE") {
            self.monitor.smoothing.mode = raw.parse().map_err(|error| QgmError::ConfigParse {
                context: "env",
                details: format!("QGM_SMOOTHING_MODE={raw:?}: {error}"),
            })?;
        }
        override_parsed(
            &mut lookup,
            "QGM_SMOOTHING_ALPHA",
            &mut self.monitor.smoothing.alpha,
        )?;
        override_parsed(
            &mut lookup,
            "QGM_SMOOTHING_BETA",
            &mut self.monitor.smoothing.beta,
        )?;
        override_parsed(
            &mut lookup,
            "QGM_SMOOTHING_GAMMA",
            &mut self.monitor.smoothing.gamma,
        )?;
        override_parsed(
            &mut lookup,
            "QGM_SMOOTHING_PERIOD",
            &mut self.monitor.smoothing.period,
        )?;

        // sources
        if let Some(raw) = lookup("QGM_SOURCES_SPOOL_FILE") {
            self.sources.spool_file = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("QGM_SOURCES_QUEUES") {
            self.sources.queues = raw.split(',').map(str::to_string).collect();
        }

        // paths
        if let Some(raw) = lookup("QGM_PATHS_STATE_FILE") {
            self.paths.state_file = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("QGM_PATHS_JSONL_LOG") {
            self.paths.jsonl_log = PathBuf::from(raw);
        }

        Ok(())
    }

    /// Trim queue ids and drop empty entries (e.g. from a trailing comma).
    fn normalize_queues(&mut self) {
        self.sources.queues = self
            .sources
            .queues
            .iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
    }

    pub fn validate(&self) -> Result<()> {
        let monitor = &self.monitor;
        if monitor.window_size < 2 {
            return Err(QgmError::invalid_config(format!(
                "monitor.window_size must be >= 2, got {}",
                monitor.window_size
            )));
        }
        monitor.growth_policy().validate()?;
        if monitor.poll_interval_ms == 0 {
            return Err(QgmError::invalid_config(
                "monitor.poll_interval_ms must be > 0",
            ));
        }

        let smoothing = &monitor.smoothing;
        validate_prob("monitor.smoothing.alpha", smoothing.alpha)?;
        validate_prob("monitor.smoothing.beta", smoothing.beta)?;
        validate_prob("monitor.smoothing.gamma", smoothing.gamma)?;
        if smoothing.period == 0 {
            return Err(QgmError::invalid_config(
                "monitor.smoothing.period must be >= 1",
            ));
        }

        let mut seen = HashSet::new();
        for queue in &self.sources.queues {
            if !seen.insert(queue.as_str()) {
                return Err(QgmError::invalid_config(format!(
                    "sources.queues lists {queue:?} more than once"
                )));
            }
        }

        Ok(())
    }
}

fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || {
            eprintln!("[QGM-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    )
}

fn data_dir() -> PathBuf {
    home_dir().join(".local").join("share").join("qgm")
}

fn validate_prob(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(QgmError::invalid_config(format!(
            "{name} must be in [0,1], got {value}"
        )));
    }
    Ok(())
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn override_parsed<F, T>(lookup: &mut F, name: &str, slot: &mut T) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(name) {
        *slot = raw.trim().parse::<T>().map_err(|error| QgmError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}
