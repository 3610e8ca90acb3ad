//! QGM-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, QgmError>;

/// Top-level error type for the queue growth monitor.
#[derive(Debug, Error)]
pub enum QgmError {
    #[error("[QGM-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[QGM-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[QGM-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[QGM-2001] sample log parse failure at line {line}: {details}")]
    SampleParse { line: usize, details: String },

    #[error("[QGM-2002] daemon state unavailable: {details}")]
    StateUnavailable { details: String },

    #[error("[QGM-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[QGM-3001] failed to signal daemon pid {pid}: {details}")]
    Signal { pid: u32, details: String },

    #[error("[QGM-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[QGM-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl QgmError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "QGM-1001",
            Self::MissingConfig { .. } => "QGM-1002",
            Self::ConfigParse { .. } => "QGM-1003",
            Self::SampleParse { .. } => "QGM-2001",
            Self::StateUnavailable { .. } => "QGM-2002",
            Self::Serialization { .. } => "QGM-2101",
            Self::Signal { .. } => "QGM-3001",
            Self::Io { .. } => "QGM-3002",
            Self::Runtime { .. } => "QGM-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::StateUnavailable { .. }
                | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for configuration validation failures.
    #[must_use]
    pub fn invalid_config(details: impl Into<String>) -> Self {
        Self::InvalidConfig {
            details: details.into(),
        }
    }
}

impl From<serde_json::Error> for QgmError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for QgmError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<toml::ser::Error> for QgmError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Serialization {
            context: "toml",
            details: value.to_string(),
        }
    }
}
