//! Error types for the prediction pipeline
//!
//! Only [`InputError`] ever reaches a caller of the pipeline. Load and predict
//! failures are absorbed by the orchestrator and turned into a rule-based
//! fallback; they are public so the individual stages stay testable.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning a located file into a usable artifact
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    /// The file (or a sibling transform) could not be read or deserialized
    #[error("corrupt artifact {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// The file deserialized but carries no callable prediction capability
    #[error("unsupported artifact shape {path}: {reason}")]
    UnsupportedShape { path: PathBuf, reason: String },
}

impl LoadError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        LoadError::Corrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn unsupported(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        LoadError::UnsupportedShape {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Path of the artifact that failed to load
    pub fn path(&self) -> &PathBuf {
        match self {
            LoadError::Corrupt { path, .. } | LoadError::UnsupportedShape { path, .. } => path,
        }
    }
}

/// Errors raised while invoking a loaded predictor
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictError {
    /// Feature vector width disagrees with the artifact's declared feature count
    #[error("feature vector has {actual} values, artifact expects {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// The underlying model produced no usable output
    #[error("predictor failed: {0}")]
    RuntimeFailure(String),
}

/// Errors surfaced to the caller for malformed requests
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    /// The domain name matches no known domain or alias
    #[error("unknown prediction domain: {0}")]
    UnknownDomain(String),

    /// A request asked for zero candidates
    #[error("top_k must be at least 1")]
    InvalidTopK,
}

/// Errors raised while loading pipeline configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file exists but could not be read
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this layout
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// An environment override or config value is out of its domain
    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },

    /// An artifact file pattern is empty, contains a path separator or fails to compile
    #[error("invalid artifact pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Result type for caller-facing pipeline operations
pub type Result<T> = std::result::Result<T, InputError>;
