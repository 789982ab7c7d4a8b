//! Error types for the extraction pipeline.
//!
//! Only failures that must stop a run are represented here. Files that
//! cannot be found or parsed mid-run are recorded as [`Diagnostic`]s on the
//! result instead, and ambiguous auth classification is never an error.
//!
//! [`Diagnostic`]: crate::model::Diagnostic

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors that abort an extraction run.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("entry file not found: {0}")]
    EntryNotFound(PathBuf),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("framework '{0}' is not supported")]
    UnsupportedFramework(String),
    #[error("could not detect a supported framework in {0}")]
    FrameworkNotDetected(PathBuf),
}

pub type Result<T> = std::result::Result<T, ExtractError>;
