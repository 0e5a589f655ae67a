//! Core error types for focuskeeper-core.
//!
//! Most failures inside the engine are recovered locally and only logged
//! (notification delivery, foreground probes). The variants here are the ones
//! that reach a caller.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for focuskeeper-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Notification delivery errors
    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    /// Foreground probe errors
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    /// The task owns the running session and cannot be removed.
    #[error("Active session in progress for task '{task_id}'")]
    ActiveSessionInProgress { task_id: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Row lookup by id found nothing
    #[error("No {table} row with id '{id}'")]
    NotFound { table: &'static str, id: String },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Could not resolve the data directory
    #[error("Cannot resolve data directory: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Unknown task id
    #[error("Unknown task '{0}'")]
    UnknownTask(String),

    /// Wildcard pattern failed to compile
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Notification gateway errors.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// Permission to post notifications is missing
    #[error("Notification permission denied")]
    PermissionDenied,

    /// The backend rejected or failed to deliver
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Foreground-window probe errors.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The platform refused the query
    #[error("Foreground query not permitted: {0}")]
    PermissionDenied(String),

    /// The probe command could not be run or exited non-zero
    #[error("Probe command failed: {0}")]
    CommandFailed(String),

    /// The probe produced output that could not be parsed
    #[error("Unparseable probe output: {0:?}")]
    BadOutput(String),

    /// The probe did not answer in time
    #[error("Probe timed out after {0} ms")]
    TimedOut(u64),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
