//! Core error types for guildhall-core.
//!
//! This module defines the error hierarchy using thiserror. Domain failures
//! of the progression engine live in [`AchievementError`]; storage and
//! configuration failures have their own enums and fold into [`CoreError`].

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for guildhall-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Achievement domain errors
    #[error("{0}")]
    Achievement(#[from] AchievementError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

impl CoreError {
    /// The achievement error kind, if this is a domain error.
    pub fn as_achievement(&self) -> Option<&AchievementError> {
        match self {
            CoreError::Achievement(err) => Some(err),
            _ => None,
        }
    }

    /// Whether the caller may retry the operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Achievement(AchievementError::StoreConflict(_)))
    }
}

/// Errors surfaced by the tier catalog, the progression engine and claims.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AchievementError {
    /// Unknown tier, series or achievement id
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// Claim attempted before the achievement was completed
    #[error("achievement {achievement_id} is not completed for user '{user_id}'")]
    NotCompleted { user_id: String, achievement_id: i64 },

    /// Duplicate claim
    #[error("reward for achievement {achievement_id} already claimed by user '{user_id}'")]
    AlreadyClaimed { user_id: String, achievement_id: i64 },

    /// Negative increment or absolute value
    #[error("invalid progress value {value}: {reason}")]
    InvalidProgressValue { value: i64, reason: &'static str },

    /// Transient concurrent-update conflict; the caller retries
    #[error("store conflict: {0}")]
    StoreConflict(String),
}

impl AchievementError {
    pub(crate) fn tier_not_found(id: u8) -> Self {
        AchievementError::NotFound {
            entity: "tier",
            id: id.to_string(),
        }
    }

    pub(crate) fn achievement_not_found(id: i64) -> Self {
        AchievementError::NotFound {
            entity: "achievement",
            id: id.to_string(),
        }
    }
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

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),
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

    /// Unknown or malformed configuration key
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Data directory could not be resolved or created
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// Catalog definition rejected
    #[error("Invalid catalog entry '{name}': {message}")]
    InvalidDefinition { name: String, message: String },
}

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg)
                if code.code == rusqlite::ErrorCode::DatabaseBusy
                    || code.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                CoreError::Achievement(AchievementError::StoreConflict(err.to_string()))
            }
            _ => CoreError::Database(DatabaseError::QueryFailed(err.to_string())),
        }
    }
}

impl From<toml::de::Error> for CoreError {
    fn from(err: toml::de::Error) -> Self {
        CoreError::Custom(format!("TOML parse error: {err}"))
    }
}

impl From<toml::ser::Error> for CoreError {
    fn from(err: toml::ser::Error) -> Self {
        CoreError::Custom(format!("TOML serialize error: {err}"))
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
