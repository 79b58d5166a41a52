//! Unified application error type.
//! All modules (db, store, core, cli, utils) return AppError to keep the error
//! handling consistent and easy to manage.

use std::io;
use thiserror::Error;

/// Failures reported by a `ShiftStore` collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Shift {0} not found")]
    NotFound(i64),

    #[error("Store rejected request: {0}")]
    Validation(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Network(e.to_string())
    }
}

impl From<AppError> for StoreError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::Store(inner) => inner,
            other => StoreError::Network(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum AppError {
    // ---------------------------
    // IO
    // ---------------------------
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // ---------------------------
    // Database-related
    // ---------------------------
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    // ---------------------------
    // Parsing errors
    // ---------------------------
    #[error("Invalid date format: {0}")]
    InvalidDate(String),

    #[error("Invalid time format: {0}")]
    InvalidTime(String),

    // ---------------------------
    // Engine errors
    // ---------------------------
    #[error("{0}")]
    Validation(String),

    #[error("Action not available: {0}")]
    StateConflict(String),

    #[error("No block at position {0}")]
    InvalidBlock(usize),

    // ---------------------------
    // Persistence collaborator
    // ---------------------------
    #[error("{0}")]
    Store(#[from] StoreError),

    // ---------------------------
    // Config errors
    // ---------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration")]
    ConfigLoad,

    #[error("Failed to save configuration")]
    ConfigSave,

    // ---------------------------
    // Generic fallback
    // ---------------------------
    #[error("Internal error: {0}")]
    Other(String),
}

impl AppError {
    /// Validation errors are always recovered locally and shown inline.
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_) | AppError::InvalidTime(_))
    }
}

pub type AppResult<T> = Result<T, AppError>;
