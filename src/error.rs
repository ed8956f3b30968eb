//! Error types for pmapkv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using PmapError
pub type Result<T> = std::result::Result<T, PmapError>;

/// Unified error type for pmapkv operations
#[derive(Debug, Error)]
pub enum PmapError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Structural Errors
    // -------------------------------------------------------------------------
    #[error("Corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Codec error: {0}")]
    Codec(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Lock wait cancelled: {0}")]
    Cancelled(String),

    #[error("Store was modified while iterating")]
    ConcurrentModification,
}

impl From<bincode::Error> for PmapError {
    fn from(err: bincode::Error) -> Self {
        PmapError::Codec(err.to_string())
    }
}
