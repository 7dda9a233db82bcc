//! Error types for the conversation memory core

use thiserror::Error;

/// Result type alias for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;

#[derive(Error, Debug)]
pub enum MemoryError {

    // =============================
    // Core Errors
    // =============================

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
