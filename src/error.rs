//! Error types for cadence

use thiserror::Error;

/// Error type for pattern storage and projection operations
#[derive(Debug, Error)]
pub enum CadenceError {
    /// Graph database operation failed
    #[error("Graph database error: {0}")]
    Database(String),

    /// Graph schema migration failed
    #[error("Schema migration failed: {0}")]
    Migration(String),

    /// Pattern not found in any active lifecycle stage
    #[error("Pattern not found: {0}")]
    NotFound(String),

    /// Capability not present in the graph projection
    #[error("Capability not found: {0}")]
    CapabilityNotFound(String),

    /// IO operation against the durable record store failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for cadence operations
pub type Result<T> = std::result::Result<T, CadenceError>;
