//! Metadata error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MetadataError>;

/// Failures of the metadata backends. The in-memory stores are infallible;
/// durable implementations map their I/O and codec errors onto these.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}
