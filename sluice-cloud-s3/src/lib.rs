//! # Sluice Cloud S3
//!
//! S3-compatible object-store adapter implementing the runtime's
//! [`ObjectStore`](sluice_runtime::ObjectStore) capability: fetch a named
//! object as a byte stream, upload a byte stream of known length. Bucket
//! lifecycle is out of scope.

pub mod store;

// Re-export commonly used types
pub use store::{S3Config, S3ObjectStore};

/// Result type for adapter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for adapter operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Object store API error: {0}")]
    Api(String),
}
