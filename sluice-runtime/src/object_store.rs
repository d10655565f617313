//! Object-store seam
//!
//! The runtime only needs two capabilities from the external store: fetch a
//! named object as a byte stream, and upload a byte stream of known length.
//! Adapter crates implement this trait; bucket lifecycle is out of scope.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

/// A stream of object content chunks
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Errors surfaced by object-store adapters
#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("Object not found: store://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("Object store backend error: {0}")]
    Backend(String),
}

/// The capability contract against the external object store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object's content as a byte stream
    async fn fetch(&self, bucket: &str, key: &str) -> Result<ByteStream, ObjectStoreError>;

    /// Upload a byte stream of known length. The destination store requires
    /// the content length before the upload begins, so callers spool when
    /// the size is not known up front.
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        content: ByteStream,
        content_length: u64,
    ) -> Result<(), ObjectStoreError>;
}
