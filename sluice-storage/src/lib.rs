//! # Sluice Storage
//!
//! PostgreSQL layer for Sluice: run/step-log metadata with write-once
//! execution plans, and the schema-scoped execution context that tenant
//! workloads run inside.

pub mod metrics;
pub mod migrations;
pub mod models;
pub mod runs;
pub mod schema;
pub mod tenant;
pub mod tracker;

// Re-export commonly used types
pub use models::{RunModel, RunStepLogModel};
pub use runs::RunStore;
pub use schema::{PoolConfig, SchemaContext, StorageEngine};
pub use tenant::{SchemaName, TenantId};
pub use tracker::{ErrorPayload, RunStepTracker};

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for storage operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Alternate storage engine requested but not configured")]
    AlternateEngineUnconfigured,

    #[error("Internal error: {0}")]
    Internal(String),
}
