//! # Sluice Runtime
//!
//! Execution runtime for Sluice pipelines: per-kind step runners behind a
//! static registry, the object-store seam, bounded in-group concurrency,
//! and the orchestrator that walks an execution plan's sibling groups in
//! order while tracking every step attempt.

pub mod concurrency;
pub mod metrics;
pub mod object_store;
pub mod orchestrator;
pub mod runner;
pub mod runners;
pub mod state_machine;

// Re-export commonly used types
pub use concurrency::ConcurrencyLimiter;
pub use object_store::{ByteStream, ObjectStore, ObjectStoreError};
pub use orchestrator::{OrchestratorConfig, RunOrchestrator, RunSummary, CREATE_SCHEMA_PHASE};
pub use runner::{RunnerRegistry, StepContext, StepOutcome, StepRunner, ValidationFailure};
pub use state_machine::RunState;

use serde_json::json;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for runtime operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Step `{step}`: missing required parameter `{param}`")]
    MissingParameter { step: String, param: String },

    #[error("Unable to locate object store://{bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    #[error("Object store error: {0}")]
    ObjectStore(String),

    #[error("Business-rule validations failed for step `{step}`")]
    StepValidationFailed {
        step: String,
        failures: Vec<ValidationFailure>,
    },

    #[error(transparent)]
    Storage(#[from] sluice_storage::Error),

    #[error(transparent)]
    Compile(#[from] sluice_core::Error),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<ObjectStoreError> for Error {
    fn from(error: ObjectStoreError) -> Self {
        match error {
            ObjectStoreError::NotFound { bucket, key } => Error::ObjectNotFound { bucket, key },
            ObjectStoreError::Backend(message) => Error::ObjectStore(message),
        }
    }
}

impl sluice_storage::ErrorPayload for Error {
    fn error_payload(&self) -> serde_json::Value {
        match self {
            Error::StepValidationFailed { step, failures } => json!({
                "step": step,
                "validation_failures": failures
                    .iter()
                    .map(ValidationFailure::payload)
                    .collect::<Vec<_>>(),
            }),
            Error::ObjectNotFound { bucket, key } => json!({
                "message": self.to_string(),
                "bucket": bucket,
                "key": key,
            }),
            other => json!({"message": other.to_string()}),
        }
    }
}
