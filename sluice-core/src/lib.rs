//! # Sluice Core
//!
//! Core pipeline engine for Sluice, providing dependency-graph validation,
//! sibling-group ordering, parameter interpolation, and execution-plan
//! compilation. This crate is pure: it performs no I/O and never mutates
//! stored pipeline definitions.

pub mod graph;
pub mod objectref;
pub mod params;
pub mod pipeline;
pub mod plan;
pub mod quality;
pub mod step;

// Re-export commonly used types
pub use graph::{DependencyGraph, GraphError};
pub use objectref::{ObjectRef, ObjectRefError};
pub use params::{interpolate, is_sql_identifier, to_sql_identifier};
pub use pipeline::{inclusion_graph, Pipeline, PipelineId};
pub use plan::{
    CheckPlan, ExecutionPlan, PipelineDefinition, PlanCompiler, StepDependency, StepPlan,
    ValidationPlan,
};
pub use quality::{CheckId, QualityCheck};
pub use step::{Step, StepId, StepKind, StepValidation};

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    ObjectRef(#[from] ObjectRefError),

    #[error("Invalid pipeline definition: {0}")]
    InvalidDefinition(String),
}
