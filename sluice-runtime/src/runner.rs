//! Runner contract and static dispatch
//!
//! Each step kind maps at compile time to one runner implementation behind
//! a uniform contract. There is no lookup by name: an unrepresentable kind
//! is a type error, not a runtime failure.

use crate::object_store::ObjectStore;
use crate::runners::{
    AutoLoadRunner, BulkExportRunner, BulkImportRunner, QualityReportRunner, SchemaMigrationRunner,
    SqlStatementRunner, ValidationRunner,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sluice_core::{StepKind, StepPlan};
use sluice_storage::{SchemaContext, SchemaName};

/// Everything a runner needs to execute one step: the schema-scoped
/// database context, the run's schema name, and the object store.
pub struct StepContext<'a> {
    pub schema: &'a SchemaContext,
    pub schema_name: &'a SchemaName,
    pub object_store: &'a dyn ObjectStore,
}

/// One failed business-rule validation: the offending row identifiers plus
/// the check's SQL for diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub name: String,
    pub sql: String,
    pub failing_ids: Vec<serde_json::Value>,
}

impl ValidationFailure {
    /// The structured payload recorded against the step log
    pub fn payload(&self) -> serde_json::Value {
        json!({
            "failed_validation_name": self.name,
            "failed_validation_sql": self.sql,
            "ids_failing_validation": self.failing_ids,
        })
    }
}

/// The result of one runner invocation
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// The step completed; the payload (if any) lands in the step log's
    /// result column
    Success(Option<serde_json::Value>),

    /// A business-rule failure. Not an error in itself: the caller decides
    /// severity, and the offending identifiers travel as data.
    ValidationFailed(Vec<ValidationFailure>),
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success(_))
    }
}

/// Uniform execution contract for all step kinds
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run(&self, ctx: &StepContext<'_>, plan: &StepPlan) -> crate::Result<StepOutcome>;
}

/// Maps a step's kind tag to its runner implementation
pub struct RunnerRegistry;

impl RunnerRegistry {
    /// Resolve the runner for a kind. Static dispatch: every kind has
    /// exactly one runner, fixed at compile time.
    pub fn runner_for(kind: StepKind) -> &'static dyn StepRunner {
        match kind {
            StepKind::SchemaMigration => &SchemaMigrationRunner,
            StepKind::AutoLoad => &AutoLoadRunner,
            StepKind::BulkImport => &BulkImportRunner,
            StepKind::SqlStatement => &SqlStatementRunner,
            StepKind::BulkExport => &BulkExportRunner,
            StepKind::Validation => &ValidationRunner,
            StepKind::QualityReport => &QualityReportRunner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_resolves_to_a_runner() {
        for kind in [
            StepKind::SchemaMigration,
            StepKind::AutoLoad,
            StepKind::BulkImport,
            StepKind::SqlStatement,
            StepKind::BulkExport,
            StepKind::Validation,
            StepKind::QualityReport,
        ] {
            // Resolution is total; this is a compile-time guarantee the
            // test merely witnesses.
            let _runner = RunnerRegistry::runner_for(kind);
        }
    }

    #[test]
    fn test_validation_failure_payload_shape() {
        let failure = ValidationFailure {
            name: "orders have customers".to_string(),
            sql: "SELECT id FROM orders WHERE customer_id IS NULL".to_string(),
            failing_ids: vec![json!(7), json!(42)],
        };

        let payload = failure.payload();
        assert_eq!(payload["failed_validation_name"], "orders have customers");
        assert_eq!(payload["ids_failing_validation"], json!([7, 42]));
        assert!(payload["failed_validation_sql"]
            .as_str()
            .unwrap()
            .contains("customer_id IS NULL"));
    }
}
