//! Fluent builders for constructing test pipeline definitions

use serde_json::Value;
use sluice_core::{
    Pipeline, PipelineDefinition, QualityCheck, Step, StepDependency, StepKind, StepValidation,
};

/// Builder for a [`PipelineDefinition`] with readable test code
pub struct PipelineDefinitionBuilder {
    definition: PipelineDefinition,
}

impl PipelineDefinitionBuilder {
    /// Start a definition with the given name and slug
    pub fn new(name: &str, slug: &str) -> Self {
        Self {
            definition: PipelineDefinition::new(Pipeline::new(name, slug)),
        }
    }

    /// Set the pipeline's declared parameter map
    pub fn params(mut self, params: Value) -> Self {
        self.definition.pipeline.params =
            params.as_object().cloned().expect("params must be an object");
        self
    }

    /// Add an already-built step
    pub fn step(mut self, step: Step) -> Self {
        self.definition.steps.push(step);
        self
    }

    /// Add a sql-statement step
    pub fn sql_step(self, name: &str, sql: &str) -> Self {
        self.step(Step::new(name, StepKind::SqlStatement, sql))
    }

    /// Add a sql-statement step carrying a validation
    pub fn sql_step_with_validation(
        self,
        name: &str,
        sql: &str,
        validation_name: &str,
        validation_sql: &str,
    ) -> Self {
        self.step(
            Step::new(name, StepKind::SqlStatement, sql)
                .with_validation(StepValidation::new(validation_name, validation_sql)),
        )
    }

    /// Add a prerequisite edge between two named steps
    pub fn dependency(mut self, prerequisite: &str, dependent: &str) -> Self {
        let find = |name: &str| {
            self.definition
                .steps
                .iter()
                .find(|step| step.name == name)
                .unwrap_or_else(|| panic!("no step named `{name}` in builder"))
                .id
        };
        let edge = StepDependency::new(find(prerequisite), find(dependent));
        self.definition.dependencies.push(edge);
        self
    }

    /// Add a quality check
    pub fn quality_check(mut self, name: &str, sql: &str) -> Self {
        self.definition
            .quality_checks
            .push(QualityCheck::new(name, sql));
        self
    }

    /// Include another pipeline's definition
    pub fn include(mut self, included: PipelineDefinition) -> Self {
        self.definition.includes.push(included);
        self
    }

    /// Finish building
    pub fn build(self) -> PipelineDefinition {
        self.definition
    }
}
