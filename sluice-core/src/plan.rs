//! Execution-plan compilation
//!
//! The compiler serializes a pipeline definition into an immutable plan
//! snapshot: steps rendered through the sibling-group ordering with their
//! SQL interpolated, plus a flattened list of quality-check plans. Included
//! pipelines' plans are merged in by group index. The compiler is pure and
//! never mutates the definitions it reads.

use crate::graph::DependencyGraph;
use crate::objectref::ObjectRef;
use crate::params::interpolate;
use crate::pipeline::{Pipeline, PipelineId};
use crate::quality::{CheckId, QualityCheck};
use crate::step::{Step, StepId, StepKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// A prerequisite -> dependent edge between two steps of the same pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDependency {
    pub prerequisite: StepId,
    pub dependent: StepId,
}

impl StepDependency {
    pub fn new(prerequisite: StepId, dependent: StepId) -> Self {
        Self {
            prerequisite,
            dependent,
        }
    }
}

/// One pipeline's full compilation unit: the pipeline, its steps and edges,
/// its quality checks, and the definitions it includes (in declared order).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub pipeline: Pipeline,

    #[serde(default)]
    pub steps: Vec<Step>,

    #[serde(default)]
    pub dependencies: Vec<StepDependency>,

    #[serde(default)]
    pub quality_checks: Vec<QualityCheck>,

    #[serde(default)]
    pub includes: Vec<PipelineDefinition>,
}

impl PipelineDefinition {
    /// Create a definition with no steps
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            steps: Vec::new(),
            dependencies: Vec::new(),
            quality_checks: Vec::new(),
            includes: Vec::new(),
        }
    }

    /// Build the validated dependency graph over this definition's steps.
    ///
    /// Edges referencing steps outside this pipeline surface as
    /// graph-corruption errors rather than silently widening the unit.
    pub fn step_graph(&self) -> crate::Result<DependencyGraph> {
        let nodes = self
            .steps
            .iter()
            .map(|step| (step.id.0, step.name.clone()));
        let edges: Vec<(Uuid, Uuid)> = self
            .dependencies
            .iter()
            .map(|dep| (dep.prerequisite.0, dep.dependent.0))
            .collect();
        Ok(DependencyGraph::from_edges(
            self.pipeline.slug.clone(),
            nodes,
            &edges,
        )?)
    }

    /// Check authoring invariants across the whole definition
    pub fn validate(&self) -> crate::Result<()> {
        self.pipeline.validate()?;

        let mut seen_names = HashSet::new();
        for step in &self.steps {
            step.validate()?;
            if !seen_names.insert(step.name.to_lowercase()) {
                return Err(crate::Error::InvalidDefinition(format!(
                    "duplicate step name `{}` (names are case-insensitively unique)",
                    step.name
                )));
            }
        }

        let mut seen_checks = HashSet::new();
        for check in &self.quality_checks {
            if !seen_checks.insert(check.name.to_lowercase()) {
                return Err(crate::Error::InvalidDefinition(format!(
                    "duplicate quality check name `{}`",
                    check.name
                )));
            }
        }

        self.step_graph()?;
        Ok(())
    }
}

/// Fully resolved plan record for one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepPlan {
    pub id: StepId,
    pub name: String,
    pub kind: StepKind,

    /// Interpolated SQL (verbatim template for schema migrations)
    pub sql: String,

    /// Effective parameters the SQL was resolved against
    pub params: Map<String, Value>,

    #[serde(default)]
    pub object_ref: Option<ObjectRef>,

    #[serde(default)]
    pub validations: Vec<ValidationPlan>,
}

/// Fully resolved plan record for one step validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationPlan {
    pub name: String,
    pub sql: String,
}

/// Fully resolved plan record for one quality check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckPlan {
    pub id: CheckId,
    pub name: String,
    pub sql: String,
}

/// An immutable execution-plan snapshot, owned exclusively by the run that
/// created it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub pipeline_id: PipelineId,
    pub pipeline_slug: String,

    /// Ordered sibling groups; members of one group are safe to run
    /// concurrently, groups themselves run strictly in order
    pub groups: Vec<Vec<StepPlan>>,

    pub quality_checks: Vec<CheckPlan>,
}

impl ExecutionPlan {
    /// The step plans in the group at `index`
    pub fn group(&self, index: usize) -> Option<&[StepPlan]> {
        self.groups.get(index).map(Vec::as_slice)
    }

    /// Look up one step plan by group index and step id
    pub fn step_plan(&self, index: usize, step_id: StepId) -> Option<&StepPlan> {
        self.group(index)?.iter().find(|plan| plan.id == step_id)
    }

    /// Look up one quality-check plan by id
    pub fn check_plan(&self, check_id: CheckId) -> Option<&CheckPlan> {
        self.quality_checks.iter().find(|plan| plan.id == check_id)
    }

    /// Total number of step plans across all groups
    pub fn step_count(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }
}

/// Compiles pipeline definitions into execution plans
pub struct PlanCompiler;

impl PlanCompiler {
    /// Compile one definition in isolation: validate, order the steps into
    /// sibling groups, and resolve every SQL template and object key.
    pub fn compile(definition: &PipelineDefinition) -> crate::Result<ExecutionPlan> {
        definition.validate()?;

        let graph = definition.step_graph()?;
        let groups = graph.ordered_groups()?;

        let steps_by_id: HashMap<Uuid, &Step> = definition
            .steps
            .iter()
            .map(|step| (step.id.0, step))
            .collect();

        let groups = groups
            .into_iter()
            .map(|group| {
                group
                    .into_iter()
                    .map(|node| Self::step_plan(definition, steps_by_id[&node]))
                    .collect()
            })
            .collect();

        let quality_checks = definition
            .quality_checks
            .iter()
            .map(|check| Self::check_plan(definition, check))
            .collect();

        Ok(ExecutionPlan {
            pipeline_id: definition.pipeline.id,
            pipeline_slug: definition.pipeline.slug.clone(),
            groups,
            quality_checks,
        })
    }

    /// Compile a definition and merge in the plans of its included
    /// pipelines, in declared inclusion order.
    ///
    /// Quality-check lists concatenate. Step groups merge by positional
    /// union: group i of the including plan becomes the union of its own
    /// group i and each included plan's group i. The index stands in for
    /// "logical execution depth" across otherwise unrelated graphs, so
    /// members of a merged group are safe to batch together but share no
    /// real dependency relationship.
    pub fn compile_with_inclusions(definition: &PipelineDefinition) -> crate::Result<ExecutionPlan> {
        let mut plan = Self::compile(definition)?;

        for included in &definition.includes {
            let included_plan = Self::compile(included)?;

            plan.quality_checks.extend(included_plan.quality_checks);

            for (index, group) in included_plan.groups.into_iter().enumerate() {
                while plan.groups.len() <= index {
                    plan.groups.push(Vec::new());
                }
                let present: HashSet<StepId> =
                    plan.groups[index].iter().map(|step| step.id).collect();
                for step_plan in group {
                    if !present.contains(&step_plan.id) {
                        plan.groups[index].push(step_plan);
                    }
                }
                plan.groups[index].sort_by(|a, b| a.name.cmp(&b.name));
            }
        }

        Ok(plan)
    }

    fn step_plan(definition: &PipelineDefinition, step: &Step) -> StepPlan {
        let effective = merge_params(&definition.pipeline.params, &step.params);

        // Migrations are expected to be self-contained; their template runs
        // verbatim and their params are ignored.
        let sql = if step.kind == StepKind::SchemaMigration {
            step.sql.clone()
        } else {
            interpolate(&step.sql, &effective, true)
        };

        let object_ref = step
            .object_ref
            .as_ref()
            .map(|object_ref| object_ref.with_interpolated_key(&effective));

        let validations = step
            .validations
            .iter()
            .filter(|validation| validation.enabled)
            .map(|validation| {
                let params = validation.effective_params(&effective);
                ValidationPlan {
                    name: interpolate(&validation.name, &params, false),
                    sql: interpolate(&validation.sql, &params, true),
                }
            })
            .collect();

        StepPlan {
            id: step.id,
            name: step.name.clone(),
            kind: step.kind,
            sql,
            params: effective,
            object_ref,
            validations,
        }
    }

    fn check_plan(definition: &PipelineDefinition, check: &QualityCheck) -> CheckPlan {
        let effective = merge_params(&definition.pipeline.params, &check.params);
        CheckPlan {
            id: check.id,
            name: check.name.clone(),
            sql: interpolate(&check.sql, &effective, true),
        }
    }
}

fn merge_params(base: &Map<String, Value>, overrides: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition(slug: &str) -> PipelineDefinition {
        PipelineDefinition::new(Pipeline::new(slug.to_uppercase(), slug))
    }

    fn sql_step(name: &str) -> Step {
        Step::new(name, StepKind::SqlStatement, format!("SELECT '{name}'"))
    }

    #[test]
    fn test_compile_groups_two_roots_then_dependent() {
        let mut def = definition("orders");
        let a = sql_step("a");
        let b = sql_step("b");
        let c = sql_step("c");
        def.dependencies.push(StepDependency::new(a.id, c.id));
        def.dependencies.push(StepDependency::new(b.id, c.id));
        def.steps = vec![c.clone(), a.clone(), b.clone()];

        let plan = PlanCompiler::compile(&def).unwrap();
        assert_eq!(plan.groups.len(), 2);
        let group0: Vec<&str> = plan.groups[0].iter().map(|s| s.name.as_str()).collect();
        assert_eq!(group0, vec!["a", "b"]);
        assert_eq!(plan.groups[1][0].id, c.id);
    }

    #[test]
    fn test_compile_interpolates_sql_against_pipeline_and_step_params() {
        let mut def = definition("orders");
        def.pipeline.params = json!({"schema_rev": 3, "table_name": "wrong"})
            .as_object()
            .unwrap()
            .clone();
        def.steps.push(
            Step::new(
                "insert",
                StepKind::SqlStatement,
                "INSERT INTO :table_name (rev) VALUES (:schema_rev)",
            )
            .with_params(json!({"table_name": "orders"}).as_object().unwrap().clone()),
        );

        let plan = PlanCompiler::compile(&def).unwrap();
        assert_eq!(
            plan.groups[0][0].sql,
            "INSERT INTO orders (rev) VALUES (3)"
        );
    }

    #[test]
    fn test_compile_leaves_migration_sql_verbatim() {
        let mut def = definition("orders");
        def.pipeline.params = json!({"t": "nope"}).as_object().unwrap().clone();
        def.steps.push(Step::new(
            "migrate",
            StepKind::SchemaMigration,
            "CREATE TABLE :t (id bigint)",
        ));

        let plan = PlanCompiler::compile(&def).unwrap();
        assert_eq!(plan.groups[0][0].sql, "CREATE TABLE :t (id bigint)");
    }

    #[test]
    fn test_compile_interpolates_object_keys() {
        let mut def = definition("orders");
        def.steps.push(
            Step::new("export", StepKind::BulkExport, "COPY (SELECT 1) TO STDOUT")
                .with_params(json!({"table_name": "orders"}).as_object().unwrap().clone())
                .with_object_ref(ObjectRef::new("warehouse", "exports/:table_name.csv")),
        );

        let plan = PlanCompiler::compile(&def).unwrap();
        let object_ref = plan.groups[0][0].object_ref.as_ref().unwrap();
        assert_eq!(object_ref.key, "exports/orders.csv");
    }

    #[test]
    fn test_compile_skips_disabled_validations() {
        let mut def = definition("orders");
        def.steps.push(
            sql_step("a")
                .with_validation(crate::step::StepValidation::new("on", "SELECT id FROM bad"))
                .with_validation(
                    crate::step::StepValidation::new("off", "SELECT id FROM worse")
                        .with_enabled(false),
                ),
        );

        let plan = PlanCompiler::compile(&def).unwrap();
        let validations = &plan.groups[0][0].validations;
        assert_eq!(validations.len(), 1);
        assert_eq!(validations[0].name, "on");
    }

    #[test]
    fn test_compile_rejects_cycles_without_partial_plan() {
        let mut def = definition("orders");
        let a = sql_step("a");
        let b = sql_step("b");
        def.dependencies.push(StepDependency::new(a.id, b.id));
        def.dependencies.push(StepDependency::new(b.id, a.id));
        def.steps = vec![a, b];

        assert!(PlanCompiler::compile(&def).is_err());
    }

    #[test]
    fn test_compile_rejects_cross_pipeline_edges_as_corruption() {
        let mut def = definition("orders");
        let a = sql_step("a");
        let foreign = sql_step("foreign");
        def.dependencies.push(StepDependency::new(foreign.id, a.id));
        def.steps = vec![a];

        let err = PlanCompiler::compile(&def).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Graph(crate::GraphError::UnknownNode { .. })
        ));
    }

    #[test]
    fn test_compile_rejects_duplicate_step_names_case_insensitively() {
        let mut def = definition("orders");
        def.steps.push(sql_step("Load Orders"));
        def.steps.push(sql_step("load orders"));

        assert!(PlanCompiler::compile(&def).is_err());
    }

    #[test]
    fn test_merge_unions_groups_by_index() {
        // Including plan: [[s1], [s2, s3]]; included plan: [[s4, s5]]
        // Expected: [[s1, s4, s5], [s2, s3]]
        let mut including = definition("including");
        let s1 = sql_step("s1");
        let s2 = sql_step("s2");
        let s3 = sql_step("s3");
        including.dependencies.push(StepDependency::new(s1.id, s2.id));
        including.dependencies.push(StepDependency::new(s1.id, s3.id));
        including.steps = vec![s1.clone(), s2.clone(), s3.clone()];

        let mut included = definition("included");
        let s4 = sql_step("s4");
        let s5 = sql_step("s5");
        included.steps = vec![s4.clone(), s5.clone()];

        including.includes.push(included);

        let plan = PlanCompiler::compile_with_inclusions(&including).unwrap();
        assert_eq!(plan.groups.len(), 2);

        let group0: HashSet<StepId> = plan.groups[0].iter().map(|s| s.id).collect();
        assert_eq!(group0, HashSet::from([s1.id, s4.id, s5.id]));

        let group1: HashSet<StepId> = plan.groups[1].iter().map(|s| s.id).collect();
        assert_eq!(group1, HashSet::from([s2.id, s3.id]));
    }

    #[test]
    fn test_merge_extends_groups_when_included_plan_is_deeper() {
        let mut including = definition("including");
        including.steps = vec![sql_step("only")];

        let mut included = definition("included");
        let d1 = sql_step("d1");
        let d2 = sql_step("d2");
        included.dependencies.push(StepDependency::new(d1.id, d2.id));
        included.steps = vec![d1.clone(), d2.clone()];

        including.includes.push(included);

        let plan = PlanCompiler::compile_with_inclusions(&including).unwrap();
        assert_eq!(plan.groups.len(), 2);
        assert_eq!(plan.groups[1][0].id, d2.id);
    }

    #[test]
    fn test_merge_concatenates_quality_checks_in_inclusion_order() {
        let mut including = definition("including");
        including.steps = vec![sql_step("s")];
        including
            .quality_checks
            .push(QualityCheck::new("own check", "SELECT count(*) FROM t"));

        let mut first = definition("first_included");
        first
            .quality_checks
            .push(QualityCheck::new("first check", "SELECT 1"));
        let mut second = definition("second_included");
        second
            .quality_checks
            .push(QualityCheck::new("second check", "SELECT 2"));

        including.includes.push(first);
        including.includes.push(second);

        let plan = PlanCompiler::compile_with_inclusions(&including).unwrap();
        let names: Vec<&str> = plan
            .quality_checks
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["own check", "first check", "second check"]);
    }

    #[test]
    fn test_merge_dedupes_step_ids_within_a_group() {
        let shared = sql_step("shared");

        let mut including = definition("including");
        including.steps = vec![shared.clone()];

        let mut included = definition("included");
        included.steps = vec![shared.clone()];
        including.includes.push(included);

        let plan = PlanCompiler::compile_with_inclusions(&including).unwrap();
        assert_eq!(plan.groups[0].len(), 1);
    }

    #[test]
    fn test_plan_lookup_accessors() {
        let mut def = definition("orders");
        let a = sql_step("a");
        def.steps = vec![a.clone()];
        def.quality_checks
            .push(QualityCheck::new("rows", "SELECT count(*) FROM orders"));
        let check_id = def.quality_checks[0].id;

        let plan = PlanCompiler::compile(&def).unwrap();
        assert!(plan.step_plan(0, a.id).is_some());
        assert!(plan.step_plan(1, a.id).is_none());
        assert!(plan.check_plan(check_id).is_some());
        assert_eq!(plan.step_count(), 1);
    }

    #[test]
    fn test_plan_serialization_round_trips() {
        let mut def = definition("orders");
        def.steps.push(
            Step::new("load", StepKind::AutoLoad, "")
                .with_params(json!({"table_name": "orders"}).as_object().unwrap().clone())
                .with_object_ref(ObjectRef::new("warehouse", "loads/orders.csv"))
                .normalized(),
        );

        let plan = PlanCompiler::compile(&def).unwrap();
        let json = serde_json::to_string(&plan).unwrap();
        let restored: ExecutionPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.step_count(), plan.step_count());
        assert_eq!(restored.groups[0][0].kind, StepKind::AutoLoad);
    }
}
