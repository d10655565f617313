//! Run orchestration
//!
//! The orchestrator owns the run lifecycle: it compiles a pipeline
//! definition into an immutable plan at run creation, then walks the plan's
//! sibling groups strictly in order, dispatching each step through the
//! runner registry with its outcome tracked before the next group starts.
//!
//! Plan compilation happens-before any dispatch; finalization of every step
//! in group *i* happens-before dispatch of any step in group *i+1*. Steps
//! within one group may run concurrently under the limiter; each in-flight
//! step uses its own pooled connection. A fatal error halts further
//! dispatch, but already-dispatched steps run to completion and groups that
//! finished stay finished.
//!
//! Resumption: successful step logs are skipped, so a crashed or failed run
//! re-enters idempotently.

use crate::concurrency::ConcurrencyLimiter;
use crate::metrics::{RUNS_TOTAL, STEP_DURATION_SECONDS, STEP_EXECUTIONS_TOTAL};
use crate::object_store::ObjectStore;
use crate::runner::{RunnerRegistry, StepContext, StepOutcome};
use crate::runners::ValidationRunner;
use crate::state_machine::RunState;
use crate::{Error, Result};
use chrono::Utc;
use serde_json::json;
use sluice_core::{CheckPlan, ExecutionPlan, PipelineDefinition, PlanCompiler, StepKind, StepPlan};
use sluice_storage::{
    RunModel, RunStepTracker, RunStore, SchemaContext, SchemaName, TenantId,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Step-kind tag recorded for the schema-creation phase
pub const CREATE_SCHEMA_PHASE: &str = "create-schema";

/// One step log key: (kind tag, group index, step id)
type StepKey = (String, i32, Uuid);

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on concurrently executing steps within one group.
    /// 1 (the default) walks each group serially.
    pub max_parallel_steps: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel_steps: 1,
        }
    }
}

/// Terminal summary of one run attempt
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub state: RunState,
    pub error: Option<String>,
}

/// Drives pipeline runs end to end
#[derive(Clone)]
pub struct RunOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    store: RunStore,
    tracker: RunStepTracker,
    schema: SchemaContext,
    object_store: Arc<dyn ObjectStore>,
    limiter: ConcurrencyLimiter,
}

impl RunOrchestrator {
    /// Create an orchestrator.
    ///
    /// `schema` must already be resolved to the tenant's storage engine;
    /// the orchestrator never switches engines itself.
    pub fn new(
        store: RunStore,
        schema: SchemaContext,
        object_store: Arc<dyn ObjectStore>,
        config: OrchestratorConfig,
    ) -> Self {
        let tracker = RunStepTracker::new(store.clone());
        Self {
            inner: Arc::new(Inner {
                store,
                tracker,
                schema,
                object_store,
                limiter: ConcurrencyLimiter::new(config.max_parallel_steps),
            }),
        }
    }

    /// Compile the definition and persist a new pending run that owns the
    /// resulting plan snapshot. Compile-time failures mean no run row and
    /// no step logs ever exist.
    #[instrument(skip(self, definition), fields(pipeline = %definition.pipeline.slug, tenant = %tenant))]
    pub async fn create_run(
        &self,
        definition: &PipelineDefinition,
        tenant: &TenantId,
        creator: &str,
    ) -> Result<RunModel> {
        let plan = PlanCompiler::compile_with_inclusions(definition)?;

        let run_id = Uuid::new_v4();
        let schema_name = SchemaName::derive(tenant, &plan.pipeline_slug, run_id)?;
        let plan_json = serde_json::to_value(&plan)
            .map_err(|e| Error::Execution(format!("failed to serialize execution plan: {e}")))?;

        let now = Utc::now();
        let run = RunModel {
            id: run_id,
            pipeline_id: plan.pipeline_id.0,
            pipeline_slug: plan.pipeline_slug.clone(),
            tenant_id: tenant.as_str().to_string(),
            creator: creator.to_string(),
            status: RunState::Pending.as_str().to_string(),
            schema_name: schema_name.as_str().to_string(),
            execution_plan: sqlx::types::Json(plan_json),
            error_message: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };

        self.inner.store.create_run(&run).await?;
        info!(run_id = %run_id, steps = plan.step_count(), "Run created");
        Ok(run)
    }

    /// Execute a pending run to a terminal state
    pub async fn execute(&self, run_id: Uuid) -> Result<RunSummary> {
        self.start(run_id, |state| state == RunState::Pending).await
    }

    /// Resume a crashed or failed run; steps whose log rows already show
    /// success are skipped
    pub async fn resume(&self, run_id: Uuid) -> Result<RunSummary> {
        self.start(run_id, |state| state.resumable()).await
    }

    /// Mark a run that died mid-flight as crashed so it becomes resumable
    #[instrument(skip(self))]
    pub async fn mark_crashed(&self, run_id: Uuid) -> Result<()> {
        let run = self.inner.store.get_run(run_id).await?;
        let state = RunState::try_from(run.status.as_str())?;
        if !RunState::is_valid_transition(state, RunState::Crashed) {
            return Err(Error::InvalidState(format!(
                "cannot mark run {run_id} crashed from state {state}"
            )));
        }
        self.inner
            .store
            .update_run_status(run_id, RunState::Crashed.as_str(), None)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, allowed), fields(run_id = %run_id))]
    async fn start(
        &self,
        run_id: Uuid,
        allowed: impl Fn(RunState) -> bool,
    ) -> Result<RunSummary> {
        let run = self.inner.store.get_run(run_id).await?;
        let state = RunState::try_from(run.status.as_str())?;
        if !allowed(state) || !RunState::is_valid_transition(state, RunState::Running) {
            return Err(Error::InvalidState(format!(
                "run {run_id} cannot start from state {state}"
            )));
        }

        let plan: ExecutionPlan = serde_json::from_value(run.execution_plan.0.clone())
            .map_err(|e| Error::Execution(format!("stored execution plan is unreadable: {e}")))?;
        let schema_name = SchemaName::parse(&run.schema_name)?;
        let completed = self.inner.store.successful_step_keys(run_id).await?;

        self.inner
            .store
            .update_run_status(run_id, RunState::Running.as_str(), None)
            .await?;
        info!(groups = plan.groups.len(), skipped = completed.len(), "Run started");

        match self.inner.run_phases(&run, &plan, &schema_name, &completed).await {
            Ok(()) => {
                self.inner
                    .store
                    .update_run_status(run_id, RunState::Succeeded.as_str(), None)
                    .await?;
                RUNS_TOTAL.with_label_values(&["succeeded"]).inc();
                Ok(RunSummary {
                    run_id,
                    state: RunState::Succeeded,
                    error: None,
                })
            }
            Err(failure) => {
                let message = failure.to_string();
                error!(error = %message, "Run failed");
                self.inner
                    .store
                    .update_run_status(run_id, RunState::Failed.as_str(), Some(&message))
                    .await?;
                RUNS_TOTAL.with_label_values(&["failed"]).inc();
                Ok(RunSummary {
                    run_id,
                    state: RunState::Failed,
                    error: Some(message),
                })
            }
        }
    }
}

impl Inner {
    async fn run_phases(
        self: &Arc<Self>,
        run: &RunModel,
        plan: &ExecutionPlan,
        schema_name: &SchemaName,
        completed: &HashSet<StepKey>,
    ) -> Result<()> {
        // Phase 1: the run's schema, itself a tracked step
        let schema_key = (CREATE_SCHEMA_PHASE.to_string(), 0, Uuid::nil());
        if !completed.contains(&schema_key) {
            self.tracker
                .record(run.id, CREATE_SCHEMA_PHASE, 0, Uuid::nil(), || async {
                    self.schema.create_schema(schema_name).await?;
                    Ok::<_, Error>(Some(json!({"schema_name": schema_name.as_str()})))
                })
                .await?;
        }

        // Phase 2: sibling groups, strictly in order
        for (group_index, group) in plan.groups.iter().enumerate() {
            self.ensure_still_running(run.id).await?;
            self.run_group(run, schema_name, group_index, group, completed)
                .await?;
        }

        // Phase 3: quality reports
        for check in &plan.quality_checks {
            let check_key = (StepKind::QualityReport.tag().to_string(), 0, check.id.0);
            if completed.contains(&check_key) {
                continue;
            }
            self.ensure_still_running(run.id).await?;
            self.run_quality_check(run, schema_name, check).await?;
        }

        Ok(())
    }

    /// Dispatch one group's pending members, bounded by the limiter, and
    /// wait for every member to finalize before returning.
    async fn run_group(
        self: &Arc<Self>,
        run: &RunModel,
        schema_name: &SchemaName,
        group_index: usize,
        group: &[StepPlan],
        completed: &HashSet<StepKey>,
    ) -> Result<()> {
        let pending: Vec<StepPlan> = group
            .iter()
            .filter(|step| {
                let key = (step.kind.tag().to_string(), group_index as i32, step.id.0);
                !completed.contains(&key)
            })
            .cloned()
            .collect();

        if pending.is_empty() {
            return Ok(());
        }

        if self.limiter.max_concurrent() <= 1 {
            for step in &pending {
                self.dispatch_step(run, schema_name, group_index, step).await?;
            }
            return Ok(());
        }

        // All members of one group are mutually non-dependent, so the whole
        // group is dispatched up front; an already-dispatched step runs to
        // completion even when a sibling fails.
        let mut tasks = JoinSet::new();
        for step in pending {
            let permit = self.limiter.acquire().await;
            let inner = Arc::clone(self);
            let run = run.clone();
            let schema_name = schema_name.clone();
            tasks.spawn(async move {
                let _permit = permit;
                inner
                    .dispatch_step(&run, &schema_name, group_index, &step)
                    .await
            });
        }

        let mut first_failure: Option<Error> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(step_error)) => {
                    if first_failure.is_none() {
                        first_failure = Some(step_error);
                    }
                }
                Err(join_error) => {
                    if first_failure.is_none() {
                        first_failure =
                            Some(Error::Execution(format!("step task panicked: {join_error}")));
                    }
                }
            }
        }

        match first_failure {
            None => Ok(()),
            Some(failure) => Err(failure),
        }
    }

    /// Run one step through the registry inside its tracked log row,
    /// including the step's post-body validations
    #[instrument(skip(self, run, schema_name, step), fields(run_id = %run.id, step = %step.name, kind = %step.kind, group = group_index))]
    async fn dispatch_step(
        &self,
        run: &RunModel,
        schema_name: &SchemaName,
        group_index: usize,
        step: &StepPlan,
    ) -> Result<()> {
        let started = Instant::now();
        let kind_tag = step.kind.tag();

        let outcome = self
            .tracker
            .record(run.id, kind_tag, group_index as i32, step.id.0, || async {
                let ctx = StepContext {
                    schema: &self.schema,
                    schema_name,
                    object_store: self.object_store.as_ref(),
                };

                let runner = RunnerRegistry::runner_for(step.kind);
                match runner.run(&ctx, step).await? {
                    StepOutcome::Success(payload) => {
                        let mut failures = Vec::new();
                        for validation in &step.validations {
                            if let Some(failure) =
                                ValidationRunner::check(&ctx, &validation.name, &validation.sql)
                                    .await?
                            {
                                warn!(
                                    validation = %failure.name,
                                    failing = failure.failing_ids.len(),
                                    "Step validation failed"
                                );
                                failures.push(failure);
                            }
                        }
                        if failures.is_empty() {
                            Ok(payload)
                        } else {
                            Err(Error::StepValidationFailed {
                                step: step.name.clone(),
                                failures,
                            })
                        }
                    }
                    StepOutcome::ValidationFailed(failures) => Err(Error::StepValidationFailed {
                        step: step.name.clone(),
                        failures,
                    }),
                }
            })
            .await;

        let elapsed = started.elapsed();
        STEP_DURATION_SECONDS
            .with_label_values(&[kind_tag])
            .observe(elapsed.as_secs_f64());
        STEP_EXECUTIONS_TOTAL
            .with_label_values(&[kind_tag, if outcome.is_ok() { "success" } else { "failure" }])
            .inc();

        outcome.map(|_| ())
    }

    async fn run_quality_check(
        &self,
        run: &RunModel,
        schema_name: &SchemaName,
        check: &CheckPlan,
    ) -> Result<()> {
        let kind_tag = StepKind::QualityReport.tag();
        // A check plan is dispatched through the same runner contract as a
        // step; step_index is always 0 for the report phase.
        let as_step = StepPlan {
            id: sluice_core::StepId(check.id.0),
            name: check.name.clone(),
            kind: StepKind::QualityReport,
            sql: check.sql.clone(),
            params: serde_json::Map::new(),
            object_ref: None,
            validations: Vec::new(),
        };

        self.tracker
            .record(run.id, kind_tag, 0, check.id.0, || async {
                let ctx = StepContext {
                    schema: &self.schema,
                    schema_name,
                    object_store: self.object_store.as_ref(),
                };
                match RunnerRegistry::runner_for(StepKind::QualityReport)
                    .run(&ctx, &as_step)
                    .await?
                {
                    StepOutcome::Success(payload) => Ok::<_, Error>(payload),
                    StepOutcome::ValidationFailed(failures) => Err(Error::StepValidationFailed {
                        step: check.name.clone(),
                        failures,
                    }),
                }
            })
            .await
            .map(|_| ())
    }

    /// A run may be externally marked failed between steps; observe that
    /// and stop dispatching.
    async fn ensure_still_running(&self, run_id: Uuid) -> Result<()> {
        let run = self.store.get_run(run_id).await?;
        let state = RunState::try_from(run.status.as_str())?;
        if state != RunState::Running {
            return Err(Error::Execution(format!(
                "run {run_id} was externally marked {state}; halting dispatch"
            )));
        }
        Ok(())
    }
}
