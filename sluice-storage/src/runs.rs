//! Run and step-log metadata CRUD

use crate::models::{RunModel, RunStepLogModel};
use chrono::Utc;
use sqlx::PgPool;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{instrument, warn};
use uuid::Uuid;

/// Run lifecycle states as stored in the database
pub mod statuses {
    pub const PENDING: &str = "pending";
    pub const RUNNING: &str = "running";
    pub const SUCCEEDED: &str = "succeeded";
    pub const FAILED: &str = "failed";
    pub const CRASHED: &str = "crashed";
}

fn validate_status(status: &str) -> crate::Result<()> {
    match status {
        statuses::PENDING
        | statuses::RUNNING
        | statuses::SUCCEEDED
        | statuses::FAILED
        | statuses::CRASHED => Ok(()),
        _ => Err(crate::Error::ValidationError(format!(
            "Invalid run status: {status}"
        ))),
    }
}

/// Metadata store for runs and their step logs
#[derive(Clone)]
pub struct RunStore {
    pool: PgPool,
}

impl RunStore {
    /// Create a store over the given pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a new run. The execution plan is written here once and never
    /// updated afterwards.
    #[instrument(skip(self, run), fields(run_id = %run.id))]
    pub async fn create_run(&self, run: &RunModel) -> crate::Result<()> {
        validate_status(&run.status)?;

        let started = Instant::now();
        sqlx::query(
            r#"
            INSERT INTO runs (
                id, pipeline_id, pipeline_slug, tenant_id, creator, status,
                schema_name, execution_plan, error_message, started_at,
                completed_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(run.id)
        .bind(run.pipeline_id)
        .bind(&run.pipeline_slug)
        .bind(&run.tenant_id)
        .bind(&run.creator)
        .bind(&run.status)
        .bind(&run.schema_name)
        .bind(&run.execution_plan)
        .bind(&run.error_message)
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(run.created_at)
        .bind(run.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                crate::Error::AlreadyExists(format!("run {}", run.id))
            }
            other => crate::Error::Database(other),
        })?;

        let elapsed = started.elapsed();
        if elapsed.as_millis() > 100 {
            warn!(duration_ms = elapsed.as_millis() as u64, "Slow run insert");
        }
        Ok(())
    }

    /// Fetch one run by id
    #[instrument(skip(self))]
    pub async fn get_run(&self, run_id: Uuid) -> crate::Result<RunModel> {
        sqlx::query_as::<_, RunModel>("SELECT * FROM runs WHERE id = $1")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| crate::Error::NotFound(format!("run {run_id}")))
    }

    /// Update a run's status, stamping started/completed timestamps as the
    /// lifecycle advances
    #[instrument(skip(self))]
    pub async fn update_run_status(
        &self,
        run_id: Uuid,
        status: &str,
        error_message: Option<&str>,
    ) -> crate::Result<()> {
        validate_status(status)?;

        let now = Utc::now();
        let done = sqlx::query(
            r#"
            UPDATE runs
            SET status = $2,
                error_message = $3,
                started_at = CASE WHEN $2 = 'running' AND started_at IS NULL THEN $4 ELSE started_at END,
                completed_at = CASE WHEN $2 IN ('succeeded', 'failed', 'crashed') THEN $4 ELSE completed_at END,
                updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .bind(status)
        .bind(error_message)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if done.rows_affected() == 0 {
            return Err(crate::Error::NotFound(format!("run {run_id}")));
        }
        Ok(())
    }

    /// All step logs for a run, in creation order
    #[instrument(skip(self))]
    pub async fn list_step_logs(&self, run_id: Uuid) -> crate::Result<Vec<RunStepLogModel>> {
        Ok(sqlx::query_as::<_, RunStepLogModel>(
            "SELECT * FROM run_step_logs WHERE run_id = $1 ORDER BY created_at, id",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Find the log row for one step key, if it exists
    pub async fn find_step_log(
        &self,
        run_id: Uuid,
        step_kind: &str,
        step_index: i32,
        step_id: Uuid,
    ) -> crate::Result<Option<RunStepLogModel>> {
        Ok(sqlx::query_as::<_, RunStepLogModel>(
            r#"
            SELECT * FROM run_step_logs
            WHERE run_id = $1 AND step_kind = $2 AND step_index = $3 AND step_id = $4
            "#,
        )
        .bind(run_id)
        .bind(step_kind)
        .bind(step_index)
        .bind(step_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Find-or-create the uniquely keyed log row for one step attempt.
    /// A second call with the same key lands on the same row.
    #[instrument(skip(self))]
    pub async fn upsert_step_log(
        &self,
        run_id: Uuid,
        step_kind: &str,
        step_index: i32,
        step_id: Uuid,
    ) -> crate::Result<RunStepLogModel> {
        let now = Utc::now();
        Ok(sqlx::query_as::<_, RunStepLogModel>(
            r#"
            INSERT INTO run_step_logs (
                id, run_id, step_kind, step_index, step_id, completed,
                step_result, step_errors, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, FALSE, NULL, NULL, $6, $6)
            ON CONFLICT (run_id, step_kind, step_index, step_id)
                DO UPDATE SET updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(run_id)
        .bind(step_kind)
        .bind(step_index)
        .bind(step_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Finalize a log row: mark it completed and overwrite the result and
    /// error payloads atomically. `completed` never un-sets.
    #[instrument(skip(self, step_result, step_errors))]
    pub async fn complete_step_log(
        &self,
        log_id: Uuid,
        step_result: Option<serde_json::Value>,
        step_errors: Option<serde_json::Value>,
    ) -> crate::Result<()> {
        let done = sqlx::query(
            r#"
            UPDATE run_step_logs
            SET completed = TRUE, step_result = $2, step_errors = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(log_id)
        .bind(step_result.map(sqlx::types::Json))
        .bind(step_errors.map(sqlx::types::Json))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if done.rows_affected() == 0 {
            return Err(crate::Error::NotFound(format!("run step log {log_id}")));
        }
        Ok(())
    }

    /// Keys of all steps already recorded successful for a run; used to
    /// skip completed work when a crashed run is resumed
    #[instrument(skip(self))]
    pub async fn successful_step_keys(
        &self,
        run_id: Uuid,
    ) -> crate::Result<HashSet<(String, i32, Uuid)>> {
        let logs = self.list_step_logs(run_id).await?;
        Ok(logs
            .into_iter()
            .filter(RunStepLogModel::successful)
            .map(|log| (log.step_kind, log.step_index, log.step_id))
            .collect())
    }
}
