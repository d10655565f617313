//! Per-step outcome tracking
//!
//! [`RunStepTracker::record`] is a scoped acquisition around one step
//! attempt: it finds or creates the uniquely keyed log row, runs the body,
//! and finalizes the row before returning — result payload on success,
//! error payload on failure (the failure is then re-raised). Because
//! successful rows are skipped on resume, a crashed run can be re-entered
//! safely.

use crate::runs::RunStore;
use std::future::Future;
use tracing::instrument;
use uuid::Uuid;

/// Structured error payloads for step logs.
///
/// Implemented by the caller's error type so that rich failures (for
/// example a business-rule validation carrying the offending row ids) are
/// captured as data rather than flattened into a message string.
pub trait ErrorPayload {
    fn error_payload(&self) -> serde_json::Value;
}

/// Records one log row per step attempt
#[derive(Clone)]
pub struct RunStepTracker {
    store: RunStore,
}

impl RunStepTracker {
    /// Create a tracker over the given store
    pub fn new(store: RunStore) -> Self {
        Self { store }
    }

    /// Run `body` with its outcome recorded against the `(run, step_kind,
    /// step_index, step_id)` log row.
    ///
    /// On success the row is marked completed with the body's result
    /// payload; on failure it is marked completed with the error payload
    /// and the error is re-raised. Calling twice with the same key reuses
    /// the row and overwrites its outcome.
    #[instrument(skip(self, body), fields(run_id = %run_id, step_kind = step_kind, step_index = step_index, step_id = %step_id))]
    pub async fn record<F, Fut, E>(
        &self,
        run_id: Uuid,
        step_kind: &str,
        step_index: i32,
        step_id: Uuid,
        body: F,
    ) -> std::result::Result<Option<serde_json::Value>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<serde_json::Value>, E>>,
        E: ErrorPayload + From<crate::Error>,
    {
        let log = self
            .store
            .upsert_step_log(run_id, step_kind, step_index, step_id)
            .await
            .map_err(E::from)?;

        match body().await {
            Ok(result) => {
                self.store
                    .complete_step_log(log.id, result.clone(), None)
                    .await
                    .map_err(E::from)?;
                Ok(result)
            }
            Err(error) => {
                self.store
                    .complete_step_log(log.id, None, Some(error.error_payload()))
                    .await
                    .map_err(E::from)?;
                Err(error)
            }
        }
    }
}
