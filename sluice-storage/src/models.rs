//! Database models for Sluice run metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Run model for database storage
///
/// The execution plan is written once at run creation and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RunModel {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub pipeline_slug: String,
    pub tenant_id: String,
    pub creator: String,
    pub status: String,
    pub schema_name: String,
    pub execution_plan: sqlx::types::Json<serde_json::Value>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One step attempt within a run.
///
/// `(run_id, step_kind, step_index, step_id)` is unique; `completed` is
/// monotonic and never un-sets once true.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RunStepLogModel {
    pub id: Uuid,
    pub run_id: Uuid,
    pub step_kind: String,
    pub step_index: i32,
    pub step_id: Uuid,
    pub completed: bool,
    pub step_result: Option<sqlx::types::Json<serde_json::Value>>,
    pub step_errors: Option<sqlx::types::Json<serde_json::Value>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunStepLogModel {
    /// Completed with no recorded errors
    pub fn successful(&self) -> bool {
        self.completed && self.step_errors.is_none()
    }

    /// Still in flight, or terminated abnormally before finalization
    pub fn running(&self) -> bool {
        !self.completed && self.step_errors.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(completed: bool, errors: Option<serde_json::Value>) -> RunStepLogModel {
        RunStepLogModel {
            id: Uuid::new_v4(),
            run_id: Uuid::new_v4(),
            step_kind: "sql-statement".to_string(),
            step_index: 0,
            step_id: Uuid::new_v4(),
            completed,
            step_result: None,
            step_errors: errors.map(sqlx::types::Json),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_successful_requires_completed_and_no_errors() {
        assert!(log(true, None).successful());
        assert!(!log(false, None).successful());
        assert!(!log(true, Some(serde_json::json!({"message": "boom"}))).successful());
    }

    #[test]
    fn test_running_means_incomplete_without_errors() {
        assert!(log(false, None).running());
        assert!(!log(true, None).running());
        assert!(!log(false, Some(serde_json::json!({"message": "boom"}))).running());
    }
}
