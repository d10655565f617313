//! Prometheus metrics for run and step execution

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec,
};

lazy_static! {
    /// Step executions by kind tag and outcome
    pub static ref STEP_EXECUTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "sluice_step_executions_total",
        "Total step executions",
        &["kind", "outcome"]
    )
    .expect("Failed to register sluice_step_executions_total");

    /// Step execution wall time by kind tag
    pub static ref STEP_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "sluice_step_duration_seconds",
        "Step execution duration in seconds",
        &["kind"]
    )
    .expect("Failed to register sluice_step_duration_seconds");

    /// Completed runs by terminal outcome
    pub static ref RUNS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "sluice_runs_total",
        "Total completed runs",
        &["outcome"]
    )
    .expect("Failed to register sluice_runs_total");
}
