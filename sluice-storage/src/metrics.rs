//! Prometheus metrics for storage operations

use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, IntCounterVec};

lazy_static! {
    /// Schema-context operations by operation name and outcome
    pub static ref SCHEMA_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "sluice_schema_operations_total",
        "Total schema-context operations",
        &["operation", "outcome"]
    )
    .expect("Failed to register sluice_schema_operations_total");

    /// Bytes moved through COPY, by direction (in/out)
    pub static ref COPY_BYTES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "sluice_copy_bytes_total",
        "Total bytes streamed through COPY",
        &["direction"]
    )
    .expect("Failed to register sluice_copy_bytes_total");
}
