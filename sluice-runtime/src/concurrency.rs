//! Concurrency control for in-group step execution
//!
//! Members of one sibling group are mutually non-dependent and may run
//! concurrently; the limiter bounds how many are in flight at once. Each
//! in-flight step acquires its own pooled connection, so the bound also
//! caps connection fan-out.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Semaphore-backed limiter for parallel step execution
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl ConcurrencyLimiter {
    /// Create a limiter allowing `max_concurrent` steps in flight
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Acquire a permit for one step execution
    #[tracing::instrument(
        name = "concurrency.acquire",
        skip(self),
        fields(
            max_concurrent = %self.max_concurrent,
            wait_duration_ms = tracing::field::Empty,
        )
    )]
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        let span = tracing::Span::current();
        let start = Instant::now();

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("Semaphore closed unexpectedly");

        span.record("wait_duration_ms", start.elapsed().as_millis() as u64);
        permit
    }

    /// Get the maximum concurrent executions
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Get the current available permits
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
