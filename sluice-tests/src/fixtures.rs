//! Pre-built test data: dependency graphs, sample files, and an in-memory
//! object store

use crate::builders::PipelineDefinitionBuilder;
use async_trait::async_trait;
use bytes::Bytes;
use opendal::Operator;
use sluice_cloud_s3::store::{fetch_with_operator, upload_with_operator};
use sluice_core::PipelineDefinition;
use sluice_runtime::{ByteStream, ObjectStore, ObjectStoreError};

/// A five-step diamond over two depth levels plus one free-standing step:
///
/// ```text
/// least ──> less ─────┐
///   └────> another ──>├──> most      first ──> most      independent
/// ```
pub fn diamond_definition() -> PipelineDefinition {
    PipelineDefinitionBuilder::new("Diamond", "diamond")
        .sql_step("most_dependent", "SELECT 'most'")
        .sql_step("first_child", "SELECT 'first'")
        .sql_step("less_dependent", "SELECT 'less'")
        .sql_step("another_less_dependent", "SELECT 'another'")
        .sql_step("least_dependent", "SELECT 'least'")
        .sql_step("independent", "SELECT 'independent'")
        .dependency("first_child", "most_dependent")
        .dependency("less_dependent", "most_dependent")
        .dependency("another_less_dependent", "most_dependent")
        .dependency("least_dependent", "less_dependent")
        .dependency("least_dependent", "another_less_dependent")
        .build()
}

/// A small CSV import file with a header row
pub fn sample_orders_csv() -> Bytes {
    Bytes::from_static(
        b"Order Id,Customer Name,Order Total\n\
          1001,Amara,120.50\n\
          1002,Bo,89.99\n\
          1003,Chidi,240.00\n",
    )
}

/// In-memory object store for tests; objects are addressed as
/// `{bucket}/{key}` inside one memory backend
pub struct MemoryObjectStore {
    operator: Operator,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        let operator = Operator::new(opendal::services::Memory::default())
            .expect("memory operator")
            .finish();
        Self { operator }
    }

    fn path(bucket: &str, key: &str) -> String {
        format!("{bucket}/{key}")
    }

    /// Seed an object
    pub async fn put(&self, bucket: &str, key: &str, content: Bytes) {
        self.operator
            .write(&Self::path(bucket, key), content)
            .await
            .expect("seed object");
    }

    /// Read an object back out, if present
    pub async fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        match self.operator.read(&Self::path(bucket, key)).await {
            Ok(buffer) => Some(buffer.to_vec()),
            Err(_) => None,
        }
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<ByteStream, ObjectStoreError> {
        fetch_with_operator(&self.operator, bucket, &Self::path(bucket, key))
            .await
            .map_err(|error| match error {
                // Report the caller's key, not the internal path
                ObjectStoreError::NotFound { .. } => ObjectStoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                },
                other => other,
            })
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        content: ByteStream,
        content_length: u64,
    ) -> Result<(), ObjectStoreError> {
        upload_with_operator(
            &self.operator,
            bucket,
            &Self::path(bucket, key),
            content,
            content_length,
        )
        .await
    }
}
