//! S3-backed object store
//!
//! One opendal operator is built per bucket on demand; the adapter itself
//! stays stateless beyond its configuration. Anonymous access is allowed
//! when no credentials are configured (MinIO-style development setups).

use async_trait::async_trait;
use futures::StreamExt;
use opendal::{services::S3, Operator};
use sluice_runtime::{ByteStream, ObjectStore, ObjectStoreError};
use tracing::{debug, instrument};

/// Connection settings for the S3-compatible store
#[derive(Debug, Clone, Default)]
pub struct S3Config {
    /// Custom endpoint for S3-compatible stores; AWS when unset
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl S3Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SLUICE_STORE_ENDPOINT`: custom endpoint (optional)
    /// - `SLUICE_STORE_REGION`: region (default: us-east-1)
    /// - `SLUICE_STORE_ACCESS_KEY_ID` / `SLUICE_STORE_SECRET_ACCESS_KEY`:
    ///   credentials; anonymous access when absent
    pub fn from_env() -> crate::Result<Self> {
        let config = Self {
            endpoint: std::env::var("SLUICE_STORE_ENDPOINT").ok(),
            region: std::env::var("SLUICE_STORE_REGION")
                .unwrap_or_else(|_| "us-east-1".to_string()),
            access_key_id: std::env::var("SLUICE_STORE_ACCESS_KEY_ID").ok(),
            secret_access_key: std::env::var("SLUICE_STORE_SECRET_ACCESS_KEY").ok(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.region.trim().is_empty() {
            return Err(crate::Error::Config("region cannot be empty".to_string()));
        }
        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(crate::Error::Config(
                "access_key_id and secret_access_key must be set together".to_string(),
            ));
        }
        Ok(())
    }
}

/// S3-compatible implementation of the runtime's object-store contract
pub struct S3ObjectStore {
    config: S3Config,
}

impl S3ObjectStore {
    /// Create a store from validated configuration
    pub fn new(config: S3Config) -> crate::Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    fn operator(&self, bucket: &str) -> Result<Operator, ObjectStoreError> {
        let mut builder = S3::default()
            .bucket(bucket)
            .region(&self.config.region);

        if let Some(endpoint) = &self.config.endpoint {
            builder = builder.endpoint(endpoint);
        }
        match (&self.config.access_key_id, &self.config.secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => {
                builder = builder
                    .access_key_id(access_key_id)
                    .secret_access_key(secret_access_key);
            }
            _ => {
                builder = builder.allow_anonymous().disable_config_load().disable_ec2_metadata();
            }
        }

        Ok(Operator::new(builder)
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?
            .finish())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn fetch(&self, bucket: &str, key: &str) -> Result<ByteStream, ObjectStoreError> {
        let operator = self.operator(bucket)?;
        fetch_with_operator(&operator, bucket, key).await
    }

    #[instrument(skip(self, content))]
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        content: ByteStream,
        content_length: u64,
    ) -> Result<(), ObjectStoreError> {
        let operator = self.operator(bucket)?;
        upload_with_operator(&operator, bucket, key, content, content_length).await
    }
}

/// Fetch one object through an already-built operator
pub async fn fetch_with_operator(
    operator: &Operator,
    bucket: &str,
    key: &str,
) -> Result<ByteStream, ObjectStoreError> {
    let metadata = operator.stat(key).await.map_err(|e| map_error(e, bucket, key))?;
    let content_length = metadata.content_length();

    let reader = operator
        .reader(key)
        .await
        .map_err(|e| map_error(e, bucket, key))?;
    let stream = reader
        .into_bytes_stream(0..content_length)
        .await
        .map_err(|e| map_error(e, bucket, key))?;

    debug!(bucket, key, content_length, "Object fetched");
    Ok(stream.boxed())
}

/// Upload one object through an already-built operator. The declared
/// content length is verified against the bytes actually streamed.
pub async fn upload_with_operator(
    operator: &Operator,
    bucket: &str,
    key: &str,
    mut content: ByteStream,
    content_length: u64,
) -> Result<(), ObjectStoreError> {
    let mut writer = operator
        .writer(key)
        .await
        .map_err(|e| map_error(e, bucket, key))?;

    let mut written = 0u64;
    while let Some(chunk) = content.next().await {
        let chunk =
            chunk.map_err(|e| ObjectStoreError::Backend(format!("upload source failed: {e}")))?;
        written += chunk.len() as u64;
        writer
            .write(chunk)
            .await
            .map_err(|e| map_error(e, bucket, key))?;
    }
    writer.close().await.map_err(|e| map_error(e, bucket, key))?;

    if written != content_length {
        return Err(ObjectStoreError::Backend(format!(
            "upload of store://{bucket}/{key} streamed {written} bytes but declared {content_length}"
        )));
    }

    debug!(bucket, key, written, "Object uploaded");
    Ok(())
}

fn map_error(error: opendal::Error, bucket: &str, key: &str) -> ObjectStoreError {
    if error.kind() == opendal::ErrorKind::NotFound {
        ObjectStoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    } else {
        ObjectStoreError::Backend(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(S3Config {
            region: "us-east-1".to_string(),
            ..Default::default()
        }
        .validate()
        .is_ok());

        assert!(S3Config {
            region: "".to_string(),
            ..Default::default()
        }
        .validate()
        .is_err());

        assert!(S3Config {
            region: "us-east-1".to_string(),
            access_key_id: Some("key".to_string()),
            secret_access_key: None,
            ..Default::default()
        }
        .validate()
        .is_err());
    }

    #[tokio::test]
    async fn test_memory_operator_round_trip() {
        use bytes::Bytes;
        use futures::stream;

        let operator = Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish();

        let body = Bytes::from_static(b"id,label\n1,widget\n");
        let source = stream::iter(vec![Ok(body.clone())]).boxed();
        upload_with_operator(&operator, "mem", "loads/widgets.csv", source, body.len() as u64)
            .await
            .unwrap();

        let fetched = fetch_with_operator(&operator, "mem", "loads/widgets.csv")
            .await
            .unwrap();
        let chunks: Vec<Bytes> = futures::TryStreamExt::try_collect(fetched).await.unwrap();
        assert_eq!(chunks.concat(), body);
    }

    #[tokio::test]
    async fn test_fetch_missing_object_is_not_found() {
        let operator = Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish();

        let err = fetch_with_operator(&operator, "mem", "absent/file.csv")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ObjectStoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_upload_length_mismatch_is_rejected() {
        use bytes::Bytes;
        use futures::stream;

        let operator = Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish();

        let source = stream::iter(vec![Ok(Bytes::from_static(b"short"))]).boxed();
        let err = upload_with_operator(&operator, "mem", "loads/widgets.csv", source, 999)
            .await
            .unwrap_err();
        assert!(matches!(err, ObjectStoreError::Backend(_)));
    }
}
