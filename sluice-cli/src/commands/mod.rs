pub mod migrate;
pub mod resume;
pub mod run;
pub mod status;

use crate::config::Config;
use sluice_cloud_s3::S3ObjectStore;
use sluice_runtime::{OrchestratorConfig, RunOrchestrator};
use sluice_storage::{PoolConfig, RunStore, SchemaContext, StorageEngine};
use std::sync::Arc;

/// Wire up the orchestrator and metadata store from CLI configuration
pub(crate) async fn build_orchestrator(
    config: &Config,
    max_parallel: usize,
    alternate_engine: bool,
) -> anyhow::Result<(RunOrchestrator, RunStore)> {
    let primary = PoolConfig::default().connect(&config.database_url).await?;

    let schema = match &config.alternate_database_url {
        Some(url) => {
            let alternate = PoolConfig::default().connect(url).await?;
            SchemaContext::with_alternate(primary.clone(), alternate)
        }
        None => SchemaContext::new(primary.clone()),
    };
    let schema = if alternate_engine {
        schema.on_engine(StorageEngine::Alternate)?
    } else {
        schema
    };

    let object_store = Arc::new(S3ObjectStore::new(config.store.clone())?);
    let store = RunStore::new(primary);
    let orchestrator = RunOrchestrator::new(
        store.clone(),
        schema,
        object_store,
        OrchestratorConfig {
            max_parallel_steps: max_parallel,
        },
    );

    Ok((orchestrator, store))
}
