use crate::config::Config;
use anyhow::Context;
use sluice_storage::{PoolConfig, RunStore};
use uuid::Uuid;

pub async fn execute(config: &Config, run_id: &str) -> anyhow::Result<()> {
    let run_id: Uuid = run_id.parse().context("run id must be a UUID")?;
    let pool = PoolConfig::default().connect(&config.database_url).await?;
    let store = RunStore::new(pool);

    let run = store.get_run(run_id).await?;
    println!("Run        {}", run.id);
    println!("Pipeline   {} ({})", run.pipeline_slug, run.pipeline_id);
    println!("Tenant     {}", run.tenant_id);
    println!("Schema     {}", run.schema_name);
    println!("Status     {}", run.status);
    if let Some(error) = &run.error_message {
        println!("Error      {error}");
    }

    let logs = store.list_step_logs(run_id).await?;
    if logs.is_empty() {
        println!("No step logs recorded.");
        return Ok(());
    }

    println!("\n{:<18} {:>5} {:>38} {:>10}", "KIND", "GROUP", "STEP", "STATE");
    for log in logs {
        let state = if log.successful() {
            "ok"
        } else if log.running() {
            "running"
        } else {
            "failed"
        };
        println!(
            "{:<18} {:>5} {:>38} {:>10}",
            log.step_kind, log.step_index, log.step_id, state
        );
    }
    Ok(())
}
