use crate::config::Config;
use anyhow::Context;
use sluice_core::PipelineDefinition;
use sluice_runtime::RunState;
use sluice_storage::TenantId;

pub async fn execute(
    config: &Config,
    definition_file: &str,
    tenant: &str,
    creator: &str,
    max_parallel: usize,
    alternate_engine: bool,
) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(definition_file)
        .with_context(|| format!("failed to read {definition_file}"))?;
    let definition: PipelineDefinition = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse pipeline definition in {definition_file}"))?;

    let tenant = TenantId::new(tenant)?;
    let (orchestrator, _store) =
        super::build_orchestrator(config, max_parallel, alternate_engine).await?;

    let run = orchestrator.create_run(&definition, &tenant, creator).await?;
    println!("Run {} created (schema {}).", run.id, run.schema_name);

    let summary = orchestrator.execute(run.id).await?;
    match summary.state {
        RunState::Succeeded => {
            println!("Run {} succeeded.", summary.run_id);
            Ok(())
        }
        state => {
            if let Some(error) = &summary.error {
                eprintln!("Run {} {}: {}", summary.run_id, state, error);
            }
            anyhow::bail!("run {} finished {}", summary.run_id, state)
        }
    }
}
