use crate::config::Config;
use anyhow::Context;
use sluice_runtime::RunState;
use uuid::Uuid;

pub async fn execute(
    config: &Config,
    run_id: &str,
    mark_crashed: bool,
    max_parallel: usize,
    alternate_engine: bool,
) -> anyhow::Result<()> {
    let run_id: Uuid = run_id.parse().context("run id must be a UUID")?;
    let (orchestrator, _store) =
        super::build_orchestrator(config, max_parallel, alternate_engine).await?;

    if mark_crashed {
        orchestrator.mark_crashed(run_id).await?;
        println!("Run {run_id} marked crashed.");
    }

    let summary = orchestrator.resume(run_id).await?;
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
