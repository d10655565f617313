use crate::config::Config;
use sluice_storage::PoolConfig;

pub async fn execute(config: &Config) -> anyhow::Result<()> {
    let pool = PoolConfig::default().connect(&config.database_url).await?;
    sluice_storage::migrations::run_migrations(&pool).await?;
    println!("Migrations applied.");
    Ok(())
}
