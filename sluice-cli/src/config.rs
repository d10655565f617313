//! CLI configuration management

use anyhow::Context;
use sluice_cloud_s3::S3Config;

/// CLI configuration, loaded from flags and environment
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub alternate_database_url: Option<String>,
    pub store: S3Config,
}

impl Config {
    /// Resolve configuration: the `--database-url` flag wins, then
    /// `DATABASE_URL`; the alternate engine and object store come from
    /// `SLUICE_ALTERNATE_DATABASE_URL` and `SLUICE_STORE_*`.
    pub fn load(database_url_flag: Option<String>) -> anyhow::Result<Self> {
        let database_url = database_url_flag
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .context("DATABASE_URL must be set (flag or environment)")?;

        Ok(Self {
            database_url,
            alternate_database_url: std::env::var("SLUICE_ALTERNATE_DATABASE_URL").ok(),
            store: S3Config::from_env().context("invalid object-store configuration")?,
        })
    }
}
