//! Sluice CLI tool

use clap::{Parser, Subcommand};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "sluice")]
#[command(author, version, about = "Sluice pipeline orchestration CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations on the metadata store
    Migrate,

    /// Compile a pipeline definition file and execute a run of it
    Run {
        /// Path to a pipeline definition JSON file
        definition_file: String,

        /// Tenant the run executes for
        #[arg(long, env = "SLUICE_TENANT_ID")]
        tenant: String,

        /// Creator identity recorded on the run
        #[arg(long, default_value = "cli")]
        creator: String,

        /// Upper bound on concurrently executing steps within one group
        #[arg(long, default_value_t = 1)]
        max_parallel: usize,

        /// Execute against the tenant's alternate storage engine
        #[arg(long)]
        alternate_engine: bool,
    },

    /// Resume a crashed or failed run, skipping successful steps
    Resume {
        /// Run ID to resume
        run_id: String,

        /// Mark a stale `running` run as crashed before resuming
        #[arg(long)]
        mark_crashed: bool,

        #[arg(long, default_value_t = 1)]
        max_parallel: usize,

        #[arg(long)]
        alternate_engine: bool,
    },

    /// Show a run's status and its step logs
    Status {
        /// Run ID to inspect
        run_id: String,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = config::Config::load(cli.database_url)?;

    match cli.command {
        Commands::Migrate => commands::migrate::execute(&config).await,
        Commands::Run {
            definition_file,
            tenant,
            creator,
            max_parallel,
            alternate_engine,
        } => {
            commands::run::execute(
                &config,
                &definition_file,
                &tenant,
                &creator,
                max_parallel,
                alternate_engine,
            )
            .await
        }
        Commands::Resume {
            run_id,
            mark_crashed,
            max_parallel,
            alternate_engine,
        } => {
            commands::resume::execute(&config, &run_id, mark_crashed, max_parallel, alternate_engine)
                .await
        }
        Commands::Status { run_id } => commands::status::execute(&config, &run_id).await,
    }
}
