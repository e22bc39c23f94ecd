use clap::Parser;
use dotenvy::dotenv;
use omnibus_agent::cli::{Cli, Commands};
use omnibus_agent::config::{self, database};
use omnibus_agent::core::Agent;
use omnibus_agent::core::kv::UnitStateStore;
use omnibus_agent::errors::Result;
use omnibus_agent::host::Collaborators;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = match &cli.config {
        Some(path) => config::load_config(path),
        None => config::load_default_config(),
    }
    .inspect_err(|e| error!("Failed to load settings: {}", e))?;

    let db = database::create_connection(&database::get_database_url())
        .await
        .inspect_err(|e| error!("Failed to open state database: {}", e))?;
    let store = Arc::new(UnitStateStore::new(db));
    let collaborators = Collaborators::system(&settings);
    let agent = Agent::new(settings, store, collaborators);

    match cli.command {
        Commands::Configure => {
            let applied = agent.configure().await?;
            info!("Configure finished (applied: {})", applied);
        }
        Commands::Upgrade => {
            let upgraded = agent.upgrade().await?;
            info!("Upgrade finished (upgraded: {})", upgraded);
        }
        Commands::Backup => agent.backup().await?,
        Commands::MigrateDb => {
            let outcome = agent.migrate_db().await?;
            info!("Migration finished: {:?}", outcome);
        }
        Commands::ProxyConfigure => agent.configure_proxy().await?,
        Commands::ProxyRemoved => agent.proxy_removed().await?,
        relation => {
            if let Some(change) = relation.into_relation_change() {
                agent.apply_relation(change).await?;
            }
        }
    }
    Ok(())
}
