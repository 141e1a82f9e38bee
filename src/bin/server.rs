use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use groupsflow::automation::Orchestrator;
use groupsflow::config::AppConfig;
use groupsflow::storage::Store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("groupsflow.json"));
    let config = AppConfig::load(&config_path)?;
    info!(config = %config_path.display(), port = config.port, "starting");

    let store = Store::new(&config.data_dir)?;
    let port = config.port;
    let orchestrator = Arc::new(Orchestrator::new(config, store));

    groupsflow::run_server(orchestrator, port).await?;
    Ok(())
}
