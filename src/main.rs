use std::sync::Arc;

use postbranch::{
    api::start_api_server,
    config::AppConfig,
    observability::{init_observability, log_config_info},
    platform::{CommandRunner, PgCtlBackend, SqlxSourceProbe, ZfsVolumeBackend},
    services::Orchestrator,
    storage::create_pool,
    Result, APP_NAME, VERSION,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before any config is read from the environment
    if let Err(e) = dotenvy::dotenv() {
        if !e.to_string().contains("not found") {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let config = AppConfig::from_env();
    config.validate()?;

    init_observability(&config.observability)?;
    info!(app_name = APP_NAME, version = VERSION, "Starting postbranch control plane");
    log_config_info(&config);

    let db = create_pool(&config.database).await?;

    let runner = CommandRunner::default();
    let volumes = Arc::new(ZfsVolumeBackend::new(runner.clone()));
    let processes = Arc::new(PgCtlBackend::new(runner.clone()));
    let probe = Arc::new(SqlxSourceProbe::new(runner));

    let orchestrator =
        Orchestrator::new(db, config.orchestrator.clone(), volumes, processes, probe);

    // Reconcile persisted state with the host before serving requests
    orchestrator.recover().await?;

    start_api_server(&config.server, orchestrator).await
}
