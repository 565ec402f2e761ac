use std::process::ExitCode;

use countersign::api::{api_router, ApiContext};
use countersign::config::{self, ReconcileConfig};
use countersign::db::sqlite::open_database;
use countersign::pipeline::reconcile::ReconciliationPipeline;

fn main() -> ExitCode {
    countersign::init_tracing();
    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Countersign stopped");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ReconcileConfig::from_env()?;

    // Migrate once up front so a broken schema fails before we bind.
    open_database(&config.database_path)?;

    // Built outside the runtime: the HTTP collaborators use blocking clients.
    let pipeline = ReconciliationPipeline::from_config(&config)?;
    let ctx = ApiContext::new(pipeline, &config.database_path);

    // The context outlives the runtime so the last pipeline handle is never
    // dropped on an async worker.
    let app = api_router(ctx.clone());
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
        tracing::info!(
            address = %config.bind_address,
            database = %config.database_path.display(),
            assets = %config.asset_dir.display(),
            "Listening"
        );
        axum::serve(listener, app).await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
