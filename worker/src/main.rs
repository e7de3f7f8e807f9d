//! Tidy Worker - runs reconciliation and cache hygiene for a snapshot file.

use tidy_worker::{load_store, Config, HygieneJob, ReconcileService};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tidy_worker=info,tidy_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(
        snapshot = %config.snapshot_path.display(),
        retention_days = config.like_retention.num_days(),
        interval_secs = config.purge_interval.as_secs(),
        run_once = config.run_once,
        "Starting Tidy worker"
    );

    let store = load_store(&config.snapshot_path).await?;
    let job = HygieneJob::new(ReconcileService::new(store), config);

    job.run(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    })
    .await;

    Ok(())
}
