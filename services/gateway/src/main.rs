use gateway::snapshots::{run_snapshot_loop, write_snapshot};
use gateway::{AppConfig, AppState, create_router};
use persistence::recovery::recover_repository;
use persistence::Repository;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!(version = simulation::VERSION, "Starting market gateway");

    let config = AppConfig::from_env()?;
    let (repo, report) =
        recover_repository(&config.snapshot.dir, &config.journal, config.repository.clone())?;
    let repo = Arc::new(repo);
    if !report.skipped.is_empty() {
        tracing::warn!(skipped = report.skipped.len(), "some snapshots could not be loaded");
    }
    if config.snapshot.enabled && (report.replayed > 0 || report.discarded > 0) {
        let path = write_snapshot(&repo, &config.snapshot).await?;
        tracing::info!(path = %path.display(), replayed = report.replayed, "recovery checkpoint written");
    }

    let state = AppState::new(repo.clone() as Arc<dyn Repository>, &config);
    if config.seed_listings {
        let added = state.admin.seed_default_listings().await?;
        if added > 0 {
            tracing::info!(added, "seeded default listings");
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let clock_task = tokio::spawn(state.clock.clone().run(shutdown_rx.clone()));
    let snapshot_task = tokio::spawn(run_snapshot_loop(
        repo,
        state.clone(),
        config.snapshot.clone(),
        shutdown_rx,
    ));

    let app = create_router(state);
    let listener = TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutdown requested");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = clock_task.await;
    let _ = snapshot_task.await;
    tracing::info!("Gateway stopped");
    Ok(())
}
