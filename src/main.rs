mod config;
mod event;
mod routes;
mod services;
mod state;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::RelayConfig::from_env()?;
    if config.moderators.is_empty() {
        tracing::warn!("MODERATOR_IDS not set; moderator commands disabled");
    } else {
        tracing::info!(moderators = config.moderators.len(), "moderator roles loaded");
    }
    let port = config.port;
    let state = state::AppState::new(config);

    // Spawn background cleanup of expired timeouts.
    let _sweeper = services::sweeper::spawn_timeout_sweep_task(state.clone());

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;

    tracing::info!(%port, "chat relay listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("chat relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
