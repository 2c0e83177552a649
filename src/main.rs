use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use visit_tracker::api;
use visit_tracker::config::Config;
use visit_tracker::error::AppError;
use visit_tracker::state::AppState;
use visit_tracker::store::InMemoryStore;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let store = Arc::new(InMemoryStore::new());
    if let Some(path) = &config.appointments_seed_file {
        store.load_seed_file(path)?;
    }

    let shared_state = Arc::new(AppState::new(&config, store));
    let app = api::rest::router(shared_state);

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        mileage_rate = config.mileage_rate_per_mile,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
