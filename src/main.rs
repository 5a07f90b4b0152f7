use anyhow::{Context, Result};
use posture_coach::api::routes::create_routes;
use posture_coach::api::sessions::SessionState;
use posture_coach::config::Settings;
use posture_coach::services::{InMemoryEventLog, ReplayBackend, SessionManager};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env()?;

    // RUST_LOG wins over LOG_LEVEL
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new(format!("{},tower_http=debug", settings.app.log_level))
            }),
        )
        .init();

    info!(
        environment = %settings.app.environment,
        recording = %settings.replay.path.display(),
        "Posture coach starting"
    );

    let backend = Arc::new(ReplayBackend::new(
        settings.replay.clone(),
        settings.pipeline.nominal_fps,
    ));
    let events = Arc::new(InMemoryEventLog::new(&settings.event_log));
    let sessions = Arc::new(SessionManager::new(
        backend,
        events.clone(),
        settings.pipeline.clone(),
    ));

    let state = Arc::new(SessionState {
        sessions: Arc::clone(&sessions),
        events,
        stream: settings.stream.clone(),
    });
    let app = create_routes(state);

    let address = settings.app.server_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("Posture coach listening on http://{}", address);
    info!("Health check available at http://{}/health", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
            // ends open video feeds so the server can drain
            sessions.shutdown().await;
        })
        .await?;

    Ok(())
}
