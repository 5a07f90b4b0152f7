use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::health::health_check;
use super::sessions::{session_routes, SessionState};

pub fn create_routes(state: Arc<SessionState>) -> Router {
    let api_v1 = Router::new().nest("/sessions", session_routes(state));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
