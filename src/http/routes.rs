use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let capture_root = state.registry.pool().capture_root().to_path_buf();

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        .route("/api/meeting/health", get(handlers::health_check))
        // Call control
        .route("/api/meeting/join", post(handlers::join_meeting))
        .route("/api/meeting/leave", post(handlers::leave_meeting))
        .route("/api/meeting/active", get(handlers::active_meetings))
        // Captured audio
        .route("/api/audio/files", get(handlers::list_audio_files))
        .nest_service("/api/audio/download", ServeDir::new(capture_root))
        .layer(
            ServiceBuilder::new()
                // Request logging
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
