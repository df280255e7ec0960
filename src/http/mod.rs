//! HTTP command surface for external control
//!
//! This module provides a REST API over the session registry:
//! - POST /api/meeting/join - Join a call
//! - POST /api/meeting/leave - Leave a call
//! - GET /api/meeting/active - List joining/active sessions
//! - GET /api/audio/files - List captured files
//! - GET /api/audio/download/:name - Download a captured file
//! - GET /health, GET /api/meeting/health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
