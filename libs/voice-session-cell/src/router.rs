// libs/voice-session-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::services::SessionManager;

/// Recording session routes, to be nested under `/voice`.
pub fn voice_session_routes(manager: Arc<SessionManager>) -> Router {
    Router::new()
        .route("/sessions", post(start_session))
        .route("/sessions/{session_id}", get(get_session))
        .route("/sessions/{session_id}/stop", post(stop_session))
        .with_state(manager)
}
