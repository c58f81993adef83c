use std::sync::Arc;

use axum::{routing::get, Router};

use intake_cell::{intake_routes, IntakeState};
use voice_session_cell::{voice_session_routes, SessionManager};

pub fn create_router(intake: IntakeState, sessions: Arc<SessionManager>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic intake API is running!" }))
        .nest("/intake", intake_routes(intake))
        .nest("/voice", voice_session_routes(sessions))
}
