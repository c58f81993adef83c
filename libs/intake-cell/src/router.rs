// libs/intake-cell/src/router.rs
use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;

/// Intake routes, to be nested under `/intake`.
pub fn intake_routes(state: IntakeState) -> Router {
    Router::new()
        .route("/query", post(handle_query))
        .route("/transcript", post(process_transcript))
        .route("/appointments/commit", post(commit_appointment))
        .route("/filters/commit", post(commit_filters))
        .route("/filters/{filter_set_id}", get(get_filter_set))
        .with_state(state)
}
