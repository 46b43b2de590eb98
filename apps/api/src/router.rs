use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_sync_cell::router::triage_routes;
use appointment_sync_cell::TriageState;

pub fn create_router(state: Arc<TriageState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Appointment triage API is running!" }))
        .merge(triage_routes(state))
}
