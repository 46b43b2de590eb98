use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::*;

pub fn triage_routes(state: Arc<TriageState>) -> Router {
    Router::new()
        .route("/session", post(activate_session).delete(end_session))
        .route("/appointments", get(list_appointments))
        .route("/appointments/counts", get(get_counts))
        .route("/appointments/view", get(get_view).put(update_view))
        .route("/appointments/refresh", post(refresh_appointments))
        .route("/appointments/{id}/confirm", post(confirm_appointment))
        .route("/appointments/{id}/reschedule", post(reschedule_appointment))
        .route("/appointments/{id}/cancel", post(cancel_appointment))
        .route("/appointments/{id}/removal", post(request_removal))
        .route("/appointments/removals/{token}", delete(confirm_removal))
        .route("/appointments/removals/{token}/abandon", post(abandon_removal))
        .route("/patients/{patient_id}/history", get(patient_history))
        .route("/realtime/events", post(publish_event))
        .route("/notifications", get(list_notifications))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
