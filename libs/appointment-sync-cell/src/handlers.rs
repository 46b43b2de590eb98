use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{Actor, CancelRequest, RescheduleRequest, ViewState};
use crate::services::realtime::RealtimeError;
use crate::services::{SessionManager, TriageSession};

/// Shared state for the triage routes.
pub struct TriageState {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<SessionManager>,
}

impl TriageState {
    pub fn new(config: Arc<AppConfig>, sessions: Arc<SessionManager>) -> Self {
        Self { config, sessions }
    }

    async fn session(&self, user: &User) -> Result<Arc<TriageSession>, AppError> {
        self.sessions.session_for(&user.id).await
    }
}

#[axum::debug_handler]
pub async fn activate_session(
    State(state): State<Arc<TriageState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = Actor::from_user(&user, auth.token());
    let (session, initial_error) = state.sessions.activate(actor).await?;

    Ok(Json(json!({
        "doctorId": session.actor().id,
        "active": session.is_active(),
        "view": session.view().await,
        "warning": initial_error.map(|e| e.user_facing()),
    })))
}

#[axum::debug_handler]
pub async fn end_session(
    State(state): State<Arc<TriageState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    state.session(&user).await?;
    let ended = state.sessions.deactivate().await;

    Ok(Json(json!({ "ended": ended })))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<TriageState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let session = state.session(&user).await?;
    let snapshot = session.snapshot().await;

    Ok(Json(json!(snapshot.as_ref())))
}

#[axum::debug_handler]
pub async fn get_counts(
    State(state): State<Arc<TriageState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let session = state.session(&user).await?;

    Ok(Json(json!(session.counts().await)))
}

#[axum::debug_handler]
pub async fn get_view(
    State(state): State<Arc<TriageState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let session = state.session(&user).await?;

    Ok(Json(json!(session.view().await)))
}

#[axum::debug_handler]
pub async fn update_view(
    State(state): State<Arc<TriageState>>,
    Extension(user): Extension<User>,
    Json(request): Json<ViewState>,
) -> Result<Json<Value>, AppError> {
    let session = state.session(&user).await?;
    let view = session
        .set_view(request.active_tab, &request.search_query)
        .await?;

    Ok(Json(json!(view)))
}

#[axum::debug_handler]
pub async fn refresh_appointments(
    State(state): State<Arc<TriageState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let session = state.session(&user).await?;
    let snapshot = session.refresh().await?;

    Ok(Json(json!(snapshot.as_ref())))
}

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<Arc<TriageState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let session = state.session(&user).await?;

    Ok(Json(json!(session.confirm(&appointment_id).await?)))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<TriageState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
    Json(request): Json<RescheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let session = state.session(&user).await?;
    let view = session
        .reschedule(&appointment_id, request.scheduled_at, request.reason)
        .await?;

    Ok(Json(json!(view)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<TriageState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<Value>, AppError> {
    let session = state.session(&user).await?;
    let view = session
        .cancel(&appointment_id, &request.cancellation_reason)
        .await?;

    Ok(Json(json!(view)))
}

#[axum::debug_handler]
pub async fn request_removal(
    State(state): State<Arc<TriageState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let session = state.session(&user).await?;

    Ok(Json(json!(session.request_removal(&appointment_id).await?)))
}

#[axum::debug_handler]
pub async fn confirm_removal(
    State(state): State<Arc<TriageState>>,
    Extension(user): Extension<User>,
    Path(token): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let session = state.session(&user).await?;

    Ok(Json(json!(session.confirm_removal(token).await?)))
}

#[axum::debug_handler]
pub async fn abandon_removal(
    State(state): State<Arc<TriageState>>,
    Extension(user): Extension<User>,
    Path(token): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let session = state.session(&user).await?;

    Ok(Json(json!({ "abandoned": session.abandon_removal(token) })))
}

#[axum::debug_handler]
pub async fn patient_history(
    State(state): State<Arc<TriageState>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let session = state.session(&user).await?;

    Ok(Json(json!(session.patient_history(&patient_id).await)))
}

/// Entry point for the push transport: accepts one `{event, payload}` frame.
#[axum::debug_handler]
pub async fn publish_event(
    State(state): State<Arc<TriageState>>,
    Extension(user): Extension<User>,
    frame: String,
) -> Result<Json<Value>, AppError> {
    let session = state.session(&user).await?;

    let delivered = session
        .connection()
        .publish_raw(&frame)
        .map_err(|e| match e {
            RealtimeError::InvalidFrame(_) => AppError::ValidationError(e.to_string()),
            RealtimeError::Closed => AppError::Network(e.to_string()),
        })?;

    debug!("Realtime frame delivered to {} subscribers", delivered);
    Ok(Json(json!({ "delivered": delivered })))
}

#[axum::debug_handler]
pub async fn list_notifications(
    State(state): State<Arc<TriageState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let session = state.session(&user).await?;
    let pending_count = *session.pending_count().borrow();

    Ok(Json(json!({
        "notifications": session.notifications().recent(),
        "pendingCount": pending_count,
    })))
}
