use std::sync::Arc;

use assert_matches::assert_matches;
use axum::{
    body::Body,
    extract::{Extension, Path, State},
    http::{header, Method, Request, StatusCode},
    Json, Router,
};
use axum_extra::TypedHeader;
use chrono::{Duration, Utc};
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_sync_cell::handlers::*;
use appointment_sync_cell::models::{AppointmentStatus, ViewState};
use appointment_sync_cell::router::triage_routes;
use appointment_sync_cell::services::{RestAppointmentGateway, SessionManager, SessionSettings};
use appointment_sync_cell::SystemClock;
use shared_models::{auth::User, error::AppError};
use shared_utils::test_utils::{JwtTestUtils, MockApiResponses, TestConfig, TestUser};

fn create_test_user_extension(user: &TestUser) -> Extension<User> {
    Extension(user.to_user())
}

fn create_auth_header(token: &str) -> TypedHeader<Authorization<Bearer>> {
    let auth = Authorization::bearer(token).unwrap();
    TypedHeader(auth)
}

fn state_for(server: &MockServer) -> Arc<TriageState> {
    let config = TestConfig::with_api_url(&server.uri()).to_arc();
    let gateway = Arc::new(RestAppointmentGateway::new(&config));
    let sessions = Arc::new(SessionManager::new(
        gateway,
        Arc::new(SystemClock),
        SessionSettings::from_config(&config),
    ));
    Arc::new(TriageState::new(config, sessions))
}

async fn mount_appointments(server: &MockServer, doctor_id: &str) {
    let soon = Utc::now() + Duration::hours(2);
    let mut pending = MockApiResponses::appointment_response("a1", "patient-1", doctor_id, soon, "PENDING");
    pending["patientName"] = json!("Aoife Murphy");
    let mut confirmed = MockApiResponses::appointment_response("a2", "patient-2", doctor_id, soon, "CONFIRMED");
    confirmed["patientName"] = json!("Sean Kelly");

    Mock::given(method("GET"))
        .and(path("/appointments"))
        .and(query_param("doctorId", doctor_id))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([pending, confirmed])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_activate_session_returns_initial_view() {
    let server = MockServer::start().await;
    let doctor = TestUser::doctor("doctor@example.com");
    mount_appointments(&server, &doctor.id).await;
    let state = state_for(&server);

    let Json(body) = activate_session(
        State(state.clone()),
        create_auth_header("doctor-token"),
        create_test_user_extension(&doctor),
    )
    .await
    .unwrap();

    assert_eq!(body["doctorId"], doctor.id.as_str());
    assert_eq!(body["active"], true);
    assert_eq!(body["view"]["activeTab"], "PENDING");
    assert_eq!(body["view"]["counts"]["total"], 2);
    assert_eq!(body["view"]["appointments"][0]["patientName"], "Aoife Murphy");
    assert!(body["warning"].is_null());

    state.sessions.deactivate().await;
}

#[tokio::test]
async fn test_activate_session_rejects_patients() {
    let server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com");
    let state = state_for(&server);

    let result = activate_session(
        State(state),
        create_auth_header("patient-token"),
        create_test_user_extension(&patient),
    )
    .await;

    assert_matches!(result, Err(AppError::Auth(_)));
}

#[tokio::test]
async fn test_handlers_require_an_active_session() {
    let server = MockServer::start().await;
    let doctor = TestUser::doctor("doctor@example.com");
    let state = state_for(&server);

    let result = get_view(State(state), create_test_user_extension(&doctor)).await;

    assert_matches!(result, Err(AppError::NotFound(_)));
}

#[tokio::test]
async fn test_confirm_switches_tab() {
    let server = MockServer::start().await;
    let doctor = TestUser::doctor("doctor@example.com");
    mount_appointments(&server, &doctor.id).await;

    Mock::given(method("PATCH"))
        .and(path("/appointments/a1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let state = state_for(&server);
    activate_session(
        State(state.clone()),
        create_auth_header("doctor-token"),
        create_test_user_extension(&doctor),
    )
    .await
    .unwrap();

    let Json(view) = confirm_appointment(
        State(state.clone()),
        create_test_user_extension(&doctor),
        Path("a1".to_string()),
    )
    .await
    .unwrap();

    assert_eq!(view["activeTab"], "CONFIRMED");

    let Json(updated) = update_view(
        State(state.clone()),
        create_test_user_extension(&doctor),
        Json(ViewState {
            active_tab: AppointmentStatus::Confirmed,
            search_query: "kelly".to_string(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(updated["appointments"].as_array().unwrap().len(), 1);
    assert_eq!(updated["appointments"][0]["id"], "a2");

    state.sessions.deactivate().await;
}

#[tokio::test]
async fn test_patient_history_degrades_to_empty_lists() {
    let server = MockServer::start().await;
    let doctor = TestUser::doctor("doctor@example.com");
    mount_appointments(&server, &doctor.id).await;

    Mock::given(method("GET"))
        .and(path("/patient-records/patient-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockApiResponses::patient_record_response("patient-1", "Hypertension"),
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/prescriptions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let state = state_for(&server);
    activate_session(
        State(state.clone()),
        create_auth_header("doctor-token"),
        create_test_user_extension(&doctor),
    )
    .await
    .unwrap();

    let Json(history) = patient_history(
        State(state.clone()),
        create_test_user_extension(&doctor),
        Path("patient-1".to_string()),
    )
    .await
    .unwrap();

    assert_eq!(history["records"].as_array().unwrap().len(), 1);
    assert!(history["prescriptions"].as_array().unwrap().is_empty());

    state.sessions.deactivate().await;
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn authorized(method: Method, uri: &str, token: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap()
}

#[tokio::test]
async fn test_routes_reject_missing_token() {
    let server = MockServer::start().await;
    let app = triage_routes(state_for(&server));

    let request = Request::builder()
        .uri("/appointments/view")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["title"], "Session expired");
}

#[tokio::test]
async fn test_routes_reject_bad_signature() {
    let server = MockServer::start().await;
    let app = triage_routes(state_for(&server));
    let token = JwtTestUtils::create_invalid_signature_token(&TestUser::doctor("doctor@example.com"));

    let (status, _) = send(&app, authorized(Method::POST, "/session", &token, Body::empty())).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_routes_session_flow() {
    let server = MockServer::start().await;
    let config = TestConfig::default();
    let doctor = TestUser::doctor("doctor@example.com");
    let token = JwtTestUtils::create_test_token(&doctor, &config.jwt_secret, None);
    mount_appointments(&server, &doctor.id).await;

    let state = state_for(&server);
    let app = triage_routes(state.clone());

    let (status, body) = send(&app, authorized(Method::POST, "/session", &token, Body::empty())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["doctorId"], doctor.id.as_str());

    let (status, counts) = send(
        &app,
        authorized(Method::GET, "/appointments/counts", &token, Body::empty()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(counts["pending"], 1);
    assert_eq!(counts["confirmed"], 1);

    let (status, _) = send(
        &app,
        authorized(Method::POST, "/realtime/events", &token, Body::from("not a frame")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let frame = json!({
        "event": "appointment:statusUpdated",
        "payload": { "doctorId": doctor.id, "status": "CONFIRMED" }
    });
    let (status, delivered) = send(
        &app,
        authorized(Method::POST, "/realtime/events", &token, Body::from(frame.to_string())),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(delivered["delivered"], 1);

    let (status, ended) = send(&app, authorized(Method::DELETE, "/session", &token, Body::empty())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ended["ended"], true);
}
