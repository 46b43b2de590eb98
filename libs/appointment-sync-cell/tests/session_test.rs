mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use assert_matches::assert_matches;
use chrono::Duration;

use appointment_sync_cell::clock::ManualClock;
use appointment_sync_cell::models::{Actor, AppointmentStatus};
use appointment_sync_cell::services::{SessionManager, SessionSettings, TriageSession};
use shared_models::error::AppError;

use common::{appointment, base_time, StaticGateway, DOCTOR_ID, TOKEN};

fn session_with(gateway: Arc<StaticGateway>) -> Arc<TriageSession> {
    TriageSession::new(
        Actor::doctor(DOCTOR_ID, TOKEN),
        gateway,
        Arc::new(ManualClock::new(base_time())),
        SessionSettings::default(),
    )
}

fn triage_list() -> Vec<appointment_sync_cell::models::Appointment> {
    let now = base_time();
    vec![
        appointment("a1", AppointmentStatus::Pending, now + Duration::hours(2)),
        appointment("a2", AppointmentStatus::Pending, now + Duration::hours(3)),
        appointment("a3", AppointmentStatus::Confirmed, now + Duration::hours(4)),
    ]
}

#[tokio::test]
async fn test_activation_requires_doctor() {
    let session = TriageSession::new(
        Actor::new("p-1", Some("patient"), TOKEN),
        StaticGateway::with(Vec::new()),
        Arc::new(ManualClock::new(base_time())),
        SessionSettings::default(),
    );

    assert_matches!(session.activate().await, Err(AppError::Auth(_)));
    assert!(!session.is_active());
}

#[tokio::test]
async fn test_leases_are_counted() {
    let gateway = StaticGateway::with(triage_list());
    let session = session_with(gateway.clone());

    let first = session.activate().await.unwrap();
    let second = session.activate().await.unwrap();

    assert!(first.initial_error().is_none());
    assert_eq!(gateway.list_calls(), 1);
    assert!(session.bridge().is_running());
    assert!(session.scheduler().is_running());
    assert_eq!(session.snapshot().await.appointments.len(), 3);

    drop(first);
    assert!(session.is_active());
    assert!(session.scheduler().is_running());

    second.release();
    assert!(!session.is_active());
    assert!(!session.bridge().is_running());
    assert!(!session.scheduler().is_running());
}

#[tokio::test]
async fn test_failed_initial_refresh_still_activates() {
    let gateway = StaticGateway::with(triage_list());
    gateway.fail_lists(true);
    let session = session_with(gateway.clone());

    let lease = session.activate().await.unwrap();

    assert_matches!(lease.initial_error(), Some(AppError::Network(_)));
    assert!(session.snapshot().await.appointments.is_empty());
    assert!(session.bridge().is_running());

    gateway.fail_lists(false);
    session.refresh().await.unwrap();
    assert_eq!(session.counts().await.pending, 2);
}

#[tokio::test]
async fn test_confirm_moves_view_to_confirmed_tab() {
    let gateway = StaticGateway::with(triage_list());
    let session = session_with(gateway.clone());
    let _lease = session.activate().await.unwrap();

    assert_eq!(session.view().await.active_tab, AppointmentStatus::Pending);

    let view = session.confirm("a1").await.unwrap();

    assert_eq!(view.active_tab, AppointmentStatus::Confirmed);
    assert_eq!(view.counts.pending, 1);
    assert_eq!(view.counts.confirmed, 2);
    let ids: Vec<&str> = view.appointments.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "a3"]);
    assert_eq!(gateway.status_updates(), vec![("a1".to_string(), AppointmentStatus::Confirmed)]);
}

#[tokio::test]
async fn test_cancel_moves_view_to_cancelled_tab() {
    let session = session_with(StaticGateway::with(triage_list()));
    let _lease = session.activate().await.unwrap();

    let view = session.cancel("a2", "Patient request").await.unwrap();

    assert_eq!(view.active_tab, AppointmentStatus::Cancelled);
    assert_eq!(view.appointments.len(), 1);
    assert_eq!(view.appointments[0].cancellation_reason.as_deref(), Some("Patient request"));
}

#[tokio::test]
async fn test_set_view_filters_and_rejects_unknown_tabs() {
    let session = session_with(StaticGateway::with(triage_list()));
    let _lease = session.activate().await.unwrap();

    let view = session
        .set_view(AppointmentStatus::Pending, "patient a2")
        .await
        .unwrap();
    assert_eq!(view.appointments.len(), 1);
    assert_eq!(view.search_query, "patient a2");

    let rejected = session.set_view(AppointmentStatus::Completed, "").await;
    assert_matches!(rejected, Err(AppError::ValidationError(_)));
    assert_eq!(session.view_state().active_tab, AppointmentStatus::Pending);
}

#[tokio::test]
async fn test_activation_scans_the_fresh_snapshot() {
    let now = base_time();
    let session = session_with(StaticGateway::with(vec![appointment(
        "soon",
        AppointmentStatus::Confirmed,
        now + Duration::seconds(30),
    )]));

    let _lease = session.activate().await.unwrap();

    for _ in 0..100 {
        if !session.notifications().recent().is_empty() {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }

    let notifications = session.notifications().recent();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].title, "Appointment starting now");
}

#[tokio::test]
async fn test_removal_round_trip_through_session() {
    let session = session_with(StaticGateway::with(triage_list()));
    let _lease = session.activate().await.unwrap();

    let ticket = session.request_removal("a3").await.unwrap();
    let view = session.confirm_removal(ticket.token).await.unwrap();

    assert_eq!(view.counts.total, 2);
    assert_eq!(*session.pending_count().borrow(), 2);
}

#[tokio::test]
async fn test_manager_replaces_session_on_actor_change() {
    let gateway = StaticGateway::with(triage_list());
    let manager = SessionManager::new(
        gateway,
        Arc::new(ManualClock::new(base_time())),
        SessionSettings::default(),
    );

    let (first, warning) = manager.activate(Actor::doctor(DOCTOR_ID, TOKEN)).await.unwrap();
    assert!(warning.is_none());

    let (again, _) = manager.activate(Actor::doctor(DOCTOR_ID, TOKEN)).await.unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    let (second, _) = manager.activate(Actor::doctor("doc-2", "token-2")).await.unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert!(!first.is_active());
    assert!(!first.connection().is_open());
    assert!(second.is_active());
    assert_matches!(manager.session_for(DOCTOR_ID).await, Err(AppError::Auth(_)));
    assert!(manager.session_for("doc-2").await.is_ok());

    assert!(manager.deactivate().await);
    assert!(!second.is_active());
    assert_matches!(manager.session_for("doc-2").await, Err(AppError::NotFound(_)));
    assert!(!manager.deactivate().await);
}

#[tokio::test]
async fn test_patient_history_is_never_an_error() {
    let session = session_with(StaticGateway::with(Vec::new()));

    let history = session.patient_history("patient-a1").await;

    assert_eq!(history.patient_id, "patient-a1");
    assert!(history.records.is_empty());
    assert!(history.prescriptions.is_empty());
}

#[tokio::test]
async fn test_refreshed_token_keeps_session_and_reminder_history() {
    let now = base_time();
    let gateway = StaticGateway::with(vec![appointment(
        "soon",
        AppointmentStatus::Confirmed,
        now + Duration::seconds(30),
    )]);
    let manager = SessionManager::new(
        gateway,
        Arc::new(ManualClock::new(now)),
        SessionSettings::default(),
    );

    let (first, _) = manager.activate(Actor::doctor(DOCTOR_ID, "token-1")).await.unwrap();
    for _ in 0..100 {
        if !first.notifications().recent().is_empty() {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    assert_eq!(first.notifications().recent().len(), 1);

    let (second, _) = manager.activate(Actor::doctor(DOCTOR_ID, "token-2")).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(second.is_active());
    assert!(second.connection().is_open());
    assert!(second.bridge().is_running());
    assert_eq!(second.actor().token, "token-2");
    assert!(second.scheduler().scan_at(now).await.is_empty());
    assert_eq!(second.notifications().recent().len(), 1);

    manager.deactivate().await;
}
