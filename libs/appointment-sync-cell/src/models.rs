// libs/appointment-sync-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_models::auth::{User, DOCTOR_ROLE};

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    #[serde(alias = "_id")]
    pub id: String,
    pub patient_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor_id: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    #[serde(default)]
    pub patient_name: Option<String>,
}

impl Appointment {
    /// Resolved patient name, or the truncated-id placeholder while unresolved.
    pub fn display_name(&self) -> String {
        match self.patient_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => placeholder_patient_name(&self.patient_id),
        }
    }
}

pub fn placeholder_patient_name(patient_id: &str) -> String {
    let short: String = patient_id.chars().take(8).collect();
    format!("Patient #{}", short)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AppointmentStatus {
    #[serde(alias = "pending")]
    Pending,
    #[serde(alias = "confirmed")]
    Confirmed,
    #[serde(alias = "cancelled")]
    Cancelled,
    #[serde(alias = "completed")]
    Completed,
    #[serde(other)]
    Other,
}

impl AppointmentStatus {
    /// Statuses the reminder scan watches.
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }

    /// Statuses that have a tab in the doctor triage view.
    pub fn is_triage_tab(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Pending | AppointmentStatus::Confirmed | AppointmentStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: &AppointmentStatus) -> bool {
        matches!(
            (self, next),
            (AppointmentStatus::Pending, AppointmentStatus::Confirmed)
                | (AppointmentStatus::Pending, AppointmentStatus::Cancelled)
                | (AppointmentStatus::Confirmed, AppointmentStatus::Cancelled)
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "PENDING"),
            AppointmentStatus::Confirmed => write!(f, "CONFIRMED"),
            AppointmentStatus::Cancelled => write!(f, "CANCELLED"),
            AppointmentStatus::Completed => write!(f, "COMPLETED"),
            AppointmentStatus::Other => write!(f, "OTHER"),
        }
    }
}

/// Committed store contents. Replaced as a whole, never edited in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentSnapshot {
    pub appointments: Vec<Appointment>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub generation: u64,
}

impl AppointmentSnapshot {
    pub fn get(&self, appointment_id: &str) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == appointment_id)
    }

    pub fn pending_count(&self) -> usize {
        self.appointments
            .iter()
            .filter(|a| a.status == AppointmentStatus::Pending)
            .count()
    }
}

// ==============================================================================
// WIRE PAYLOADS
// ==============================================================================

/// `GET /appointments` answers either with a bare array or a wrapped one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AppointmentListPayload {
    List(Vec<Appointment>),
    Wrapped { appointments: Vec<Appointment> },
    Data { data: Vec<Appointment> },
}

impl AppointmentListPayload {
    pub fn into_appointments(self) -> Vec<Appointment> {
        match self {
            AppointmentListPayload::List(list) => list,
            AppointmentListPayload::Wrapped { appointments } => appointments,
            AppointmentListPayload::Data { data } => data,
        }
    }
}

/// Generic list answer: a bare array or `{ "data": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListPayload<T> {
    List(Vec<T>),
    Data { data: Vec<T> },
}

impl<T> ListPayload<T> {
    pub fn into_items(self) -> Vec<T> {
        match self {
            ListPayload::List(items) => items,
            ListPayload::Data { data } => data,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl PatientProfile {
    pub fn display_name(&self) -> Option<String> {
        let direct = self
            .name
            .as_deref()
            .or(self.full_name.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty());

        if let Some(name) = direct {
            return Some(name.to_string());
        }

        let joined = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if joined.is_empty() {
            None
        } else {
            Some(joined)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateBody {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescheduleRequest {
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    #[serde(default)]
    pub cancellation_reason: String,
}

// ==============================================================================
// PATIENT HISTORY
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    #[serde(alias = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    #[serde(alias = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub medication: Option<String>,
    #[serde(default)]
    pub dosage: Option<String>,
    #[serde(default)]
    pub issued_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientHistory {
    pub patient_id: String,
    pub records: Vec<PatientRecord>,
    pub prescriptions: Vec<Prescription>,
}

// ==============================================================================
// NOTIFICATIONS AND REMINDERS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub severity: Severity,
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn new(severity: Severity, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReminderClass {
    #[serde(rename = "15min")]
    Upcoming,
    #[serde(rename = "now")]
    DueNow,
}

impl ReminderClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderClass::Upcoming => "15min",
            ReminderClass::DueNow => "now",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub appointment_id: String,
    pub class: ReminderClass,
    pub scheduled_at: DateTime<Utc>,
    pub patient_name: String,
}

impl Reminder {
    pub fn to_notification(&self, warning_minutes: i64) -> Notification {
        match self.class {
            ReminderClass::Upcoming => Notification::new(
                Severity::Warning,
                "Upcoming appointment",
                format!(
                    "Appointment with {} starts in {} minutes ({} UTC)",
                    self.patient_name,
                    warning_minutes,
                    self.scheduled_at.format("%H:%M")
                ),
            ),
            ReminderClass::DueNow => Notification::new(
                Severity::Info,
                "Appointment starting now",
                format!("Your appointment with {} is due now", self.patient_name),
            ),
        }
    }
}

// ==============================================================================
// REALTIME EVENTS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RealtimeEventKind {
    Created,
    StatusUpdated,
}

impl RealtimeEventKind {
    pub const ALL: [RealtimeEventKind; 2] = [RealtimeEventKind::Created, RealtimeEventKind::StatusUpdated];

    pub fn name(&self) -> &'static str {
        match self {
            RealtimeEventKind::Created => "appointment:created",
            RealtimeEventKind::StatusUpdated => "appointment:statusUpdated",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentCreatedPayload {
    #[serde(default)]
    pub doctor_id: Option<String>,
    #[serde(default)]
    pub patient_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdatedPayload {
    #[serde(default)]
    pub doctor_id: Option<String>,
    #[serde(default)]
    pub appointment_id: Option<String>,
    pub status: AppointmentStatus,
}

/// A server push frame: `{ "event": "<name>", "payload": { ... } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum RealtimeEvent {
    #[serde(rename = "appointment:created")]
    Created(AppointmentCreatedPayload),
    #[serde(rename = "appointment:statusUpdated")]
    StatusUpdated(StatusUpdatedPayload),
}

impl RealtimeEvent {
    pub fn kind(&self) -> RealtimeEventKind {
        match self {
            RealtimeEvent::Created(_) => RealtimeEventKind::Created,
            RealtimeEvent::StatusUpdated(_) => RealtimeEventKind::StatusUpdated,
        }
    }

    pub fn owner(&self) -> Option<&str> {
        match self {
            RealtimeEvent::Created(p) => p.doctor_id.as_deref(),
            RealtimeEvent::StatusUpdated(p) => p.doctor_id.as_deref(),
        }
    }

    pub fn summary(&self) -> Notification {
        match self {
            RealtimeEvent::Created(p) => {
                let body = match p.patient_name.as_deref().map(str::trim) {
                    Some(name) if !name.is_empty() => format!("{} booked a new appointment", name),
                    _ => "A patient booked a new appointment".to_string(),
                };
                Notification::new(Severity::Info, "New appointment request", body)
            }
            RealtimeEvent::StatusUpdated(p) => Notification::new(
                Severity::Info,
                "Appointment updated",
                format!("An appointment was marked {}", p.status.to_string().to_lowercase()),
            ),
        }
    }
}

// ==============================================================================
// SESSION AND VIEW MODELS
// ==============================================================================

/// The signed-in user driving a triage session.
#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    pub id: String,
    pub role: Option<String>,
    pub token: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Option<&str>, token: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.map(str::to_string),
            token: token.into(),
        }
    }

    pub fn from_user(user: &User, token: &str) -> Self {
        Self::new(user.id.clone(), user.role.as_deref(), token)
    }

    pub fn doctor(id: impl Into<String>, token: impl Into<String>) -> Self {
        Self::new(id, Some(DOCTOR_ROLE), token)
    }

    pub fn is_doctor(&self) -> bool {
        self.role.as_deref() == Some(DOCTOR_ROLE)
    }

    /// Same user and role, regardless of token.
    pub fn same_identity(&self, other: &Actor) -> bool {
        self.id == other.id && self.role == other.role
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub active_tab: AppointmentStatus,
    #[serde(default)]
    pub search_query: String,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            active_tab: AppointmentStatus::Pending,
            search_query: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub pending: usize,
    pub confirmed: usize,
    pub cancelled: usize,
    pub today: usize,
    pub upcoming: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageView {
    pub active_tab: AppointmentStatus,
    pub search_query: String,
    pub counts: StatusCounts,
    pub appointments: Vec<Appointment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalTicket {
    pub token: Uuid,
    pub appointment_id: String,
    pub issued_at: DateTime<Utc>,
}
