// libs/appointment-sync-cell/src/services/store.rs
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_models::error::AppError;

use crate::clock::Clock;
use crate::models::{
    placeholder_patient_name, Actor, Appointment, AppointmentSnapshot, AppointmentStatus,
    RemovalTicket, RescheduleRequest,
};
use crate::services::gateway::AppointmentGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Background refresh: failures are logged and the previous snapshot stays.
    Silent,
    /// User-initiated refresh: failures clear the snapshot and are returned.
    Surfaced,
}

/// Canonical appointment set for the signed-in doctor.
///
/// Readers always see a fully assembled snapshot; a refresh builds the next
/// one off to the side (including patient names) and swaps it in at once.
/// Mutating actions never touch the snapshot directly: they call the API and
/// re-read the whole list on success.
pub struct AppointmentStore {
    gateway: Arc<dyn AppointmentGateway>,
    clock: Arc<dyn Clock>,
    snapshot: RwLock<Arc<AppointmentSnapshot>>,
    generation: AtomicU64,
    pending_count: watch::Sender<usize>,
    in_flight: Mutex<HashSet<String>>,
    removals: Mutex<HashMap<Uuid, RemovalTicket>>,
}

/// Marks an appointment as busy for the lifetime of one mutating action.
struct ActionGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    appointment_id: String,
}

impl Drop for ActionGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut busy) = self.in_flight.lock() {
            busy.remove(&self.appointment_id);
        }
    }
}

impl AppointmentStore {
    pub fn new(gateway: Arc<dyn AppointmentGateway>, clock: Arc<dyn Clock>) -> Self {
        let (pending_count, _) = watch::channel(0);

        Self {
            gateway,
            clock,
            snapshot: RwLock::new(Arc::new(AppointmentSnapshot::default())),
            generation: AtomicU64::new(0),
            pending_count,
            in_flight: Mutex::new(HashSet::new()),
            removals: Mutex::new(HashMap::new()),
        }
    }

    /// Latest committed snapshot.
    pub async fn snapshot(&self) -> Arc<AppointmentSnapshot> {
        self.snapshot.read().await.clone()
    }

    /// Side channel carrying the number of PENDING appointments.
    pub fn subscribe_pending_count(&self) -> watch::Receiver<usize> {
        self.pending_count.subscribe()
    }

    /// Shared loading flag: true while any mutating action is in flight.
    pub fn is_loading(&self) -> bool {
        self.in_flight
            .lock()
            .map(|busy| !busy.is_empty())
            .unwrap_or(false)
    }

    #[instrument(skip(self, auth_token))]
    pub async fn refresh(
        &self,
        doctor_id: &str,
        auth_token: &str,
        mode: RefreshMode,
    ) -> Result<Arc<AppointmentSnapshot>, AppError> {
        match self.assemble(doctor_id, auth_token).await {
            Ok(appointments) => Ok(self.commit(appointments, Some(self.clock.now())).await),
            Err(e) if mode == RefreshMode::Silent => {
                warn!("Silent refresh for doctor {} failed, keeping previous snapshot: {}", doctor_id, e);
                Ok(self.snapshot().await)
            }
            Err(e) => {
                warn!("Refresh for doctor {} failed, clearing snapshot: {}", doctor_id, e);
                self.commit(Vec::new(), None).await;
                Err(e)
            }
        }
    }

    async fn assemble(&self, doctor_id: &str, auth_token: &str) -> Result<Vec<Appointment>, AppError> {
        let fetched = self.gateway.list_appointments(doctor_id, auth_token).await?;
        let unique = collapse_duplicate_ids(fetched);
        Ok(self.resolve_patient_names(unique, auth_token).await)
    }

    /// Best-effort: every lookup runs concurrently and a failure only costs that name.
    async fn resolve_patient_names(&self, mut appointments: Vec<Appointment>, auth_token: &str) -> Vec<Appointment> {
        let mut unresolved: Vec<String> = appointments
            .iter()
            .filter(|a| a.patient_name.as_deref().map_or(true, |n| n.trim().is_empty()))
            .map(|a| a.patient_id.clone())
            .collect();
        unresolved.sort();
        unresolved.dedup();

        let lookups = unresolved.iter().map(|patient_id| async move {
            match self.gateway.patient_name(patient_id, auth_token).await {
                Ok(name) => (patient_id.clone(), name),
                Err(e) => {
                    debug!("Patient name lookup for {} failed: {}", patient_id, e);
                    (patient_id.clone(), None)
                }
            }
        });
        let resolved: HashMap<String, Option<String>> = join_all(lookups).await.into_iter().collect();

        for appointment in appointments.iter_mut() {
            if let Some(name) = resolved.get(&appointment.patient_id) {
                appointment.patient_name = Some(
                    name.clone()
                        .unwrap_or_else(|| placeholder_patient_name(&appointment.patient_id)),
                );
            }
        }

        appointments
    }

    async fn commit(
        &self,
        appointments: Vec<Appointment>,
        fetched_at: Option<DateTime<Utc>>,
    ) -> Arc<AppointmentSnapshot> {
        let mut current = self.snapshot.write().await;

        let next = Arc::new(AppointmentSnapshot {
            appointments,
            fetched_at,
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
        });

        self.pending_count.send_replace(next.pending_count());
        *current = next.clone();

        debug!(
            "Committed snapshot generation {} with {} appointments",
            next.generation,
            next.appointments.len()
        );
        next
    }

    fn begin_action(&self, appointment_id: &str) -> Result<ActionGuard<'_>, AppError> {
        let mut busy = self
            .in_flight
            .lock()
            .map_err(|_| AppError::Server("Action tracker unavailable".to_string()))?;

        if !busy.insert(appointment_id.to_string()) {
            return Err(AppError::ValidationError(
                "Another action on this appointment is still in progress".to_string(),
            ));
        }

        Ok(ActionGuard {
            in_flight: &self.in_flight,
            appointment_id: appointment_id.to_string(),
        })
    }

    async fn known_status(&self, appointment_id: &str) -> Option<AppointmentStatus> {
        self.snapshot().await.get(appointment_id).map(|a| a.status)
    }

    /// Issues the status change and, only on success, re-reads the full list.
    ///
    /// Only confirmation goes through the status endpoint; cancelling needs a
    /// reason and goes through [`AppointmentStore::cancel`].
    #[instrument(skip(self, actor), fields(doctor_id = %actor.id))]
    pub async fn apply_status_change(
        &self,
        actor: &Actor,
        appointment_id: &str,
        new_status: AppointmentStatus,
    ) -> Result<Arc<AppointmentSnapshot>, AppError> {
        match new_status {
            AppointmentStatus::Confirmed => {}
            AppointmentStatus::Cancelled => {
                return Err(AppError::ValidationError(
                    "A cancellation reason is required".to_string(),
                ));
            }
            other => {
                return Err(AppError::ValidationError(format!(
                    "Appointments cannot be moved to {}",
                    other
                )));
            }
        }

        if let Some(current) = self.known_status(appointment_id).await {
            if !current.can_transition_to(&new_status) {
                return Err(AppError::ValidationError(format!(
                    "A {} appointment cannot become {}",
                    current.to_string().to_lowercase(),
                    new_status.to_string().to_lowercase()
                )));
            }
        }

        let _guard = self.begin_action(appointment_id)?;

        self.gateway
            .update_status(appointment_id, new_status, &actor.token)
            .await?;

        info!("Appointment {} moved to {}", appointment_id, new_status);
        self.refresh(&actor.id, &actor.token, RefreshMode::Silent).await
    }

    /// Rejects locally, without a request, unless the new time is strictly in the future.
    #[instrument(skip(self, actor, reason), fields(doctor_id = %actor.id))]
    pub async fn apply_reschedule(
        &self,
        actor: &Actor,
        appointment_id: &str,
        new_scheduled_at: DateTime<Utc>,
        reason: Option<String>,
    ) -> Result<Arc<AppointmentSnapshot>, AppError> {
        if new_scheduled_at <= self.clock.now() {
            return Err(AppError::ValidationError(
                "The new appointment time must be in the future".to_string(),
            ));
        }

        if let Some(current) = self.known_status(appointment_id).await {
            if !current.is_active() {
                return Err(AppError::ValidationError(format!(
                    "A {} appointment cannot be rescheduled",
                    current.to_string().to_lowercase()
                )));
            }
        }

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        let _guard = self.begin_action(appointment_id)?;

        let request = RescheduleRequest {
            scheduled_at: new_scheduled_at,
            reason,
        };
        self.gateway
            .reschedule(appointment_id, &request, &actor.token)
            .await?;

        info!("Appointment {} rescheduled to {}", appointment_id, new_scheduled_at);
        self.refresh(&actor.id, &actor.token, RefreshMode::Silent).await
    }

    #[instrument(skip(self, actor, cancellation_reason), fields(doctor_id = %actor.id))]
    pub async fn cancel(
        &self,
        actor: &Actor,
        appointment_id: &str,
        cancellation_reason: &str,
    ) -> Result<Arc<AppointmentSnapshot>, AppError> {
        let reason = cancellation_reason.trim();
        if reason.is_empty() {
            return Err(AppError::ValidationError(
                "A cancellation reason is required".to_string(),
            ));
        }

        if let Some(current) = self.known_status(appointment_id).await {
            if !current.can_transition_to(&AppointmentStatus::Cancelled) {
                return Err(AppError::ValidationError(format!(
                    "A {} appointment cannot be cancelled",
                    current.to_string().to_lowercase()
                )));
            }
        }

        let _guard = self.begin_action(appointment_id)?;

        self.gateway.cancel(appointment_id, reason, &actor.token).await?;

        info!("Appointment {} cancelled", appointment_id);
        self.refresh(&actor.id, &actor.token, RefreshMode::Silent).await
    }

    /// First phase of removal: nothing is sent until the ticket is confirmed.
    pub async fn request_removal(&self, appointment_id: &str) -> Result<RemovalTicket, AppError> {
        if self.snapshot().await.get(appointment_id).is_none() {
            return Err(AppError::NotFound(
                "This appointment is no longer available".to_string(),
            ));
        }

        let ticket = RemovalTicket {
            token: Uuid::new_v4(),
            appointment_id: appointment_id.to_string(),
            issued_at: self.clock.now(),
        };

        self.removals
            .lock()
            .map_err(|_| AppError::Server("Removal tracker unavailable".to_string()))?
            .insert(ticket.token, ticket.clone());

        debug!("Issued removal ticket {} for appointment {}", ticket.token, appointment_id);
        Ok(ticket)
    }

    /// Drops a pending removal. Returns false when the ticket was unknown.
    pub fn abandon_removal(&self, token: Uuid) -> bool {
        self.removals
            .lock()
            .map(|mut tickets| tickets.remove(&token).is_some())
            .unwrap_or(false)
    }

    /// Second phase of removal: permanently deletes the appointment.
    #[instrument(skip(self, actor), fields(doctor_id = %actor.id))]
    pub async fn confirm_removal(
        &self,
        actor: &Actor,
        token: Uuid,
    ) -> Result<Arc<AppointmentSnapshot>, AppError> {
        let ticket = self
            .removals
            .lock()
            .map_err(|_| AppError::Server("Removal tracker unavailable".to_string()))?
            .get(&token)
            .cloned()
            .ok_or_else(|| {
                AppError::ValidationError("Removal must be confirmed with a valid ticket".to_string())
            })?;

        // A refused guard leaves the ticket in place for a retry.
        let _guard = self.begin_action(&ticket.appointment_id)?;

        let claimed = self
            .removals
            .lock()
            .map_err(|_| AppError::Server("Removal tracker unavailable".to_string()))?
            .remove(&token)
            .is_some();
        if !claimed {
            return Err(AppError::ValidationError(
                "Removal must be confirmed with a valid ticket".to_string(),
            ));
        }

        if let Err(e) = self.gateway.delete(&ticket.appointment_id, &actor.token).await {
            if e.is_retryable() {
                if let Ok(mut tickets) = self.removals.lock() {
                    tickets.insert(ticket.token, ticket.clone());
                }
            }
            return Err(e);
        }

        info!("Appointment {} deleted", ticket.appointment_id);
        self.refresh(&actor.id, &actor.token, RefreshMode::Silent).await
    }
}

/// Keeps one record per id; a later occurrence replaces an earlier one in place.
fn collapse_duplicate_ids(appointments: Vec<Appointment>) -> Vec<Appointment> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(appointments.len());
    let mut unique: Vec<Appointment> = Vec::with_capacity(appointments.len());

    for appointment in appointments {
        match positions.get(&appointment.id) {
            Some(&index) => unique[index] = appointment,
            None => {
                positions.insert(appointment.id.clone(), unique.len());
                unique.push(appointment);
            }
        }
    }

    unique
}
