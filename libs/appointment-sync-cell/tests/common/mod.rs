#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use appointment_sync_cell::models::{
    Appointment, AppointmentStatus, PatientRecord, Prescription, RescheduleRequest,
};
use appointment_sync_cell::services::AppointmentGateway;
use shared_models::error::AppError;

pub const DOCTOR_ID: &str = "doc-1";
pub const TOKEN: &str = "test-token";

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
}

pub fn appointment(id: &str, status: AppointmentStatus, scheduled_at: DateTime<Utc>) -> Appointment {
    Appointment {
        id: id.to_string(),
        patient_id: format!("patient-{}", id),
        doctor_id: Some(DOCTOR_ID.to_string()),
        scheduled_at,
        status,
        reason: None,
        cancellation_reason: None,
        patient_name: Some(format!("Patient {}", id)),
    }
}

/// In-memory gateway serving a fixed appointment list.
#[derive(Default)]
pub struct StaticGateway {
    appointments: Mutex<Vec<Appointment>>,
    failing: AtomicBool,
    list_calls: AtomicUsize,
    status_updates: Mutex<Vec<(String, AppointmentStatus)>>,
}

impl StaticGateway {
    pub fn with(appointments: Vec<Appointment>) -> Arc<Self> {
        Arc::new(Self {
            appointments: Mutex::new(appointments),
            ..Self::default()
        })
    }

    pub fn set(&self, appointments: Vec<Appointment>) {
        *self.appointments.lock().unwrap() = appointments;
    }

    pub fn fail_lists(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn status_updates(&self) -> Vec<(String, AppointmentStatus)> {
        self.status_updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl AppointmentGateway for StaticGateway {
    async fn list_appointments(&self, _doctor_id: &str, _auth_token: &str) -> Result<Vec<Appointment>, AppError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Network("connection refused".to_string()));
        }
        Ok(self.appointments.lock().unwrap().clone())
    }

    async fn patient_name(&self, patient_id: &str, _auth_token: &str) -> Result<Option<String>, AppError> {
        Ok(Some(format!("Resolved {}", patient_id)))
    }

    async fn update_status(
        &self,
        appointment_id: &str,
        status: AppointmentStatus,
        _auth_token: &str,
    ) -> Result<(), AppError> {
        self.status_updates
            .lock()
            .unwrap()
            .push((appointment_id.to_string(), status));

        let mut appointments = self.appointments.lock().unwrap();
        if let Some(a) = appointments.iter_mut().find(|a| a.id == appointment_id) {
            a.status = status;
        }
        Ok(())
    }

    async fn reschedule(
        &self,
        appointment_id: &str,
        request: &RescheduleRequest,
        _auth_token: &str,
    ) -> Result<(), AppError> {
        let mut appointments = self.appointments.lock().unwrap();
        if let Some(a) = appointments.iter_mut().find(|a| a.id == appointment_id) {
            a.scheduled_at = request.scheduled_at;
        }
        Ok(())
    }

    async fn cancel(&self, appointment_id: &str, cancellation_reason: &str, _auth_token: &str) -> Result<(), AppError> {
        let mut appointments = self.appointments.lock().unwrap();
        if let Some(a) = appointments.iter_mut().find(|a| a.id == appointment_id) {
            a.status = AppointmentStatus::Cancelled;
            a.cancellation_reason = Some(cancellation_reason.to_string());
        }
        Ok(())
    }

    async fn delete(&self, appointment_id: &str, _auth_token: &str) -> Result<(), AppError> {
        self.appointments
            .lock()
            .unwrap()
            .retain(|a| a.id != appointment_id);
        Ok(())
    }

    async fn patient_records(&self, _patient_id: &str, _auth_token: &str) -> Result<Vec<PatientRecord>, AppError> {
        Ok(Vec::new())
    }

    async fn prescriptions(&self, _patient_id: &str, _auth_token: &str) -> Result<Vec<Prescription>, AppError> {
        Ok(Vec::new())
    }
}
