// libs/appointment-sync-cell/src/services/gateway.rs
use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use tracing::debug;
use urlencoding::encode;

use shared_api_client::ApiClient;
use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::{
    Appointment, AppointmentListPayload, AppointmentStatus, ListPayload, PatientProfile,
    PatientRecord, Prescription, RescheduleRequest, StatusUpdateBody,
};

/// The REST operations the sync core consumes. Every call is bearer-authenticated.
#[async_trait]
pub trait AppointmentGateway: Send + Sync {
    async fn list_appointments(&self, doctor_id: &str, auth_token: &str) -> Result<Vec<Appointment>, AppError>;

    async fn patient_name(&self, patient_id: &str, auth_token: &str) -> Result<Option<String>, AppError>;

    async fn update_status(
        &self,
        appointment_id: &str,
        status: AppointmentStatus,
        auth_token: &str,
    ) -> Result<(), AppError>;

    async fn reschedule(
        &self,
        appointment_id: &str,
        request: &RescheduleRequest,
        auth_token: &str,
    ) -> Result<(), AppError>;

    async fn cancel(&self, appointment_id: &str, cancellation_reason: &str, auth_token: &str) -> Result<(), AppError>;

    async fn delete(&self, appointment_id: &str, auth_token: &str) -> Result<(), AppError>;

    async fn patient_records(&self, patient_id: &str, auth_token: &str) -> Result<Vec<PatientRecord>, AppError>;

    async fn prescriptions(&self, patient_id: &str, auth_token: &str) -> Result<Vec<Prescription>, AppError>;
}

pub struct RestAppointmentGateway {
    client: ApiClient,
}

impl RestAppointmentGateway {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: ApiClient::new(config),
        }
    }

    pub fn with_client(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AppointmentGateway for RestAppointmentGateway {
    async fn list_appointments(&self, doctor_id: &str, auth_token: &str) -> Result<Vec<Appointment>, AppError> {
        let path = format!("/appointments?doctorId={}", encode(doctor_id));

        let payload: AppointmentListPayload = self
            .client
            .request(Method::GET, &path, auth_token, None)
            .await?;

        let appointments = payload.into_appointments();
        debug!("Fetched {} appointments for doctor {}", appointments.len(), doctor_id);
        Ok(appointments)
    }

    async fn patient_name(&self, patient_id: &str, auth_token: &str) -> Result<Option<String>, AppError> {
        let path = format!("/patients/{}", encode(patient_id));

        let profile: PatientProfile = self
            .client
            .request(Method::GET, &path, auth_token, None)
            .await?;

        Ok(profile.display_name())
    }

    async fn update_status(
        &self,
        appointment_id: &str,
        status: AppointmentStatus,
        auth_token: &str,
    ) -> Result<(), AppError> {
        let path = format!("/appointments/{}/status", encode(appointment_id));
        let body = serde_json::to_value(StatusUpdateBody { status })
            .map_err(|e| AppError::Server(e.to_string()))?;

        self.client
            .execute(Method::PATCH, &path, auth_token, Some(body))
            .await
    }

    async fn reschedule(
        &self,
        appointment_id: &str,
        request: &RescheduleRequest,
        auth_token: &str,
    ) -> Result<(), AppError> {
        let path = format!("/appointments/{}/reschedule", encode(appointment_id));
        let body = json!({
            "scheduledAt": request.scheduled_at.to_rfc3339(),
            "reason": request.reason,
        });

        self.client
            .execute(Method::PATCH, &path, auth_token, Some(body))
            .await
    }

    async fn cancel(&self, appointment_id: &str, cancellation_reason: &str, auth_token: &str) -> Result<(), AppError> {
        let path = format!("/appointments/{}/cancel", encode(appointment_id));
        let body = json!({ "cancellationReason": cancellation_reason });

        self.client
            .execute(Method::PATCH, &path, auth_token, Some(body))
            .await
    }

    async fn delete(&self, appointment_id: &str, auth_token: &str) -> Result<(), AppError> {
        let path = format!("/appointments/{}", encode(appointment_id));

        self.client
            .execute(Method::DELETE, &path, auth_token, None)
            .await
    }

    async fn patient_records(&self, patient_id: &str, auth_token: &str) -> Result<Vec<PatientRecord>, AppError> {
        let path = format!("/patient-records/{}", encode(patient_id));

        let payload: ListPayload<PatientRecord> = self
            .client
            .request(Method::GET, &path, auth_token, None)
            .await?;

        Ok(payload.into_items())
    }

    async fn prescriptions(&self, patient_id: &str, auth_token: &str) -> Result<Vec<Prescription>, AppError> {
        let path = format!("/prescriptions?patientId={}", encode(patient_id));

        let payload: ListPayload<Prescription> = self
            .client
            .request(Method::GET, &path, auth_token, None)
            .await?;

        Ok(payload.into_items())
    }
}
