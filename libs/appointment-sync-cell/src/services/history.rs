// libs/appointment-sync-cell/src/services/history.rs
use std::sync::Arc;

use tracing::{instrument, warn};

use crate::models::PatientHistory;
use crate::services::gateway::AppointmentGateway;

/// Historical context for a patient. Never fails: each missing part is empty.
pub struct PatientHistoryService {
    gateway: Arc<dyn AppointmentGateway>,
}

impl PatientHistoryService {
    pub fn new(gateway: Arc<dyn AppointmentGateway>) -> Self {
        Self { gateway }
    }

    #[instrument(skip(self, auth_token))]
    pub async fn fetch(&self, patient_id: &str, auth_token: &str) -> PatientHistory {
        let (records, prescriptions) = tokio::join!(
            self.gateway.patient_records(patient_id, auth_token),
            self.gateway.prescriptions(patient_id, auth_token),
        );

        let records = records.unwrap_or_else(|e| {
            warn!("Patient records for {} unavailable: {}", patient_id, e);
            Vec::new()
        });

        let prescriptions = prescriptions.unwrap_or_else(|e| {
            warn!("Prescriptions for {} unavailable: {}", patient_id, e);
            Vec::new()
        });

        PatientHistory {
            patient_id: patient_id.to_string(),
            records,
            prescriptions,
        }
    }
}
