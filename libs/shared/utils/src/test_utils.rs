use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{User, DOCTOR_ROLE};

type HmacSha256 = Hmac<Sha256>;

pub struct TestConfig {
    pub jwt_secret: String,
    pub api_base_url: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            api_base_url: "http://localhost:4000".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_api_url(api_base_url: &str) -> Self {
        Self {
            api_base_url: api_base_url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            api_base_url: self.api_base_url.clone(),
            jwt_secret: self.jwt_secret.clone(),
            request_timeout_secs: 5,
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// A signed-in identity for handler and middleware tests.
pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, DOCTOR_ROLE)
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }

    fn claims(&self, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> serde_json::Value {
        json!({
            "sub": self.id,
            "email": self.email,
            "role": self.role,
            "iat": issued_at.timestamp(),
            "exp": expires_at.timestamp(),
        })
    }
}

impl Default for TestUser {
    fn default() -> Self {
        Self::doctor("doctor@example.com")
    }
}

/// HS256 tokens accepted (or deliberately rejected) by `jwt::validate_token`.
pub struct JwtTestUtils;

impl JwtTestUtils {
    /// Valid for `exp_hours` (default 24); a negative value yields an expired token.
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let issued_at = Utc::now();
        let expires_at = issued_at + Duration::hours(exp_hours.unwrap_or(24));
        sign_hs256(&user.claims(issued_at, expires_at), secret)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "not-the-configured-secret", None)
    }

    pub fn create_malformed_token() -> String {
        "only.two-parts".to_string()
    }
}

fn sign_hs256(claims: &serde_json::Value, secret: &str) -> String {
    let encode = |value: &serde_json::Value| URL_SAFE_NO_PAD.encode(value.to_string());
    let signing_input = format!(
        "{}.{}",
        encode(&json!({ "alg": "HS256", "typ": "JWT" })),
        encode(claims)
    );

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    format!("{}.{}", signing_input, signature)
}

/// JSON bodies shaped like the appointment platform's REST responses.
pub struct MockApiResponses;

impl MockApiResponses {
    pub fn appointment_response(
        id: &str,
        patient_id: &str,
        doctor_id: &str,
        scheduled_at: DateTime<Utc>,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": id,
            "patientId": patient_id,
            "doctorId": doctor_id,
            "scheduledAt": scheduled_at.to_rfc3339(),
            "status": status,
            "reason": "Follow-up consultation",
            "cancellationReason": null
        })
    }

    pub fn patient_response(patient_id: &str, first_name: &str, last_name: &str) -> serde_json::Value {
        json!({
            "id": patient_id,
            "firstName": first_name,
            "lastName": last_name,
            "email": format!("{}@example.com", first_name.to_lowercase())
        })
    }

    pub fn patient_record_response(patient_id: &str, diagnosis: &str) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4().to_string(),
            "patientId": patient_id,
            "diagnosis": diagnosis,
            "notes": "Stable, review in two weeks",
            "createdAt": "2024-01-01T00:00:00Z"
        })
    }

    pub fn prescription_response(patient_id: &str, medication: &str) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4().to_string(),
            "patientId": patient_id,
            "medication": medication,
            "dosage": "500mg twice daily",
            "issuedAt": "2024-01-01T00:00:00Z"
        })
    }

    pub fn error_response(message: &str) -> serde_json::Value {
        json!({
            "error": {
                "message": message
            }
        })
    }
}
