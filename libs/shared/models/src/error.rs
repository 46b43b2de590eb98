use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Failure taxonomy shared by the REST client, the sync core and the HTTP surface.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    #[error("Network failure: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Server failure: {0}")]
    Server(String),
}

/// Normalized failure as shown to a user: never a raw transport error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserFacingError {
    pub title: String,
    pub detail: String,
}

impl AppError {
    pub fn title(&self) -> &'static str {
        match self {
            AppError::Network(_) => "Connection problem",
            AppError::Auth(_) => "Session expired",
            AppError::ValidationError(_) => "Invalid input",
            AppError::NotFound(_) => "Not found",
            AppError::Server(_) => "Server error",
        }
    }

    pub fn detail(&self) -> String {
        match self {
            AppError::Network(_) => {
                "Could not reach the appointment service. Check your connection and try again.".to_string()
            }
            AppError::Auth(_) => "Please sign in again to continue.".to_string(),
            AppError::ValidationError(msg) => msg.clone(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::Server(_) => {
                "The appointment service returned an unexpected response. Please try again later.".to_string()
            }
        }
    }

    pub fn user_facing(&self) -> UserFacingError {
        UserFacingError {
            title: self.title().to_string(),
            detail: self.detail(),
        }
    }

    /// Whether re-invoking the same action may succeed without user changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Network(_) | AppError::Server(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Network(_) => StatusCode::BAD_GATEWAY,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        tracing::error!("Error: {}: {}", status, self);

        let body = Json(json!({
            "error": self.user_facing()
        }));

        (status, body).into_response()
    }
}
