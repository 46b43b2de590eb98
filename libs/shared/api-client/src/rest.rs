use std::time::Duration;

use reqwest::{
    Client, Response,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, warn};

use shared_config::AppConfig;
use shared_models::error::AppError;

/// Bearer-authenticated JSON client for the appointment platform's REST API.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &AppConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with timeout, using defaults: {}", e);
                Client::new()
            });

        Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn get_headers(&self, auth_token: &str) -> Result<HeaderMap, AppError> {
        if auth_token.trim().is_empty() {
            return Err(AppError::Auth("Missing bearer token".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let bearer = HeaderValue::from_str(&format!("Bearer {}", auth_token))
            .map_err(|_| AppError::Auth("Bearer token contains invalid characters".to_string()))?;
        headers.insert(AUTHORIZATION, bearer);

        Ok(headers)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        auth_token: &str,
        body: Option<Value>,
    ) -> Result<Response, AppError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let headers = self.get_headers(auth_token)?;

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await.map_err(|e| {
            warn!("Transport failure calling {}: {}", url, e);
            AppError::Network(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => AppError::Auth(error_text),
                400..=499 => AppError::NotFound(format!(
                    "The requested appointment resource is unavailable ({})",
                    status.as_u16()
                )),
                _ => AppError::Server(format!("API error ({}): {}", status, error_text)),
            });
        }

        Ok(response)
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: &str,
        body: Option<Value>,
    ) -> Result<T, AppError>
    where
        T: DeserializeOwned,
    {
        let response = self.send(method, path, auth_token, body).await?;

        let text = response
            .text()
            .await
            .map_err(|e| AppError::Network(e.to_string()))?;

        serde_json::from_str::<T>(&text).map_err(|e| {
            error!("Unexpected payload from {}: {}", path, e);
            AppError::Server(format!("Unexpected payload: {}", e))
        })
    }

    /// Issues a request whose response body is irrelevant (mutations, deletes).
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        auth_token: &str,
        body: Option<Value>,
    ) -> Result<(), AppError> {
        self.send(method, path, auth_token, body).await?;
        Ok(())
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}
