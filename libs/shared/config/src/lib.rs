use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_base_url: String,
    pub jwt_secret: String,
    pub request_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub reminder_scan_secs: u64,
    pub reminder_warning_minutes: i64,
    pub utc_offset_minutes: i32,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            api_base_url: env::var("TRIAGE_API_URL")
                .unwrap_or_else(|_| {
                    warn!("TRIAGE_API_URL not set, using empty value");
                    String::new()
                }),
            jwt_secret: env::var("TRIAGE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("TRIAGE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            request_timeout_secs: parse_or("TRIAGE_REQUEST_TIMEOUT_SECS", 15),
            poll_interval_secs: parse_or("TRIAGE_POLL_INTERVAL_SECS", 30),
            reminder_scan_secs: parse_or("TRIAGE_REMINDER_SCAN_SECS", 60),
            reminder_warning_minutes: parse_or("TRIAGE_REMINDER_WARNING_MINUTES", 15),
            utc_offset_minutes: parse_or("TRIAGE_UTC_OFFSET_MINUTES", 0),
            server_port: parse_or("PORT", 3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.api_base_url.is_empty() && !self.jwt_secret.is_empty()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            jwt_secret: String::new(),
            request_timeout_secs: 15,
            poll_interval_secs: 30,
            reminder_scan_secs: 60,
            reminder_warning_minutes: 15,
            utc_offset_minutes: 0,
            server_port: 3000,
        }
    }
}

fn parse_or<T: FromStr + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => {
            warn!("{} not set, using default {}", key, default);
            default
        }
    }
}
