use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub postgrest_url: String,
    pub postgrest_service_key: String,
    pub jwt_secret: String,
    pub redis_url: Option<String>,
    pub mail_api_url: String,
    pub mail_api_key: String,
    pub mail_sender: String,
    pub cancellation_lead_hours: i64,
    pub page_size: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            postgrest_url: env::var("POSTGREST_URL")
                .unwrap_or_else(|_| {
                    warn!("POSTGREST_URL not set, using empty value");
                    String::new()
                }),
            postgrest_service_key: env::var("POSTGREST_SERVICE_KEY")
                .unwrap_or_else(|_| {
                    warn!("POSTGREST_SERVICE_KEY not set, using empty value");
                    String::new()
                }),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("JWT_SECRET not set, using empty value");
                    String::new()
                }),
            redis_url: env::var("REDIS_URL").ok(),
            mail_api_url: env::var("MAIL_API_URL")
                .unwrap_or_else(|_| {
                    warn!("MAIL_API_URL not set, using empty value");
                    String::new()
                }),
            mail_api_key: env::var("MAIL_API_KEY")
                .unwrap_or_else(|_| {
                    warn!("MAIL_API_KEY not set, using empty value");
                    String::new()
                }),
            mail_sender: env::var("MAIL_SENDER")
                .unwrap_or_else(|_| "Equipe Slotbook <noreply@slotbook.app>".to_string()),
            cancellation_lead_hours: parse_env_i64("CANCELLATION_LEAD_HOURS", 2),
            page_size: parse_env_i64("APPOINTMENTS_PAGE_SIZE", 20),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.postgrest_url.is_empty()
            && !self.postgrest_service_key.is_empty()
            && !self.jwt_secret.is_empty()
    }

    pub fn is_mailer_configured(&self) -> bool {
        !self.mail_api_url.is_empty() && !self.mail_api_key.is_empty()
    }
}

fn parse_env_i64(name: &str, default: i64) -> i64 {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} is not a valid integer, using default {}", name, default);
            default
        }),
        Err(_) => default,
    }
}
