use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, Client};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

#[derive(Debug, Clone, Serialize)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Mail transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Mail API error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl MailError {
    /// Server-side and transport faults are worth retrying; client-side
    /// rejections (bad payload, bad key) will fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            MailError::Transport(_) => true,
            MailError::Api { status, .. } => *status >= 500 || *status == 429,
        }
    }
}

/// The black-box mail-sending capability. Delivery details (SMTP relays,
/// provider APIs) live behind this seam.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError>;
}

/// Client for an HTTP mail relay: POST /messages with a bearer key.
pub struct HttpMailer {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpMailer {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.mail_api_url.clone(),
            api_key: config.mail_api_key.clone(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        let url = format!("{}/messages", self.base_url);
        debug!("Sending mail to {} via {}", message.to, url);

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Mail API error ({}): {}", status, error_text);
            return Err(MailError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        Ok(())
    }
}
