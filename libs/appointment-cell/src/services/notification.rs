use std::sync::Arc;

use reqwest::Method;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use shared_database::PostgrestClient;

use crate::models::{AppointmentError, Notification};

/// Writes in-app notifications for providers. Callers treat failures as
/// non-fatal: a booking stands even when its notice could not be recorded.
pub struct NotificationService {
    db: Arc<PostgrestClient>,
}

impl NotificationService {
    pub fn new(db: Arc<PostgrestClient>) -> Self {
        Self { db }
    }

    pub async fn notify(
        &self,
        recipient_id: Uuid,
        content: &str,
    ) -> Result<Notification, AppointmentError> {
        debug!("Recording notification for provider {}", recipient_id);

        let body = json!({
            "recipient_id": recipient_id,
            "content": content,
            "read": false,
        });

        let rows: Vec<Notification> = self
            .db
            .request(Method::POST, "/rest/v1/notifications", Some(body))
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        rows.into_iter()
            .next()
            .ok_or_else(|| AppointmentError::Database("notification insert returned no row".to_string()))
    }
}
