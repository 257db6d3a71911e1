use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use shared_database::{DbError, PostgrestClient};

use crate::models::{Appointment, AppointmentError};

/// Persistence seam for appointment records. The store deals in raw rows
/// only; joining display data onto them is the booking service's job.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Inserts a new active appointment. Must be atomic with respect to
    /// concurrent creates for the same `(provider_id, slot)`: when another
    /// active row already holds the slot, this returns `SlotTaken` instead
    /// of inserting.
    async fn create(
        &self,
        requester_id: Uuid,
        provider_id: Uuid,
        slot: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError>;

    async fn find_active(
        &self,
        provider_id: Uuid,
        slot: DateTime<Utc>,
    ) -> Result<Option<Appointment>, AppointmentError>;

    /// Active appointments of a requester, ordered by slot ascending.
    /// `page` starts at 1.
    async fn list_active(
        &self,
        requester_id: Uuid,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    async fn fetch(&self, id: Uuid) -> Result<Appointment, AppointmentError>;

    /// Sets `canceled_at = now`, but only if it is still null. A lost race
    /// (or a repeat call) returns `AlreadyCanceled` and leaves the original
    /// cancellation timestamp untouched.
    async fn cancel(&self, id: Uuid, now: DateTime<Utc>) -> Result<Appointment, AppointmentError>;
}

/// PostgREST-backed store. Slot exclusivity rests on the partial unique
/// index over `(provider_id, slot) where canceled_at is null` (see
/// `db/schema.sql`); a violated insert comes back as HTTP 409.
pub struct PostgrestAppointmentStore {
    db: Arc<PostgrestClient>,
}

impl PostgrestAppointmentStore {
    pub fn new(db: Arc<PostgrestClient>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AppointmentStore for PostgrestAppointmentStore {
    async fn create(
        &self,
        requester_id: Uuid,
        provider_id: Uuid,
        slot: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Creating appointment for provider {} at {}", provider_id, slot);

        let body = json!({
            "requester_id": requester_id,
            "provider_id": provider_id,
            "slot": slot.to_rfc3339(),
        });

        let rows: Vec<Appointment> = self
            .db
            .request(Method::POST, "/rest/v1/appointments", Some(body))
            .await
            .map_err(|e| match e {
                DbError::Conflict(_) => AppointmentError::SlotTaken,
                other => AppointmentError::Database(other.to_string()),
            })?;

        rows.into_iter()
            .next()
            .ok_or_else(|| AppointmentError::Database("insert returned no row".to_string()))
    }

    async fn find_active(
        &self,
        provider_id: Uuid,
        slot: DateTime<Utc>,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let slot_str = urlencoding::encode(&slot.to_rfc3339()).into_owned();
        let path = format!(
            "/rest/v1/appointments?provider_id=eq.{}&slot=eq.{}&canceled_at=is.null&limit=1",
            provider_id, slot_str
        );

        let rows: Vec<Appointment> = self
            .db
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        Ok(rows.into_iter().next())
    }

    async fn list_active(
        &self,
        requester_id: Uuid,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let page = page.max(1);
        let offset = (page - 1) * page_size;
        let path = format!(
            "/rest/v1/appointments?requester_id=eq.{}&canceled_at=is.null&order=slot.asc&limit={}&offset={}",
            requester_id, page_size, offset
        );

        self.db
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))
    }

    async fn fetch(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", id);

        let rows: Vec<Appointment> = self
            .db
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        rows.into_iter().next().ok_or(AppointmentError::NotFound)
    }

    async fn cancel(&self, id: Uuid, now: DateTime<Utc>) -> Result<Appointment, AppointmentError> {
        debug!("Cancelling appointment {}", id);

        // Compare-and-set: the filter only matches while canceled_at is
        // still null, so concurrent cancels update at most one of them.
        let path = format!("/rest/v1/appointments?id=eq.{}&canceled_at=is.null", id);
        let body = json!({ "canceled_at": now.to_rfc3339() });

        let rows: Vec<Appointment> = self
            .db
            .request(Method::PATCH, &path, Some(body))
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        if let Some(appointment) = rows.into_iter().next() {
            return Ok(appointment);
        }

        // No row matched: either the appointment does not exist, or it was
        // already canceled. Fetch to tell the two apart.
        match self.fetch(id).await {
            Ok(existing) if existing.canceled_at.is_some() => Err(AppointmentError::AlreadyCanceled),
            Ok(_) => Err(AppointmentError::Database(
                "cancel updated no rows for an active appointment".to_string(),
            )),
            Err(e) => Err(e),
        }
    }
}
