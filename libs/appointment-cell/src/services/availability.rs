use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use directory_cell::{Directory, DirectoryError};

use crate::models::AppointmentError;
use crate::services::store::AppointmentStore;
use crate::services::time_rules;

/// Decides whether a booking request may proceed, returning the normalized
/// slot it would occupy.
pub struct AvailabilityChecker {
    store: Arc<dyn AppointmentStore>,
    directory: Arc<dyn Directory>,
}

impl AvailabilityChecker {
    pub fn new(store: Arc<dyn AppointmentStore>, directory: Arc<dyn Directory>) -> Self {
        Self { store, directory }
    }

    pub async fn check_availability(
        &self,
        provider_id: Uuid,
        raw_date: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, AppointmentError> {
        let parsed = time_rules::parse_raw_date(raw_date)
            .map_err(|e| AppointmentError::InvalidInput(e.to_string()))?;
        let slot = time_rules::normalize(parsed);

        if time_rules::is_past(slot, now) {
            return Err(AppointmentError::PastDate);
        }

        // This probe gives a friendly answer on the common path; the unique
        // index behind `create` is what actually guarantees exclusivity
        // under concurrency.
        if self.store.find_active(provider_id, slot).await?.is_some() {
            debug!("Slot {} already taken for provider {}", slot, provider_id);
            return Err(AppointmentError::SlotTaken);
        }

        match self.directory.is_provider(provider_id).await {
            Ok(true) => Ok(slot),
            Ok(false) => Err(AppointmentError::NotAProvider),
            Err(DirectoryError::NotFound) => Err(AppointmentError::NotAProvider),
            Err(e) => Err(AppointmentError::ExternalService(e.to_string())),
        }
    }
}
