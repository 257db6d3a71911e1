use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError};
use crate::services::time_rules;

/// Pure decision function for cancellation requests. Mutating the record is
/// the store's business.
pub struct CancellationPolicy {
    lead_hours: i64,
}

impl CancellationPolicy {
    pub fn new(lead_hours: i64) -> Self {
        Self { lead_hours }
    }

    pub fn can_cancel(
        &self,
        appointment: &Appointment,
        requester_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        if appointment.requester_id != requester_id {
            return Err(AppointmentError::Unauthorized);
        }

        if appointment.canceled_at.is_some() {
            return Err(AppointmentError::AlreadyCanceled);
        }

        if !time_rules::lead_time_satisfied(appointment.slot, now, self.lead_hours) {
            return Err(AppointmentError::TooLate(self.lead_hours));
        }

        Ok(())
    }
}
