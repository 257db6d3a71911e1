use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// A booked hour of provider time. `slot` is always aligned to the start of
/// an hour; `canceled_at` flips once, from null to a timestamp, and never
/// back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub provider_id: Uuid,
    pub slot: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub canceled_at: Option<DateTime<Utc>>,
}

impl Appointment {
    pub fn is_active(&self) -> bool {
        self.canceled_at.is_none()
    }
}

/// In-app notice shown to a provider when one of their slots gets booked.
/// The read flag belongs to the notification UI; this cell only creates rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub content: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

/// `date` arrives as the raw client string and is parsed/normalized by the
/// availability check, so a malformed value surfaces as `InvalidInput`
/// rather than a deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub provider_id: Uuid,
    pub date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSummary {
    pub id: Uuid,
    pub name: String,
    pub avatar_url: Option<String>,
}

/// Listing entry: the raw appointment row joined with the provider's display
/// fields from the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentView {
    pub id: Uuid,
    pub slot: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub provider: ProviderSummary,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Validation fails: {0}")]
    InvalidInput(String),

    #[error("Past dates are not permitted")]
    PastDate,

    #[error("Appointment date is not available")]
    SlotTaken,

    #[error("You can only create appointments with providers")]
    NotAProvider,

    #[error("Appointment not found")]
    NotFound,

    #[error("You don't have permission to cancel this appointment")]
    Unauthorized,

    #[error("Appointment is already canceled")]
    AlreadyCanceled,

    #[error("You can only cancel appointments {0} hours in advance")]
    TooLate(i64),

    #[error("Database error: {0}")]
    Database(String),

    #[error("External service error: {0}")]
    ExternalService(String),
}
