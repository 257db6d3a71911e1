use std::sync::Arc;

use directory_cell::Directory;
use mailer_cell::CancellationMailProducer;
use shared_config::AppConfig;
use shared_database::PostgrestClient;

use crate::services::booking::AppointmentBookingService;
use crate::services::notification::NotificationService;
use crate::services::store::AppointmentStore;

/// Shared state for the appointment routes. Collaborators are injected as
/// trait objects so the HTTP surface never constructs its own persistence
/// or queue handles.
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub booking: AppointmentBookingService,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        db: Arc<PostgrestClient>,
        store: Arc<dyn AppointmentStore>,
        directory: Arc<dyn Directory>,
        mail_producer: Arc<CancellationMailProducer>,
    ) -> Self {
        let notifications = NotificationService::new(db);
        let booking =
            AppointmentBookingService::new(store, directory, notifications, mail_producer, &config);

        Self { config, booking }
    }
}
