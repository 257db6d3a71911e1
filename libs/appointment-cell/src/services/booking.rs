use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use directory_cell::Directory;
use mailer_cell::services::locale::{format_human, Locale};
use mailer_cell::{CancellationMailProducer, CancellationSnapshot};
use shared_config::AppConfig;
use shared_models::auth::AuthUser;

use crate::models::{
    Appointment, AppointmentError, AppointmentView, BookAppointmentRequest, ProviderSummary,
};
use crate::services::availability::AvailabilityChecker;
use crate::services::notification::NotificationService;
use crate::services::policy::CancellationPolicy;
use crate::services::store::AppointmentStore;

pub struct AppointmentBookingService {
    store: Arc<dyn AppointmentStore>,
    directory: Arc<dyn Directory>,
    availability: AvailabilityChecker,
    policy: CancellationPolicy,
    notifications: NotificationService,
    mail_producer: Arc<CancellationMailProducer>,
    page_size: i64,
}

impl AppointmentBookingService {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        directory: Arc<dyn Directory>,
        notifications: NotificationService,
        mail_producer: Arc<CancellationMailProducer>,
        config: &AppConfig,
    ) -> Self {
        let availability = AvailabilityChecker::new(Arc::clone(&store), Arc::clone(&directory));
        let policy = CancellationPolicy::new(config.cancellation_lead_hours);

        Self {
            store,
            directory,
            availability,
            policy,
            notifications,
            mail_producer,
            page_size: config.page_size,
        }
    }

    /// Active appointments of the requester, slot-ascending, with provider
    /// display fields joined in from the directory.
    pub async fn list_appointments(
        &self,
        requester_id: Uuid,
        page: i64,
    ) -> Result<Vec<AppointmentView>, AppointmentError> {
        let rows = self
            .store
            .list_active(requester_id, page, self.page_size)
            .await?;

        let mut provider_ids: Vec<Uuid> = Vec::new();
        for row in &rows {
            if !provider_ids.contains(&row.provider_id) {
                provider_ids.push(row.provider_id);
            }
        }

        let profiles = self
            .directory
            .get_profiles(&provider_ids)
            .await
            .map_err(|e| AppointmentError::ExternalService(e.to_string()))?;
        let profiles: HashMap<Uuid, _> = profiles.into_iter().map(|p| (p.id, p)).collect();

        let views = rows
            .into_iter()
            .map(|row| {
                let provider = match profiles.get(&row.provider_id) {
                    Some(profile) => ProviderSummary {
                        id: profile.id,
                        name: profile.name.clone(),
                        avatar_url: profile.avatar_url.clone(),
                    },
                    None => ProviderSummary {
                        id: row.provider_id,
                        name: String::new(),
                        avatar_url: None,
                    },
                };

                AppointmentView {
                    id: row.id,
                    slot: row.slot,
                    created_at: row.created_at,
                    provider,
                }
            })
            .collect();

        Ok(views)
    }

    pub async fn book_appointment(
        &self,
        requester: &AuthUser,
        request: BookAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        info!(
            "Booking appointment for requester {} with provider {}",
            requester.id, request.provider_id
        );

        let now = Utc::now();
        let slot = self
            .availability
            .check_availability(request.provider_id, &request.date, now)
            .await?;

        let appointment = self
            .store
            .create(requester.id, request.provider_id, slot)
            .await?;

        // The booking is committed; everything below is best-effort.
        let requester_name = self.display_name(requester).await;
        let content = format!(
            "Novo agendamento de {} para {}",
            requester_name,
            format_human(slot, Locale::PtBr)
        );
        if let Err(e) = self.notifications.notify(request.provider_id, &content).await {
            warn!(
                "Failed to record booking notification for provider {}: {}",
                request.provider_id, e
            );
        }

        info!("Appointment {} booked for slot {}", appointment.id, slot);
        Ok(appointment)
    }

    pub async fn cancel_appointment(
        &self,
        requester: &AuthUser,
        appointment_id: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        info!(
            "Cancelling appointment {} for requester {}",
            appointment_id, requester.id
        );

        let now = Utc::now();

        let appointment = self.store.fetch(appointment_id).await?;
        self.policy.can_cancel(&appointment, requester.id, now)?;

        let canceled = self.store.cancel(appointment_id, now).await?;

        // Snapshot everything the email needs now; the worker must not
        // depend on this record or these profiles staying unchanged.
        match self.directory.get_profile(canceled.provider_id).await {
            Ok(provider) => {
                let snapshot = CancellationSnapshot {
                    appointment_id: canceled.id,
                    slot: canceled.slot,
                    requester_name: self.display_name(requester).await,
                    provider_name: provider.name,
                    provider_email: provider.email,
                };

                if let Err(e) = self.mail_producer.enqueue(snapshot).await {
                    warn!(
                        "Failed to enqueue cancellation mail for appointment {}: {}",
                        canceled.id, e
                    );
                }
            }
            Err(e) => {
                warn!(
                    "Skipping cancellation mail for appointment {}: provider lookup failed: {}",
                    canceled.id, e
                );
            }
        }

        info!("Appointment {} canceled", canceled.id);
        Ok(canceled)
    }

    /// Directory name when available, JWT claim as fallback.
    async fn display_name(&self, requester: &AuthUser) -> String {
        match self.directory.get_profile(requester.id).await {
            Ok(profile) => profile.name,
            Err(e) => {
                warn!("Profile lookup for requester {} failed: {}", requester.id, e);
                requester.name.clone().unwrap_or_default()
            }
        }
    }
}
