// libs/booking-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use video_conferencing_cell::{Session, SessionManager, SessionUpdate};

use crate::models::{
    Booking, BookingError, BookingPatch, BookingProposal, BookingStatus, CreateBookingRequest, PaymentStatus,
    RescheduleBookingRequest,
};
use crate::services::directory::ExpertDirectory;
use crate::services::repository::BookingRepository;
use crate::services::validator::{booking_amount, validate};

/// Booking aggregate: creation, status transitions, reschedules and reads.
/// Every mutation goes through the repository's version guard.
pub struct BookingService {
    repository: Arc<dyn BookingRepository>,
    directory: Arc<dyn ExpertDirectory>,
    sessions: Arc<SessionManager>,
    platform_fee: i64,
}

impl BookingService {
    pub fn new(
        repository: Arc<dyn BookingRepository>,
        directory: Arc<dyn ExpertDirectory>,
        sessions: Arc<SessionManager>,
        platform_fee: i64,
    ) -> Self {
        Self {
            repository,
            directory,
            sessions,
            platform_fee,
        }
    }

    // ==============================================================================
    // COMMANDS
    // ==============================================================================

    #[instrument(skip(self, request), fields(client_id = %client_id, expert_id = %expert_id))]
    pub async fn create_booking(
        &self,
        client_id: Uuid,
        expert_id: Uuid,
        request: CreateBookingRequest,
    ) -> Result<Booking, BookingError> {
        let topic = request.topic.trim();
        if topic.is_empty() {
            return Err(BookingError::ValidationError("Topic is required".to_string()));
        }

        let expert = self
            .directory
            .get_expert(expert_id)
            .await?
            .ok_or(BookingError::ExpertNotFound)?;

        let windows = self.directory.get_availability(expert_id).await?;
        let existing = self
            .repository
            .active_overlapping(expert_id, client_id, request.start_time, request.end_time)
            .await?;

        let proposal = BookingProposal {
            expert_id,
            client_id,
            start: request.start_time,
            end: request.end_time,
        };
        let now = Utc::now();

        if let Err(rejection) = validate(&proposal, now, &windows, &existing, expert.user_id) {
            debug!("Booking proposal rejected: {}", rejection);
            return Err(rejection.into());
        }

        let booking = Booking {
            id: Uuid::new_v4(),
            client_id,
            expert_id,
            start_time: request.start_time,
            end_time: request.end_time,
            topic: topic.to_string(),
            additional_notes: request.agenda.filter(|a| !a.trim().is_empty()),
            total_amount: booking_amount(expert.fees_per_hr, request.start_time, request.end_time, self.platform_fee),
            bk_status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            transaction_id: None,
            payment_init_id: None,
            payment_attempt_id: None,
            session_id: None,
            user_reminder: 0,
            expert_reminder: 0,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let booking = self.repository.insert_checked(&booking).await?;
        info!("Booking {} created, amount {}", booking.id, booking.total_amount);
        Ok(booking)
    }

    /// Moves `bk_status` on behalf of the owning expert. Writing the current status is a no-op.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        actor: Uuid,
        booking_id: Uuid,
        raw_status: &str,
    ) -> Result<Booking, BookingError> {
        let booking = self.get(booking_id).await?;
        self.ensure_expert_owner(actor, &booking).await?;

        let target: BookingStatus = raw_status.parse()?;
        if target == booking.bk_status {
            debug!("Booking {} already {}", booking_id, target);
            return Ok(booking);
        }

        if !booking.bk_status.can_transition_to(target) {
            return Err(BookingError::InvalidTransition {
                from: booking.bk_status,
                to: target,
            });
        }

        let patch = BookingPatch {
            bk_status: Some(target),
            ..Default::default()
        };
        let updated = self.repository.update(booking_id, booking.version, &patch).await?;
        info!("Booking {} moved {} -> {}", booking_id, booking.bk_status, target);
        Ok(updated)
    }

    /// Client-side change of topic, agenda or duration, applied to the provider meeting first.
    #[instrument(skip(self, request))]
    pub async fn reschedule(
        &self,
        actor: Uuid,
        booking_id: Uuid,
        request: RescheduleBookingRequest,
    ) -> Result<(Booking, Session), BookingError> {
        let booking = self.get(booking_id).await?;
        if booking.client_id != actor {
            return Err(BookingError::Forbidden("Only the client can reschedule this booking".to_string()));
        }

        let session_id = booking.session_id.ok_or(BookingError::SessionMissing)?;

        if request.topic.is_none() && request.agenda.is_none() && request.duration.is_none() {
            return Err(BookingError::ValidationError("Nothing to update".to_string()));
        }

        let update = SessionUpdate {
            topic: request.topic.clone(),
            agenda: request.agenda.clone(),
            duration: request.duration,
        };
        let session = self.sessions.update_session(session_id, &update).await?;

        if request.topic.is_none() && request.agenda.is_none() {
            return Ok((booking, session));
        }

        let patch = BookingPatch {
            topic: request.topic,
            additional_notes: request.agenda,
            ..Default::default()
        };
        let booking = match self.repository.update(booking_id, booking.version, &patch).await {
            Ok(updated) => updated,
            Err(BookingError::StaleVersion) => {
                warn!("Booking {} changed during reschedule, session already updated", booking_id);
                return Err(BookingError::StaleVersion);
            }
            Err(e) => return Err(e),
        };

        Ok((booking, session))
    }

    /// Version-guarded write used by the payment flow.
    pub async fn apply_patch(
        &self,
        booking_id: Uuid,
        expected_version: i64,
        patch: &BookingPatch,
    ) -> Result<Booking, BookingError> {
        self.repository.update(booking_id, expected_version, patch).await
    }

    // ==============================================================================
    // QUERIES
    // ==============================================================================

    pub async fn get(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        self.repository.get(booking_id).await?.ok_or(BookingError::NotFound)
    }

    pub async fn find_by_transaction_id(&self, transaction_id: &str) -> Result<Booking, BookingError> {
        self.repository
            .find_by_transaction_id(transaction_id)
            .await?
            .ok_or(BookingError::NotFound)
    }

    pub async fn list_for_client(&self, client_id: Uuid) -> Result<Vec<Booking>, BookingError> {
        self.repository.list_for_client(client_id).await
    }

    pub async fn get_for_client(&self, client_id: Uuid, booking_id: Uuid) -> Result<Booking, BookingError> {
        let booking = self.get(booking_id).await?;
        if booking.client_id != client_id {
            return Err(BookingError::Forbidden("Booking belongs to another client".to_string()));
        }
        Ok(booking)
    }

    pub async fn get_for_expert(&self, actor: Uuid, booking_id: Uuid) -> Result<Booking, BookingError> {
        let booking = self.get(booking_id).await?;
        self.ensure_expert_owner(actor, &booking).await?;
        Ok(booking)
    }

    async fn ensure_expert_owner(&self, actor: Uuid, booking: &Booking) -> Result<(), BookingError> {
        match self.directory.get_expert_by_user(actor).await? {
            Some(expert) if expert.id == booking.expert_id => Ok(()),
            _ => Err(BookingError::Forbidden("Booking belongs to another expert".to_string())),
        }
    }
}
