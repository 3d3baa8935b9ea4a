// libs/payment-cell/src/services/orchestrator.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use booking_cell::{Booking, BookingError, BookingPatch, BookingService, BookingStatus, PaymentStatus};
use shared_config::AppConfig;
use video_conferencing_cell::{SessionManager, SessionPlan};

use crate::models::{
    GatewayNotification, GatewayProvider, GatewayStatus, InitializeData, InitializeRequest, InitiatePaymentRequest,
    MakePaymentRequest, PaymentAttemptRecord, PaymentError, PaymentInitRecord, PaymentStatusRecord, Reconciliation,
    RequestPaymentRequest, DEFAULT_CURRENCY, DEFAULT_PAYMENT_COUNTRY,
};
use crate::services::gateway::PaymentGateway;
use crate::services::records::PaymentRecordStore;

/// How often a reconciliation write is retried after losing a version race.
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Drives a booking's payment from initialization to a settled outcome.
///
/// `reconcile` is the single path that reads the gateway status and applies it;
/// the webhook and the manual status pull both go through it. Calls for the same
/// booking are serialized in-process, and the booking version guards writes
/// across processes.
pub struct PaymentOrchestrator {
    bookings: Arc<BookingService>,
    gateway: Arc<dyn PaymentGateway>,
    records: Arc<dyn PaymentRecordStore>,
    sessions: Arc<SessionManager>,
    backend_url: String,
    frontend_url: String,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl PaymentOrchestrator {
    pub fn new(
        config: &AppConfig,
        bookings: Arc<BookingService>,
        gateway: Arc<dyn PaymentGateway>,
        records: Arc<dyn PaymentRecordStore>,
        sessions: Arc<SessionManager>,
    ) -> Self {
        Self {
            bookings,
            gateway,
            records,
            sessions,
            backend_url: config.backend_url.trim_end_matches('/').to_string(),
            frontend_url: config.frontend_url.trim_end_matches('/').to_string(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn bookings(&self) -> &BookingService {
        &self.bookings
    }

    fn notify_url(&self, booking_id: Uuid) -> String {
        format!("{}/api/v1/payunit/notify?bookingID={}", self.backend_url, booking_id)
    }

    // ==============================================================================
    // CLIENT-DRIVEN STEPS
    // ==============================================================================

    #[instrument(skip(self, request))]
    pub async fn initialize(
        &self,
        client_id: Uuid,
        booking_id: Uuid,
        request: InitiatePaymentRequest,
    ) -> Result<(Booking, InitializeData), PaymentError> {
        let booking = self.bookings.get_for_client(client_id, booking_id).await?;

        if booking.payment_init_id.is_some() || booking.transaction_id.is_some() {
            return Err(PaymentError::AlreadyInitialized);
        }

        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let transaction_id = format!("txn_{}_{}_{}", nanos, client_id, booking.id);

        let data = self
            .gateway
            .initialize(&InitializeRequest {
                total_amount: booking.total_amount,
                currency: request.currency.unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
                transaction_id: transaction_id.clone(),
                return_url: format!("{}/dashboard/bookings", self.frontend_url),
                notify_url: self.notify_url(booking.id),
                payment_country: request
                    .payment_country
                    .unwrap_or_else(|| DEFAULT_PAYMENT_COUNTRY.to_string()),
            })
            .await
            .map_err(|e| {
                error!("Initialize failed for booking {} ({}): {}", booking.id, transaction_id, e);
                e
            })?;

        let record = self
            .records
            .save_init(&PaymentInitRecord {
                id: Uuid::new_v4(),
                booking_id: booking.id,
                transaction_id: transaction_id.clone(),
                transaction_url: data.transaction_url.clone(),
                t_id: data.t_id.clone(),
                t_sum: data.t_sum.clone(),
                t_url: data.t_url.clone(),
                providers: data.providers.clone(),
                created_at: Utc::now(),
            })
            .await?;

        let patch = BookingPatch {
            payment_init_id: Some(record.id),
            transaction_id: Some(transaction_id.clone()),
            ..Default::default()
        };
        let booking = self.bookings.apply_patch(booking.id, booking.version, &patch).await?;

        info!("Payment {} initialized for booking {}", transaction_id, booking.id);
        Ok((booking, data))
    }

    #[instrument(skip(self, request))]
    pub async fn request_payment(
        &self,
        client_id: Uuid,
        booking_id: Uuid,
        request: RequestPaymentRequest,
    ) -> Result<PaymentAttemptRecord, PaymentError> {
        if request.gateway.trim().is_empty() || request.phone_number.trim().is_empty() {
            return Err(PaymentError::ValidationError(
                "gateway and phone_number are required".to_string(),
            ));
        }

        let booking = self.bookings.get_for_client(client_id, booking_id).await?;
        let transaction_id = booking.transaction_id.clone().ok_or(PaymentError::NotInitialized)?;

        let data = self
            .gateway
            .make_payment(&MakePaymentRequest {
                gateway: request.gateway.clone(),
                amount: booking.total_amount,
                transaction_id: transaction_id.clone(),
                return_url: format!("{}/dashboard/booking/paymentsuccess", self.frontend_url),
                phone_number: request.phone_number,
                currency: DEFAULT_CURRENCY.to_string(),
                payment_type: "button".to_string(),
                notify_url: self.notify_url(booking.id),
            })
            .await
            .map_err(|e| {
                error!("Payment request failed for booking {} ({}): {}", booking.id, transaction_id, e);
                e
            })?;

        let attempt = self
            .records
            .save_attempt(&PaymentAttemptRecord {
                id: Uuid::new_v4(),
                booking_id: booking.id,
                gateway_payment_id: data.id,
                transaction_id,
                gateway: request.gateway,
                payment_status: data.payment_status,
                amount: data.amount,
                provider_transaction_id: data.provider_transaction_id,
                created_at: Utc::now(),
            })
            .await?;

        let patch = BookingPatch {
            payment_attempt_id: Some(attempt.id),
            ..Default::default()
        };
        self.bookings.apply_patch(booking.id, booking.version, &patch).await?;

        info!("Payment attempt {} recorded for booking {}", attempt.id, booking.id);
        Ok(attempt)
    }

    pub async fn providers(&self, client_id: Uuid, booking_id: Uuid) -> Result<Vec<GatewayProvider>, PaymentError> {
        let booking = self.bookings.get_for_client(client_id, booking_id).await?;
        let init = self
            .records
            .init_for_booking(booking.id)
            .await?
            .ok_or(PaymentError::NotInitialized)?;

        self.gateway.providers(&init.t_url, &init.t_id, &init.t_sum).await
    }

    /// Manual pull of the payment status by the owning client.
    pub async fn payment_status(&self, client_id: Uuid, booking_id: Uuid) -> Result<Reconciliation, PaymentError> {
        self.bookings.get_for_client(client_id, booking_id).await?;
        self.reconcile(booking_id).await
    }

    // ==============================================================================
    // GATEWAY-DRIVEN STEPS
    // ==============================================================================

    /// Push notification: resolves the booking by transaction and reconciles it.
    #[instrument(skip(self, notification))]
    pub async fn handle_notification(
        &self,
        query_booking_id: Option<&str>,
        notification: &GatewayNotification,
    ) -> Result<Reconciliation, PaymentError> {
        let transaction_id = notification
            .transaction_id
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PaymentError::ValidationError("transaction_id is required".to_string()))?;

        let booking = self.bookings.find_by_transaction_id(transaction_id).await?;

        if let Some(raw) = query_booking_id.filter(|q| !q.is_empty()) {
            let matches = Uuid::parse_str(raw).map(|id| id == booking.id).unwrap_or(false);
            if !matches {
                warn!("Transaction {} belongs to booking {}, not {}", transaction_id, booking.id, raw);
                return Err(PaymentError::TransactionMismatch(raw.to_string()));
            }
        }

        self.reconcile(booking.id).await
    }

    async fn lock_for(&self, booking_id: Uuid) -> Arc<Mutex<()>> {
        self.locks.lock().await.entry(booking_id).or_default().clone()
    }

    async fn release_lock(&self, booking_id: Uuid, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // Clones are only taken under the map lock, so two references means
        // nobody else is waiting on this booking.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&booking_id);
        }
    }

    /// Number of bookings with a live reconcile lock.
    pub async fn tracked_locks(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Fetches the gateway status and applies it to the booking.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, booking_id: Uuid) -> Result<Reconciliation, PaymentError> {
        let lock = self.lock_for(booking_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.reconcile_locked(booking_id).await
        };
        self.release_lock(booking_id, lock).await;
        result
    }

    async fn reconcile_locked(&self, booking_id: Uuid) -> Result<Reconciliation, PaymentError> {
        let booking = self.bookings.get(booking_id).await?;
        if booking.is_payment_settled() {
            info!("Booking {} already settled as {}", booking.id, booking.payment_status);
            return Ok(Reconciliation {
                booking,
                gateway_status: None,
            });
        }

        let transaction_id = booking.transaction_id.clone().ok_or(PaymentError::NotInitialized)?;

        let data = self.gateway.get_status(&transaction_id).await.map_err(|e| {
            error!("Status fetch failed for booking {} ({}): {}", booking.id, transaction_id, e);
            e
        })?;

        self.records
            .upsert_status(&PaymentStatusRecord::from_gateway(&data))
            .await?;

        let Some(status) = GatewayStatus::parse(&data.transaction_status) else {
            error!(
                "Gateway reported unknown status {:?} for booking {} ({})",
                data.transaction_status, booking.id, transaction_id
            );
            return Err(PaymentError::UnknownGatewayStatus(data.transaction_status));
        };

        let booking = match status {
            GatewayStatus::Pending => booking,
            GatewayStatus::Success => self.settle_success(booking).await?,
            GatewayStatus::Failed => self.settle_unpaid(booking, PaymentStatus::Failed).await?,
            GatewayStatus::Cancelled => self.settle_unpaid(booking, PaymentStatus::Cancelled).await?,
        };

        info!(
            "Reconciled booking {} ({}): gateway {}, payment {}",
            booking.id, transaction_id, status, booking.payment_status
        );
        Ok(Reconciliation {
            booking,
            gateway_status: Some(status),
        })
    }

    /// Marks the booking paid and confirmed with a fresh session, in one write.
    async fn settle_success(&self, mut booking: Booking) -> Result<Booking, PaymentError> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            if booking.is_payment_settled() {
                return Ok(booking);
            }

            let mut patch = BookingPatch {
                payment_status: Some(PaymentStatus::Paid),
                ..Default::default()
            };
            if booking.bk_status.can_transition_to(BookingStatus::Confirmed) {
                patch.bk_status = Some(BookingStatus::Confirmed);
            }

            if booking.session_id.is_some() || booking.bk_status == BookingStatus::Cancelled {
                if booking.bk_status == BookingStatus::Cancelled {
                    warn!("Booking {} was cancelled before payment cleared, not provisioning", booking.id);
                }
                match self.bookings.apply_patch(booking.id, booking.version, &patch).await {
                    Ok(updated) => return Ok(updated),
                    Err(BookingError::StaleVersion) => {
                        booking = self.bookings.get(booking.id).await?;
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            let session = self
                .sessions
                .provision(&SessionPlan {
                    booking_id: booking.id,
                    topic: booking.topic.clone(),
                    agenda: booking.additional_notes.clone(),
                    start_time: booking.start_time,
                    end_time: booking.end_time,
                })
                .await?;
            patch.session_id = Some(session.id);

            match self.bookings.apply_patch(booking.id, booking.version, &patch).await {
                Ok(updated) => return Ok(updated),
                Err(BookingError::StaleVersion) => {
                    warn!("Booking {} changed while provisioning, discarding session {}", booking.id, session.id);
                    if let Err(e) = self.sessions.discard(&session).await {
                        error!("Failed to discard session {}: {}", session.id, e);
                    }
                    booking = self.bookings.get(booking.id).await?;
                }
                Err(e) => {
                    if let Err(cleanup) = self.sessions.discard(&session).await {
                        error!("Failed to discard session {}: {}", session.id, cleanup);
                    }
                    return Err(e.into());
                }
            }
        }

        Err(BookingError::StaleVersion.into())
    }

    async fn settle_unpaid(&self, mut booking: Booking, outcome: PaymentStatus) -> Result<Booking, PaymentError> {
        let patch = BookingPatch {
            payment_status: Some(outcome),
            ..Default::default()
        };

        for _ in 0..MAX_WRITE_ATTEMPTS {
            if !booking.payment_status.can_advance_to(outcome) {
                return Ok(booking);
            }
            match self.bookings.apply_patch(booking.id, booking.version, &patch).await {
                Ok(updated) => return Ok(updated),
                Err(BookingError::StaleVersion) => booking = self.bookings.get(booking.id).await?,
                Err(e) => return Err(e.into()),
            }
        }

        Err(BookingError::StaleVersion.into())
    }
}
