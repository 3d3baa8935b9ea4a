// libs/booking-cell/src/services/repository.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{PostgrestError, SupabaseClient};

use crate::models::{Booking, BookingError, BookingPatch, BookingProposal, ConflictRejection};
use crate::services::validator::check_overlaps;

const BOOKINGS_TABLE: &str = "bookings";

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Stores a new booking, re-checking the overlap rule atomically with the write.
    async fn insert_checked(&self, booking: &Booking) -> Result<Booking, BookingError>;

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, BookingError>;

    async fn find_by_transaction_id(&self, transaction_id: &str) -> Result<Option<Booking>, BookingError>;

    async fn list_for_client(&self, client_id: Uuid) -> Result<Vec<Booking>, BookingError>;

    /// Active bookings of the expert or the client that intersect `[start, end)`.
    async fn active_overlapping(
        &self,
        expert_id: Uuid,
        client_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Booking>, BookingError>;

    /// Applies `patch` only if the stored version still equals `expected_version`,
    /// bumping the version on success.
    async fn update(&self, id: Uuid, expected_version: i64, patch: &BookingPatch) -> Result<Booking, BookingError>;
}

fn proposal_of(booking: &Booking) -> BookingProposal {
    BookingProposal {
        expert_id: booking.expert_id,
        client_id: booking.client_id,
        start: booking.start_time,
        end: booking.end_time,
    }
}

// ==============================================================================
// IN-MEMORY
// ==============================================================================

/// Check and insert run under one lock, standing in for the storage exclusion constraints.
#[derive(Default)]
pub struct InMemoryBookingRepository {
    bookings: Mutex<Vec<Booking>>,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn insert_checked(&self, booking: &Booking) -> Result<Booking, BookingError> {
        let mut bookings = self.bookings.lock().await;
        check_overlaps(&proposal_of(booking), &bookings)?;
        bookings.push(booking.clone());
        Ok(booking.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, BookingError> {
        Ok(self.bookings.lock().await.iter().find(|b| b.id == id).cloned())
    }

    async fn find_by_transaction_id(&self, transaction_id: &str) -> Result<Option<Booking>, BookingError> {
        Ok(self
            .bookings
            .lock()
            .await
            .iter()
            .find(|b| b.transaction_id.as_deref() == Some(transaction_id))
            .cloned())
    }

    async fn list_for_client(&self, client_id: Uuid) -> Result<Vec<Booking>, BookingError> {
        let mut found: Vec<Booking> = self
            .bookings
            .lock()
            .await
            .iter()
            .filter(|b| b.client_id == client_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(found)
    }

    async fn active_overlapping(
        &self,
        expert_id: Uuid,
        client_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Booking>, BookingError> {
        Ok(self
            .bookings
            .lock()
            .await
            .iter()
            .filter(|b| (b.expert_id == expert_id || b.client_id == client_id) && b.is_active() && b.overlaps(start, end))
            .cloned()
            .collect())
    }

    async fn update(&self, id: Uuid, expected_version: i64, patch: &BookingPatch) -> Result<Booking, BookingError> {
        let mut bookings = self.bookings.lock().await;
        let stored = bookings.iter_mut().find(|b| b.id == id).ok_or(BookingError::NotFound)?;

        if stored.version != expected_version {
            debug!(
                "Stale update for booking {}: expected v{}, stored v{}",
                id, expected_version, stored.version
            );
            return Err(BookingError::StaleVersion);
        }

        patch.apply(stored);
        stored.version += 1;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }
}

// ==============================================================================
// POSTGREST
// ==============================================================================

/// Backed by the `bookings` table; overlap atomicity comes from the
/// `no_expert_overlap` / `no_client_overlap` exclusion constraints.
pub struct PostgrestBookingRepository {
    supabase: Arc<SupabaseClient>,
}

impl PostgrestBookingRepository {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn rejection_for(err: &PostgrestError) -> Option<ConflictRejection> {
    if !err.is_exclusion_violation() {
        return None;
    }
    if err.mentions("no_client_overlap") {
        Some(ConflictRejection::ClientOverlap)
    } else {
        Some(ConflictRejection::ExpertOverlap)
    }
}

#[async_trait]
impl BookingRepository for PostgrestBookingRepository {
    async fn insert_checked(&self, booking: &Booking) -> Result<Booking, BookingError> {
        let row = serde_json::to_value(booking).map_err(|e| BookingError::Database(e.to_string()))?;

        match self.supabase.insert::<Booking>(BOOKINGS_TABLE, row).await {
            Ok(stored) => Ok(stored),
            Err(err) => match err.downcast_ref::<PostgrestError>().and_then(rejection_for) {
                Some(rejection) => {
                    warn!("Insert of booking {} lost an overlap race: {}", booking.id, rejection);
                    Err(rejection.into())
                }
                None => Err(err.into()),
            },
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, BookingError> {
        Ok(self.supabase.select_one(BOOKINGS_TABLE, &format!("id=eq.{}", id)).await?)
    }

    async fn find_by_transaction_id(&self, transaction_id: &str) -> Result<Option<Booking>, BookingError> {
        Ok(self
            .supabase
            .select_one(BOOKINGS_TABLE, &format!("transaction_id=eq.{}", urlencoding::encode(transaction_id)))
            .await?)
    }

    async fn list_for_client(&self, client_id: Uuid) -> Result<Vec<Booking>, BookingError> {
        Ok(self
            .supabase
            .select(BOOKINGS_TABLE, &format!("client_id=eq.{}&order=start_time.desc", client_id))
            .await?)
    }

    async fn active_overlapping(
        &self,
        expert_id: Uuid,
        client_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Booking>, BookingError> {
        let query = format!(
            "bk_status=in.(pending,confirmed)&start_time=lt.{}&end_time=gt.{}&or=(expert_id.eq.{},client_id.eq.{})",
            timestamp(end),
            timestamp(start),
            expert_id,
            client_id
        );
        Ok(self.supabase.select(BOOKINGS_TABLE, &query).await?)
    }

    async fn update(&self, id: Uuid, expected_version: i64, patch: &BookingPatch) -> Result<Booking, BookingError> {
        let mut body = serde_json::to_value(patch).map_err(|e| BookingError::Database(e.to_string()))?;
        if let Value::Object(fields) = &mut body {
            fields.insert("version".to_string(), Value::from(expected_version + 1));
            fields.insert("updated_at".to_string(), Value::from(timestamp(Utc::now())));
        }

        let rows: Vec<Booking> = self
            .supabase
            .update(
                BOOKINGS_TABLE,
                &format!("id=eq.{}&version=eq.{}", id, expected_version),
                body,
            )
            .await?;

        if let Some(updated) = rows.into_iter().next() {
            return Ok(updated);
        }

        // Nothing matched: either the row is gone or the version moved on.
        match self.get(id).await? {
            Some(_) => Err(BookingError::StaleVersion),
            None => Err(BookingError::NotFound),
        }
    }
}
