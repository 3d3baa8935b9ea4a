// libs/payment-cell/src/services/records.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{PaymentAttemptRecord, PaymentError, PaymentInitRecord, PaymentStatusRecord};

const INITS_TABLE: &str = "payment_inits";
const ATTEMPTS_TABLE: &str = "payment_attempts";
const STATUSES_TABLE: &str = "payment_statuses";

/// Satellite records of a booking's gateway transaction, keyed by transaction ID.
#[async_trait]
pub trait PaymentRecordStore: Send + Sync {
    async fn save_init(&self, record: &PaymentInitRecord) -> Result<PaymentInitRecord, PaymentError>;

    async fn init_for_booking(&self, booking_id: Uuid) -> Result<Option<PaymentInitRecord>, PaymentError>;

    async fn save_attempt(&self, record: &PaymentAttemptRecord) -> Result<PaymentAttemptRecord, PaymentError>;

    /// Inserts the first status seen for a transaction and overwrites it afterwards.
    async fn upsert_status(&self, record: &PaymentStatusRecord) -> Result<PaymentStatusRecord, PaymentError>;

    async fn status(&self, transaction_id: &str) -> Result<Option<PaymentStatusRecord>, PaymentError>;
}

// ==============================================================================
// IN-MEMORY
// ==============================================================================

#[derive(Default)]
pub struct InMemoryPaymentRecords {
    inits: Mutex<Vec<PaymentInitRecord>>,
    attempts: Mutex<Vec<PaymentAttemptRecord>>,
    statuses: Mutex<HashMap<String, PaymentStatusRecord>>,
}

impl InMemoryPaymentRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn attempts(&self) -> Vec<PaymentAttemptRecord> {
        self.attempts.lock().await.clone()
    }
}

#[async_trait]
impl PaymentRecordStore for InMemoryPaymentRecords {
    async fn save_init(&self, record: &PaymentInitRecord) -> Result<PaymentInitRecord, PaymentError> {
        self.inits.lock().await.push(record.clone());
        Ok(record.clone())
    }

    async fn init_for_booking(&self, booking_id: Uuid) -> Result<Option<PaymentInitRecord>, PaymentError> {
        Ok(self
            .inits
            .lock()
            .await
            .iter()
            .rev()
            .find(|r| r.booking_id == booking_id)
            .cloned())
    }

    async fn save_attempt(&self, record: &PaymentAttemptRecord) -> Result<PaymentAttemptRecord, PaymentError> {
        self.attempts.lock().await.push(record.clone());
        Ok(record.clone())
    }

    async fn upsert_status(&self, record: &PaymentStatusRecord) -> Result<PaymentStatusRecord, PaymentError> {
        self.statuses
            .lock()
            .await
            .insert(record.transaction_id.clone(), record.clone());
        Ok(record.clone())
    }

    async fn status(&self, transaction_id: &str) -> Result<Option<PaymentStatusRecord>, PaymentError> {
        Ok(self.statuses.lock().await.get(transaction_id).cloned())
    }
}

// ==============================================================================
// POSTGREST
// ==============================================================================

pub struct PostgrestPaymentRecords {
    supabase: Arc<SupabaseClient>,
}

impl PostgrestPaymentRecords {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

fn to_row<T: serde::Serialize>(record: &T) -> Result<serde_json::Value, PaymentError> {
    serde_json::to_value(record).map_err(|e| PaymentError::Database(e.to_string()))
}

#[async_trait]
impl PaymentRecordStore for PostgrestPaymentRecords {
    async fn save_init(&self, record: &PaymentInitRecord) -> Result<PaymentInitRecord, PaymentError> {
        Ok(self.supabase.insert(INITS_TABLE, to_row(record)?).await?)
    }

    async fn init_for_booking(&self, booking_id: Uuid) -> Result<Option<PaymentInitRecord>, PaymentError> {
        Ok(self
            .supabase
            .select_one(INITS_TABLE, &format!("booking_id=eq.{}&order=created_at.desc", booking_id))
            .await?)
    }

    async fn save_attempt(&self, record: &PaymentAttemptRecord) -> Result<PaymentAttemptRecord, PaymentError> {
        Ok(self.supabase.insert(ATTEMPTS_TABLE, to_row(record)?).await?)
    }

    async fn upsert_status(&self, record: &PaymentStatusRecord) -> Result<PaymentStatusRecord, PaymentError> {
        if self.status(&record.transaction_id).await?.is_none() {
            return Ok(self.supabase.insert(STATUSES_TABLE, to_row(record)?).await?);
        }

        debug!("Updating stored status for {}", record.transaction_id);
        let rows: Vec<PaymentStatusRecord> = self
            .supabase
            .update(
                STATUSES_TABLE,
                &format!("transaction_id=eq.{}", urlencoding::encode(&record.transaction_id)),
                to_row(record)?,
            )
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| PaymentError::Database(format!("status row for {} vanished", record.transaction_id)))
    }

    async fn status(&self, transaction_id: &str) -> Result<Option<PaymentStatusRecord>, PaymentError> {
        Ok(self
            .supabase
            .select_one(STATUSES_TABLE, &format!("transaction_id=eq.{}", urlencoding::encode(transaction_id)))
            .await?)
    }
}
