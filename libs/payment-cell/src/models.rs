// libs/payment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use booking_cell::{Booking, BookingError};
use video_conferencing_cell::VideoConferencingError;

pub const DEFAULT_CURRENCY: &str = "XAF";
pub const DEFAULT_PAYMENT_COUNTRY: &str = "CM";

// ==============================================================================
// GATEWAY WIRE MODELS
// ==============================================================================

/// Every gateway reply wraps its payload the same way.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayEnvelope<T> {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "statusCode", default)]
    pub status_code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializeRequest {
    pub total_amount: i64,
    pub currency: String,
    pub transaction_id: String,
    pub return_url: String,
    pub notify_url: String,
    pub payment_country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitializeData {
    pub transaction_id: String,
    #[serde(default)]
    pub transaction_url: Option<String>,
    pub t_id: String,
    pub t_sum: String,
    pub t_url: String,
    #[serde(default)]
    pub providers: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct MakePaymentRequest {
    pub gateway: String,
    pub amount: i64,
    pub transaction_id: String,
    pub return_url: String,
    pub phone_number: String,
    pub currency: String,
    #[serde(rename = "paymentType")]
    pub payment_type: String,
    pub notify_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MakePaymentData {
    pub id: String,
    pub transaction_id: String,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub provider_transaction_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentStatusData {
    pub transaction_id: String,
    pub transaction_status: String,
    #[serde(default)]
    pub transaction_amount: Option<i64>,
    #[serde(default)]
    pub transaction_currency: Option<String>,
    #[serde(default)]
    pub transaction_gateway: Option<String>,
    #[serde(default)]
    pub purchase_ref: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayProvider {
    pub shortcode: String,
    pub name: String,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub country: Option<GatewayCountry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayCountry {
    pub country_name: String,
    pub country_code: String,
}

/// Transaction statuses the gateway reports.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayStatus {
    Pending,
    Success,
    Failed,
    Cancelled,
}

impl GatewayStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(GatewayStatus::Pending),
            "SUCCESS" => Some(GatewayStatus::Success),
            "FAILED" => Some(GatewayStatus::Failed),
            "CANCELLED" => Some(GatewayStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayStatus::Pending => write!(f, "PENDING"),
            GatewayStatus::Success => write!(f, "SUCCESS"),
            GatewayStatus::Failed => write!(f, "FAILED"),
            GatewayStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

// ==============================================================================
// TRANSACTION RECORDS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentInitRecord {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub transaction_id: String,
    pub transaction_url: Option<String>,
    pub t_id: String,
    pub t_sum: String,
    pub t_url: String,
    pub providers: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentAttemptRecord {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub gateway_payment_id: String,
    pub transaction_id: String,
    pub gateway: String,
    pub payment_status: Option<String>,
    pub amount: Option<i64>,
    pub provider_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentStatusRecord {
    pub transaction_id: String,
    pub status: String,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub gateway: Option<String>,
    pub purchase_ref: Option<String>,
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentStatusRecord {
    pub fn from_gateway(data: &PaymentStatusData) -> Self {
        Self {
            transaction_id: data.transaction_id.clone(),
            status: data.transaction_status.clone(),
            amount: data.transaction_amount,
            currency: data.transaction_currency.clone(),
            gateway: data.transaction_gateway.clone(),
            purchase_ref: data.purchase_ref.clone(),
            message: data.message.clone(),
            updated_at: Utc::now(),
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitiatePaymentRequest {
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPaymentRequest {
    pub gateway: String,
    pub phone_number: String,
}

/// Gateway push body. Everything is optional and unknown fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayNotification {
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub transaction_status: Option<String>,
    #[serde(default)]
    pub transaction_amount: Option<f64>,
    #[serde(default)]
    pub transaction_gateway: Option<String>,
    #[serde(default)]
    pub transaction_currency: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub notify_url: Option<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyQuery {
    #[serde(rename = "bookingID", default)]
    pub booking_id: Option<String>,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    pub booking: Booking,
    /// `None` when the booking was already settled and the gateway was not asked.
    pub gateway_status: Option<GatewayStatus>,
}

// ==============================================================================
// ERROR HANDLING
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment gateway not configured")]
    NotConfigured,

    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error("Not permitted: {0}")]
    Forbidden(String),

    #[error("Payment transaction already initialized for this booking")]
    AlreadyInitialized,

    #[error("Payment transaction not initialized for this booking")]
    NotInitialized,

    #[error("Payment gateway error: {message}")]
    Upstream { message: String },

    #[error("Unknown gateway status: {0}")]
    UnknownGatewayStatus(String),

    #[error("Transaction does not belong to booking {0}")]
    TransactionMismatch(String),

    #[error("Untrusted webhook source: {0}")]
    UntrustedSource(String),

    #[error("Invalid request: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Session(#[from] VideoConferencingError),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<anyhow::Error> for PaymentError {
    fn from(err: anyhow::Error) -> Self {
        PaymentError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        PaymentError::Upstream {
            message: err.to_string(),
        }
    }
}
