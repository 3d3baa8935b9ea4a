// libs/payment-cell/src/handlers.rs
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{ConnectInfo, Extension, Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{GatewayNotification, InitiatePaymentRequest, NotifyQuery, PaymentError, RequestPaymentRequest};
use crate::services::PaymentOrchestrator;

#[derive(Clone)]
pub struct PaymentState {
    pub config: Arc<AppConfig>,
    pub payments: Arc<PaymentOrchestrator>,
}

impl PaymentState {
    pub fn new(config: Arc<AppConfig>, payments: Arc<PaymentOrchestrator>) -> Self {
        Self { config, payments }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::NotConfigured => AppError::Internal("Payment gateway not configured".to_string()),
            PaymentError::Booking(e) => e.into(),
            PaymentError::Forbidden(message) => AppError::Forbidden(message),
            e @ PaymentError::AlreadyInitialized => AppError::Conflict(e.to_string()),
            e @ PaymentError::NotInitialized => AppError::BadRequest(e.to_string()),
            PaymentError::Upstream { .. } => AppError::ExternalService("Payment gateway request failed".to_string()),
            PaymentError::UnknownGatewayStatus(_) => {
                AppError::ExternalService("Payment gateway returned an unknown status".to_string())
            }
            PaymentError::TransactionMismatch(_) => AppError::BadRequest("transaction mismatch".to_string()),
            PaymentError::UntrustedSource(_) => AppError::Auth("unauthorized webhook source".to_string()),
            PaymentError::ValidationError(message) => AppError::ValidationError(message),
            PaymentError::Session(e) => e.into(),
            PaymentError::Database(message) => {
                error!("Payment storage error: {}", message);
                AppError::Database("Failed to access payment storage".to_string())
            }
        }
    }
}

// ==============================================================================
// CLIENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn initiate_payment(
    State(state): State<PaymentState>,
    Path(booking_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<InitiatePaymentRequest>,
) -> Result<Json<Value>, AppError> {
    let client_id = user.account_id()?;
    let (booking, transaction) = state.payments.initialize(client_id, booking_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "transaction_id": booking.transaction_id,
        "message": transaction
    })))
}

#[axum::debug_handler]
pub async fn make_payment(
    State(state): State<PaymentState>,
    Path(booking_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<RequestPaymentRequest>,
) -> Result<Json<Value>, AppError> {
    let client_id = user.account_id()?;
    let attempt = state.payments.request_payment(client_id, booking_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "attempt": attempt,
        "message": "payment initiated"
    })))
}

#[axum::debug_handler]
pub async fn get_payment_providers(
    State(state): State<PaymentState>,
    Path(booking_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let client_id = user.account_id()?;
    let providers = state.payments.providers(client_id, booking_id).await?;
    Ok(Json(json!({ "success": true, "providers": providers })))
}

#[axum::debug_handler]
pub async fn get_payment_status(
    State(state): State<PaymentState>,
    Path(booking_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let client_id = user.account_id()?;
    let outcome = state.payments.payment_status(client_id, booking_id).await?;

    Ok(Json(json!({
        "success": true,
        "gateway_status": outcome.gateway_status,
        "booking": outcome.booking
    })))
}

// ==============================================================================
// GATEWAY WEBHOOK
// ==============================================================================

/// First `X-Forwarded-For` hop when present, otherwise the peer address.
fn remote_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    forwarded.or_else(|| peer.map(|addr| addr.ip().to_string()))
}

fn ensure_trusted_source(config: &AppConfig, headers: &HeaderMap, peer: Option<SocketAddr>) -> Result<(), PaymentError> {
    if !config.is_live_payment_mode() {
        return Ok(());
    }

    match remote_ip(headers, peer) {
        Some(ip) if ip.starts_with(&config.payunit_trusted_ip_prefix) => Ok(()),
        other => Err(PaymentError::UntrustedSource(other.unwrap_or_else(|| "unknown".to_string()))),
    }
}

#[axum::debug_handler]
pub async fn payunit_notify(
    State(state): State<PaymentState>,
    Query(query): Query<NotifyQuery>,
    peer: Option<Extension<ConnectInfo<SocketAddr>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let peer = peer.map(|Extension(ConnectInfo(addr))| addr);

    if let Err(e) = ensure_trusted_source(&state.config, &headers, peer) {
        warn!("Rejected gateway notification: {}", e);
        return Err(e.into());
    }

    let notification: GatewayNotification = serde_json::from_slice(&body).map_err(|e| {
        warn!("Invalid gateway notification payload: {}", e);
        AppError::BadRequest("invalid webhook payload".to_string())
    })?;

    info!(
        "Gateway notification for {:?}: {:?}",
        notification.transaction_id, notification.transaction_status
    );

    let outcome = state
        .payments
        .handle_notification(query.booking_id.as_deref(), &notification)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "message": format!("Webhook processed successfully for booking {}", outcome.booking.id)
    })))
}
