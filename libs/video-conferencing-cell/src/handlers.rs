// libs/video-conferencing-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Extension, Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{JoinSignatureRequest, VideoConferencingError, ZoomWebhookEvent};
use crate::services::signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::services::{JoinSignatureSigner, SessionManager, WebhookVerifier};

#[derive(Clone)]
pub struct VideoConferencingState {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<SessionManager>,
    pub verifier: WebhookVerifier,
    pub signer: JoinSignatureSigner,
}

impl VideoConferencingState {
    pub fn new(config: Arc<AppConfig>, sessions: Arc<SessionManager>) -> Self {
        let verifier = WebhookVerifier::from_config(&config);
        let signer = JoinSignatureSigner::from_config(&config);
        Self {
            config,
            sessions,
            verifier,
            signer,
        }
    }
}

impl From<VideoConferencingError> for AppError {
    fn from(err: VideoConferencingError) -> Self {
        match err {
            VideoConferencingError::SessionNotFound => AppError::NotFound("Session not found".to_string()),
            VideoConferencingError::ProviderError { .. }
            | VideoConferencingError::ProviderResponseInvalid { .. } => {
                AppError::ExternalService("Video provider request failed".to_string())
            }
            VideoConferencingError::NotConfigured => {
                AppError::Internal("Video conferencing not configured".to_string())
            }
            VideoConferencingError::InvalidSignature { .. } => {
                AppError::Auth("Invalid webhook signature".to_string())
            }
            VideoConferencingError::InvalidWebhookPayload { message } => AppError::BadRequest(message),
            VideoConferencingError::Scheduling(_) => {
                AppError::Internal("Failed to schedule session termination".to_string())
            }
            VideoConferencingError::DatabaseError { .. } => {
                AppError::Database("Failed to access session storage".to_string())
            }
            VideoConferencingError::ValidationError { message } => AppError::ValidationError(message),
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).filter(|v| !v.is_empty())
}

// ==============================================================================
// PROVIDER WEBHOOK
// ==============================================================================

/// Provider webhook: signature check, URL validation handshake, lifecycle events.
#[axum::debug_handler]
pub async fn zoom_webhook(
    State(state): State<VideoConferencingState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let (Some(signature), Some(timestamp)) = (header(&headers, SIGNATURE_HEADER), header(&headers, TIMESTAMP_HEADER))
    else {
        warn!("Webhook delivery without signature headers");
        return Err(AppError::Auth("Missing webhook signature".to_string()));
    };

    state
        .verifier
        .verify(signature, timestamp, &body, Utc::now())
        .map_err(|e| {
            warn!("Rejected webhook delivery: {}", e);
            AppError::from(e)
        })?;

    let delivery: ZoomWebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Malformed webhook payload: {}", e)))?;

    if delivery.event == "endpoint.url_validation" {
        let plain_token = delivery
            .payload
            .plain_token
            .as_deref()
            .ok_or_else(|| AppError::BadRequest("url_validation without plainToken".to_string()))?;
        let response = state.verifier.url_validation(plain_token)?;
        return Ok(Json(json!(response)));
    }

    let Some(event) = delivery.to_lifecycle_event()? else {
        warn!("Ignoring unhandled webhook event {}", delivery.event);
        return Ok(Json(json!({ "status": "ignored", "event": delivery.event })));
    };

    match state.sessions.on_lifecycle_event(event).await {
        Ok(session) => {
            info!("Processed {} for session {}", delivery.event, session.id);
            Ok(Json(json!({ "status": "success", "event": delivery.event })))
        }
        Err(VideoConferencingError::SessionNotFound) => {
            warn!("Webhook {} for unknown session, dropping", delivery.event);
            Ok(Json(json!({ "status": "ignored", "event": delivery.event })))
        }
        Err(e) => Err(e.into()),
    }
}

// ==============================================================================
// MEETING SDK
// ==============================================================================

/// Signs a Meeting SDK join token for the caller's browser client.
#[axum::debug_handler]
pub async fn create_join_signature(
    State(state): State<VideoConferencingState>,
    Extension(user): Extension<User>,
    Json(request): Json<JoinSignatureRequest>,
) -> Result<Json<Value>, AppError> {
    let signature = state.signer.sign(&request, Utc::now()).map_err(|e| {
        warn!("Join signature refused for {}: {}", user.id, e);
        AppError::from(e)
    })?;

    info!("Issued join signature for meeting {} to {}", request.meeting_number, user.id);
    Ok(Json(json!({ "signature": signature })))
}
