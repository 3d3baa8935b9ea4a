// libs/booking-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde_json::{json, Value};
use tracing::error;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{BookingError, CreateBookingRequest, RescheduleBookingRequest, UpdateBookingStatusRequest};
use crate::services::BookingService;

#[derive(Clone)]
pub struct BookingState {
    pub config: Arc<AppConfig>,
    pub bookings: Arc<BookingService>,
}

impl BookingState {
    pub fn new(config: Arc<AppConfig>, bookings: Arc<BookingService>) -> Self {
        Self { config, bookings }
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::NotFound => AppError::NotFound("Booking not found".to_string()),
            BookingError::ExpertNotFound => AppError::NotFound("Expert not found".to_string()),
            BookingError::SessionMissing => AppError::NotFound("No session exists for this booking".to_string()),
            BookingError::Rejected(rejection) if rejection.is_conflict() => AppError::Conflict(rejection.to_string()),
            BookingError::Rejected(rejection) => AppError::BadRequest(rejection.to_string()),
            BookingError::Forbidden(message) => AppError::Forbidden(message),
            BookingError::InvalidStatus(status) => AppError::BadRequest(format!("Invalid booking status: {}", status)),
            e @ BookingError::InvalidTransition { .. } => AppError::Conflict(e.to_string()),
            BookingError::StaleVersion => {
                AppError::Conflict("Booking was modified concurrently, please retry".to_string())
            }
            BookingError::ValidationError(message) => AppError::ValidationError(message),
            BookingError::Session(e) => e.into(),
            BookingError::Database(message) => {
                error!("Booking storage error: {}", message);
                AppError::Database("Failed to access booking storage".to_string())
            }
        }
    }
}

// ==============================================================================
// CLIENT HANDLERS
// ==============================================================================

/// `POST /bookings/{id}`: the path id is the expert being booked.
#[axum::debug_handler]
pub async fn create_booking(
    State(state): State<BookingState>,
    Path(expert_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<Json<Value>, AppError> {
    let client_id = user.account_id()?;
    let booking = state.bookings.create_booking(client_id, expert_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "booking": booking,
        "message": "Booking created, awaiting payment"
    })))
}

#[axum::debug_handler]
pub async fn reschedule_booking(
    State(state): State<BookingState>,
    Path(booking_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleBookingRequest>,
) -> Result<Json<Value>, AppError> {
    let client_id = user.account_id()?;
    let (booking, session) = state.bookings.reschedule(client_id, booking_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "booking": booking,
        "session": session
    })))
}

#[axum::debug_handler]
pub async fn list_my_bookings(
    State(state): State<BookingState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let client_id = user.account_id()?;
    let bookings = state.bookings.list_for_client(client_id).await?;

    Ok(Json(json!({
        "success": true,
        "total": bookings.len(),
        "bookings": bookings
    })))
}

#[axum::debug_handler]
pub async fn get_my_booking(
    State(state): State<BookingState>,
    Path(booking_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let client_id = user.account_id()?;
    let booking = state.bookings.get_for_client(client_id, booking_id).await?;
    Ok(Json(json!({ "success": true, "booking": booking })))
}

// ==============================================================================
// EXPERT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_expert_booking(
    State(state): State<BookingState>,
    Path(booking_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = user.account_id()?;
    let booking = state.bookings.get_for_expert(actor, booking_id).await?;
    Ok(Json(json!({ "success": true, "booking": booking })))
}

#[axum::debug_handler]
pub async fn update_booking_status(
    State(state): State<BookingState>,
    Path(booking_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateBookingStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = user.account_id()?;
    let booking = state
        .bookings
        .update_status(actor, booking_id, &request.bk_status)
        .await?;

    Ok(Json(json!({
        "success": true,
        "booking": booking,
        "message": format!("Booking is now {}", booking.bk_status)
    })))
}
