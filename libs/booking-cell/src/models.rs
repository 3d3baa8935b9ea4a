// libs/booking-cell/src/models.rs
use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use video_conferencing_cell::VideoConferencingError;

/// Shortest bookable session.
pub const MIN_BOOKING_MINUTES: i64 = 30;

// ==============================================================================
// CORE BOOKING MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub client_id: Uuid,
    pub expert_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub topic: String,
    pub additional_notes: Option<String>,
    pub total_amount: i64,
    pub bk_status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub payment_init_id: Option<Uuid>,
    pub payment_attempt_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub user_reminder: i32,
    pub expert_reminder: i32,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.bk_status.is_active()
    }

    /// Half-open overlap: touching ranges do not conflict.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && start < self.end_time
    }

    /// Payment has reached a final outcome; reconciliation has nothing left to do.
    pub fn is_payment_settled(&self) -> bool {
        self.payment_status != PaymentStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    /// Statuses that hold the time slot.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn can_transition_to(&self, target: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, target),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Completed) | (Confirmed, Cancelled)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStatus::Pending => write!(f, "pending"),
            BookingStatus::Confirmed => write!(f, "confirmed"),
            BookingStatus::Cancelled => write!(f, "cancelled"),
            BookingStatus::Completed => write!(f, "completed"),
        }
    }
}

impl FromStr for BookingStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            other => Err(BookingError::InvalidStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    /// Payment status only moves forward, out of `Pending`.
    pub fn can_advance_to(&self, target: PaymentStatus) -> bool {
        *self == PaymentStatus::Pending && target != PaymentStatus::Pending
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Paid => write!(f, "paid"),
            PaymentStatus::Failed => write!(f, "failed"),
            PaymentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Field changes applied by a version-guarded update. `None` leaves the field alone.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct BookingPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bk_status: Option<BookingStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_init_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_attempt_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,
}

impl BookingPatch {
    pub fn apply(&self, booking: &mut Booking) {
        if let Some(status) = self.bk_status {
            booking.bk_status = status;
        }
        if let Some(status) = self.payment_status {
            booking.payment_status = status;
        }
        if let Some(txn) = &self.transaction_id {
            booking.transaction_id = Some(txn.clone());
        }
        if let Some(id) = self.payment_init_id {
            booking.payment_init_id = Some(id);
        }
        if let Some(id) = self.payment_attempt_id {
            booking.payment_attempt_id = Some(id);
        }
        if let Some(id) = self.session_id {
            booking.session_id = Some(id);
        }
        if let Some(topic) = &self.topic {
            booking.topic = topic.clone();
        }
        if let Some(notes) = &self.additional_notes {
            booking.additional_notes = Some(notes.clone());
        }
    }
}

// ==============================================================================
// EXPERT DIRECTORY MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Expert {
    pub id: Uuid,
    /// Account behind the expert profile; it may not book itself.
    pub user_id: Uuid,
    pub fees_per_hr: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilityWindow {
    pub expert_id: Uuid,
    pub day: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default)]
    pub is_weekend: bool,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    pub topic: String,
    #[serde(default)]
    pub agenda: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateBookingStatusRequest {
    pub bk_status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RescheduleBookingRequest {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub agenda: Option<String>,
    /// Minutes.
    #[serde(default)]
    pub duration: Option<i64>,
}

/// Candidate reservation handed to the conflict validator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookingProposal {
    pub expert_id: Uuid,
    pub client_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

// ==============================================================================
// ERROR HANDLING
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationViolation {
    EndNotAfterStart,
    TooShort,
}

/// Why a proposal was refused. Ordered by the rule that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConflictRejection {
    #[error("Cannot book a session in the past.")]
    PastBooking,

    #[error("{}", duration_message(.0))]
    InvalidDuration(DurationViolation),

    #[error("The selected time is outside the expert's available hours.")]
    OutsideAvailability,

    #[error("This expert already has a booking during that time.")]
    ExpertOverlap,

    #[error("You already have a booking that overlaps this time range.")]
    ClientOverlap,

    #[error("An expert cannot book their own time.")]
    SelfBooking,
}

fn duration_message(violation: &DurationViolation) -> &'static str {
    match violation {
        DurationViolation::EndNotAfterStart => "End time must be after start time.",
        DurationViolation::TooShort => "Booking duration must be at least 30 minutes.",
    }
}

impl ConflictRejection {
    /// Overlaps are conflicts with existing state; everything else is a bad request.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ConflictRejection::ExpertOverlap | ConflictRejection::ClientOverlap)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Booking not found")]
    NotFound,

    #[error("Expert not found")]
    ExpertNotFound,

    #[error("{0}")]
    Rejected(#[from] ConflictRejection),

    #[error("Not permitted: {0}")]
    Forbidden(String),

    #[error("Invalid booking status: {0}")]
    InvalidStatus(String),

    #[error("Cannot move booking from {from} to {to}")]
    InvalidTransition { from: BookingStatus, to: BookingStatus },

    #[error("Booking was modified concurrently")]
    StaleVersion,

    #[error("Booking has no session")]
    SessionMissing,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Session error: {0}")]
    Session(#[from] VideoConferencingError),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<anyhow::Error> for BookingError {
    fn from(err: anyhow::Error) -> Self {
        BookingError::Database(err.to_string())
    }
}
