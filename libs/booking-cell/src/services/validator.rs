// libs/booking-cell/src/services/validator.rs
use chrono::{DateTime, Datelike, Duration, Utc};
use uuid::Uuid;

use crate::models::{
    AvailabilityWindow, Booking, BookingProposal, ConflictRejection, DurationViolation, MIN_BOOKING_MINUTES,
};

/// Checks a proposal against the booking rules. The first failing rule wins:
/// past start, duration, availability, overlap (expert before client), self-booking.
///
/// `existing_active` may contain any bookings; only active ones of the same
/// expert or client are considered.
pub fn validate(
    proposal: &BookingProposal,
    now: DateTime<Utc>,
    windows: &[AvailabilityWindow],
    existing_active: &[Booking],
    expert_user_id: Uuid,
) -> Result<(), ConflictRejection> {
    if proposal.start < now {
        return Err(ConflictRejection::PastBooking);
    }

    if proposal.end <= proposal.start {
        return Err(ConflictRejection::InvalidDuration(DurationViolation::EndNotAfterStart));
    }
    if proposal.end - proposal.start < Duration::minutes(MIN_BOOKING_MINUTES) {
        return Err(ConflictRejection::InvalidDuration(DurationViolation::TooShort));
    }

    if !within_availability(proposal, windows) {
        return Err(ConflictRejection::OutsideAvailability);
    }

    check_overlaps(proposal, existing_active)?;

    if proposal.client_id == expert_user_id {
        return Err(ConflictRejection::SelfBooking);
    }

    Ok(())
}

/// The range must sit inside a single window for its weekday, on one calendar day.
pub fn within_availability(proposal: &BookingProposal, windows: &[AvailabilityWindow]) -> bool {
    if proposal.start.date_naive() != proposal.end.date_naive() {
        return false;
    }

    let weekday = proposal.start.weekday();
    let start = proposal.start.time();
    let end = proposal.end.time();

    windows
        .iter()
        .filter(|w| w.expert_id == proposal.expert_id && w.day == weekday)
        .any(|w| w.start_time <= start && end <= w.end_time)
}

/// Overlap rule on its own, used again by repositories at insert time.
pub fn check_overlaps(proposal: &BookingProposal, existing: &[Booking]) -> Result<(), ConflictRejection> {
    let mut clashing = existing
        .iter()
        .filter(|b| b.is_active() && b.overlaps(proposal.start, proposal.end));

    if clashing.clone().any(|b| b.expert_id == proposal.expert_id) {
        return Err(ConflictRejection::ExpertOverlap);
    }
    if clashing.any(|b| b.client_id == proposal.client_id) {
        return Err(ConflictRejection::ClientOverlap);
    }
    Ok(())
}

/// `trunc(fees_per_hr * hours) + platform_fee`.
pub fn booking_amount(fees_per_hr: f64, start: DateTime<Utc>, end: DateTime<Utc>, platform_fee: i64) -> i64 {
    let hours = (end - start).num_seconds() as f64 / 3600.0;
    (fees_per_hr * hours).trunc() as i64 + platform_fee
}
