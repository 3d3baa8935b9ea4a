// libs/booking-cell/src/lib.rs
//! # Booking Cell
//!
//! Reserves expert time for clients without double-booking either side.
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------------------+
//! |                  Booking Cell                       |
//! +-----------------------------------------------------+
//! |  handlers.rs     |  Booking HTTP handlers           |
//! |  router.rs       |  Route definitions               |
//! |  models.rs       |  Booking, statuses, rejections   |
//! |  services/       |  Business logic layer            |
//! |    validator.rs  |  Pure conflict rules, pricing    |
//! |    directory.rs  |  Experts and availability        |
//! |    repository.rs |  Version-guarded booking storage |
//! |    booking.rs    |  BookingService aggregate        |
//! +-----------------------------------------------------+
//! ```
//!
//! ## Conflict rules
//!
//! A proposal is checked in order: past start, minimum 30 minutes,
//! inside one availability window, no overlap with the expert's or the
//! client's active bookings, and no self-booking. The overlap rule is checked
//! again at insert time, under a lock in memory or by the `no_expert_overlap`
//! and `no_client_overlap` exclusion constraints in Postgres.

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    AvailabilityWindow, Booking, BookingError, BookingPatch, BookingProposal, BookingStatus, ConflictRejection,
    Expert, PaymentStatus,
};

pub use services::{
    BookingRepository, BookingService, ExpertDirectory, InMemoryBookingRepository, InMemoryExpertDirectory,
    PostgrestBookingRepository, PostgrestExpertDirectory,
};

pub use handlers::BookingState;
pub use router::booking_routes;
