// libs/booking-cell/src/services/mod.rs

pub mod booking;
pub mod directory;
pub mod repository;
pub mod validator;

pub use booking::BookingService;
pub use directory::{ExpertDirectory, InMemoryExpertDirectory, PostgrestExpertDirectory};
pub use repository::{BookingRepository, InMemoryBookingRepository, PostgrestBookingRepository};
pub use validator::{booking_amount, validate};
