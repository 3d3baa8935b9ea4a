// libs/payment-cell/src/lib.rs
//! # Payment Cell
//!
//! Takes a pending booking through the PayUnit hosted checkout and applies the
//! gateway's verdict to it.
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------------------+
//! |                  Payment Cell                       |
//! +-----------------------------------------------------+
//! |  handlers.rs      |  Client routes, gateway webhook |
//! |  router.rs        |  Route definitions              |
//! |  models.rs        |  Gateway wire types, records    |
//! |  services/        |  Business logic layer           |
//! |    gateway.rs     |  PayUnit REST client            |
//! |    records.rs     |  Init/attempt/status records    |
//! |    orchestrator.rs|  PaymentOrchestrator            |
//! +-----------------------------------------------------+
//! ```
//!
//! ## Reconciliation
//!
//! `POST /payunit/notify` and `GET /bookings/{id}/payment-status` both end in
//! `PaymentOrchestrator::reconcile`. A settled booking is returned as is. On
//! `SUCCESS` the session is provisioned before the booking is marked paid and
//! confirmed; if that write loses a version race the new session is discarded.
//!
//! ## Configuration
//!
//! - `PAYUNIT_BASE_URL`, `PAYUNIT_API_KEY`, `PAYUNIT_API_USERNAME`, `PAYUNIT_API_PASSWORD`
//! - `PAYUNIT_MODE` - `sandbox` or `live`; live mode checks the webhook source
//! - `PAYUNIT_TRUSTED_IP_PREFIX` - accepted webhook source prefix
//! - `PAYUNIT_STATUS_TIMEOUT_SECONDS` - bound on the status fetch

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{GatewayNotification, GatewayStatus, PaymentError, Reconciliation};

pub use services::{
    InMemoryPaymentRecords, PayUnitClient, PaymentGateway, PaymentOrchestrator, PaymentRecordStore,
    PostgrestPaymentRecords,
};

pub use handlers::PaymentState;
pub use router::payment_routes;
