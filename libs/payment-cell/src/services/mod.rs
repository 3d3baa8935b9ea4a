// libs/payment-cell/src/services/mod.rs

pub mod gateway;
pub mod orchestrator;
pub mod records;

pub use gateway::{PayUnitClient, PaymentGateway};
pub use orchestrator::PaymentOrchestrator;
pub use records::{InMemoryPaymentRecords, PaymentRecordStore, PostgrestPaymentRecords};
