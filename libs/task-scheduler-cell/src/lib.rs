//! Deferred task scheduling for the booking engine.
//!
//! The web process schedules work (`DeferredTaskScheduler`) and a separate worker
//! process executes it (`TaskWorker`). The only channel between the two is a
//! [`TaskQueue`]; `RedisTaskQueue` is the durable one, `InMemoryTaskQueue` backs
//! tests and single-process development runs.

pub mod error;
pub mod models;
pub mod services;

pub use error::*;
pub use models::*;
pub use services::*;
