// libs/video-conferencing-cell/src/lib.rs
//! # Video Conferencing Cell
//!
//! Provisions and tears down the video meeting that belongs to a paid booking.
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------------------+
//! |                   Video Cell                        |
//! +-----------------------------------------------------+
//! |  handlers.rs    |  Webhook and join signature       |
//! |  router.rs      |  Route definitions                |
//! |  models.rs      |  Sessions, webhook payloads       |
//! |  services/      |  Business logic layer             |
//! |    provider.rs  |  Zoom REST client                 |
//! |    repository.rs|  Session + participant storage    |
//! |    session.rs   |  SessionManager, end task handler |
//! |    signature.rs |  Webhook signature verification   |
//! |    join_signature.rs  Meeting SDK join tokens      |
//! +-----------------------------------------------------+
//! ```
//!
//! ## Lifecycle
//!
//! - `provision` creates the meeting once payment clears and schedules an
//!   `end:session` task for `start + duration`.
//! - Provider webhooks (`POST /webhook`) move the session through
//!   scheduled, started and ended; a participant join re-schedules the end task.
//! - `POST /bookings/api/signature` (bearer auth) signs a Meeting SDK join token
//!   for a meeting number and role.
//! - The worker process runs `EndSessionTaskHandler`, which only needs the provider.
//!
//! ## Configuration
//!
//! - `ZOOM_ACCOUNT_ID`, `ZOOM_CLIENT_ID`, `ZOOM_CLIENT_SECRET` - server-to-server OAuth app
//! - `ZOOM_API_BASE_URL`, `ZOOM_OAUTH_URL` - optional, default to production
//! - `ZOOM_WEBHOOK_SECRET_TOKEN` - webhook signing secret
//! - `ZOOM_WEBHOOK_TOLERANCE_SECONDS` - replay window, 0 disables
//! - `ZOOM_SDK_CLIENT_ID`, `ZOOM_SDK_CLIENT_SECRET` - Meeting SDK app for join tokens

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod testing;

pub use models::{
    JoinSignature, JoinSignatureRequest, LifecycleEvent, Participant, Session, SessionPlan, SessionStatus, SessionUpdate, VideoConferencingError,
};

pub use services::{
    EndSessionTaskHandler, InMemorySessionRepository, JoinSignatureSigner, PostgrestSessionRepository, SessionManager,
    SessionRepository, VideoProvider, WebhookVerifier, ZoomClient,
};

pub use handlers::VideoConferencingState;
pub use router::video_conferencing_routes;
