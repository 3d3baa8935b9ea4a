// libs/video-conferencing-cell/src/services/mod.rs

pub mod join_signature;
pub mod provider;
pub mod repository;
pub mod session;
pub mod signature;

pub use join_signature::JoinSignatureSigner;
pub use provider::{VideoProvider, ZoomClient};
pub use repository::{InMemorySessionRepository, PostgrestSessionRepository, SessionRepository};
pub use session::{EndSessionTaskHandler, SessionManager};
pub use signature::WebhookVerifier;
