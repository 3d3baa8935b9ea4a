// libs/video-conferencing-cell/src/router.rs
use axum::{middleware, routing::post, Router};

use shared_utils::extractor::auth_middleware;

use crate::handlers::*;

pub fn video_conferencing_routes(state: VideoConferencingState) -> Router {
    // The webhook authenticates by signature, not bearer token.
    let public_routes = Router::new().route("/webhook", post(zoom_webhook));

    let protected_routes = Router::new()
        .route("/bookings/api/signature", post(create_join_signature))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
