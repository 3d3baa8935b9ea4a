// libs/booking-cell/src/router.rs
use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, BookingState};

pub fn booking_routes(state: BookingState) -> Router {
    // Every booking route acts on behalf of the bearer.
    let protected_routes = Router::new()
        .route("/bookings/me", get(handlers::list_my_bookings))
        .route("/bookings/me/{id}", get(handlers::get_my_booking))
        .route("/bookings/expert/{id}", get(handlers::get_expert_booking))
        .route(
            "/bookings/{id}",
            post(handlers::create_booking).put(handlers::reschedule_booking),
        )
        .route("/bookings/{id}/status", patch(handlers::update_booking_status))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
