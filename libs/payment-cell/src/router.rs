// libs/payment-cell/src/router.rs
use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, PaymentState};

pub fn payment_routes(state: PaymentState) -> Router {
    // The gateway authenticates by source address in live mode, not by bearer token.
    let public_routes = Router::new().route("/payunit/notify", post(handlers::payunit_notify));

    let protected_routes = Router::new()
        .route("/bookings/{id}/payunit/initiate", post(handlers::initiate_payment))
        .route("/bookings/{id}/payunit/makepayment", post(handlers::make_payment))
        .route("/bookings/{id}/getpaymentproviders", get(handlers::get_payment_providers))
        .route("/bookings/{id}/payment-status", get(handlers::get_payment_status))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
