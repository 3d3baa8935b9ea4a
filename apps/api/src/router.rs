use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use booking_cell::{booking_routes, BookingState};
use payment_cell::{payment_routes, PaymentState};
use video_conferencing_cell::{video_conferencing_routes, VideoConferencingState};

use crate::engine::Engine;

pub fn create_router(engine: &Engine) -> Router {
    let api = Router::new()
        .merge(booking_routes(BookingState::new(
            engine.config.clone(),
            engine.bookings.clone(),
        )))
        .merge(payment_routes(PaymentState::new(
            engine.config.clone(),
            engine.payments.clone(),
        )))
        .merge(video_conferencing_routes(VideoConferencingState::new(
            engine.config.clone(),
            engine.sessions.clone(),
        )));

    Router::new()
        .route("/", get(|| async { "Consultation booking API is running!" }))
        .route("/health", get(health))
        .nest("/api/v1", api)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use shared_utils::test_utils::TestConfig;
    use tower::ServiceExt;

    async fn test_engine() -> Engine {
        let mut config = TestConfig::default().to_app_config();
        // Empty storage settings select the in-memory adapters.
        config.supabase_url = String::new();
        Engine::build(std::sync::Arc::new(config)).await.unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let router = create_router(&test_engine().await);

        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn cell_routes_are_mounted_under_api_prefix() {
        let engine = test_engine().await;
        assert!(engine.local_worker.is_some());

        let response = create_router(&engine)
            .oneshot(
                Request::builder()
                    .uri("/api/v1/bookings/me")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        // Reached the booking cell, which rejects the missing bearer token.
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
