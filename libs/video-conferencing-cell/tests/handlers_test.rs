use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser, WebhookTestUtils};
use task_scheduler_cell::{DeferredTaskScheduler, InMemoryTaskQueue};
use video_conferencing_cell::testing::RecordingVideoProvider;
use video_conferencing_cell::{
    video_conferencing_routes, InMemorySessionRepository, Session, SessionManager, SessionPlan, SessionStatus,
    VideoConferencingState,
};

const SECRET: &str = "test-zoom-webhook-secret";

struct TestApp {
    router: Router,
    sessions: Arc<SessionManager>,
}

fn create_test_app() -> TestApp {
    let config = TestConfig::default().to_arc();
    let sessions = Arc::new(SessionManager::new(
        Arc::new(RecordingVideoProvider::new()),
        Arc::new(InMemorySessionRepository::new()),
        DeferredTaskScheduler::new(Arc::new(InMemoryTaskQueue::new())),
    ));
    let router = video_conferencing_routes(VideoConferencingState::new(config, sessions.clone()));
    TestApp { router, sessions }
}

async fn provision(app: &TestApp) -> Session {
    let start = Utc::now() + Duration::hours(1);
    app.sessions
        .provision(&SessionPlan {
            booking_id: Uuid::new_v4(),
            topic: "Consultation".to_string(),
            agenda: None,
            start_time: start,
            end_time: start + Duration::minutes(30),
        })
        .await
        .unwrap()
}

fn signed_request(body: &str) -> Request<Body> {
    let ts = WebhookTestUtils::now_timestamp();
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .header("x-zm-request-timestamp", &ts)
        .header("x-zm-signature", WebhookTestUtils::signature(SECRET, &ts, body))
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_missing_signature_is_unauthorized_and_changes_nothing() {
    let app = create_test_app();
    let session = provision(&app).await;

    let body = json!({
        "event": "meeting.ended",
        "payload": { "object": { "id": session.provider_meeting_id } }
    })
    .to_string();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let stored = app.sessions.get_session(session.id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Scheduled);
}

#[tokio::test]
async fn test_bad_signature_is_unauthorized() {
    let app = create_test_app();
    let body = json!({ "event": "meeting.started", "payload": {} }).to_string();
    let ts = WebhookTestUtils::now_timestamp();

    let response = app
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("x-zm-request-timestamp", &ts)
                .header("x-zm-signature", WebhookTestUtils::signature("wrong-secret", &ts, &body))
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_url_validation_handshake() {
    let app = create_test_app();
    let body = json!({
        "event": "endpoint.url_validation",
        "payload": { "plainToken": "qgg8vlvZRS6UYooatFL8Aw" }
    })
    .to_string();

    let response = app.router.oneshot(signed_request(&body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["plainToken"], "qgg8vlvZRS6UYooatFL8Aw");
    assert_eq!(
        json["encryptedToken"],
        WebhookTestUtils::hmac_hex(SECRET, "qgg8vlvZRS6UYooatFL8Aw")
    );
}

#[tokio::test]
async fn test_unknown_event_is_acknowledged() {
    let app = create_test_app();
    let body = json!({ "event": "recording.completed", "payload": {} }).to_string();

    let response = app.router.oneshot(signed_request(&body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ignored");
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = create_test_app();
    let response = app.router.oneshot(signed_request("{not json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_started_event_with_string_id_updates_session() {
    let app = create_test_app();
    let session = provision(&app).await;

    let body = json!({
        "event": "meeting.started",
        "payload": {
            "object": {
                "id": session.provider_meeting_id.to_string(),
                "duration": 30
            }
        }
    })
    .to_string();

    let response = app.router.clone().oneshot(signed_request(&body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "success");
    let stored = app.sessions.get_session(session.id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Started);
}

#[tokio::test]
async fn test_event_for_unknown_session_is_acknowledged() {
    let app = create_test_app();
    let body = json!({
        "event": "meeting.ended",
        "payload": { "object": { "id": 999999 } }
    })
    .to_string();

    let response = app.router.oneshot(signed_request(&body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ignored");
}

fn signature_request(bearer: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/bookings/api/signature")
        .header("content-type", "application/json");
    if let Some(bearer) = bearer {
        builder = builder.header("authorization", bearer);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn client_bearer() -> String {
    JwtTestUtils::bearer(&TestUser::client("client@example.com"), &TestConfig::default().jwt_secret)
}

#[tokio::test]
async fn test_join_signature_requires_bearer() {
    let app = create_test_app();
    let body = json!({ "meetingNumber": 85746065, "role": 0 }).to_string();

    let response = app.router.oneshot(signature_request(None, &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_join_signature_returns_token_and_sdk_key() {
    let app = create_test_app();
    let bearer = client_bearer();
    let body = json!({ "meetingNumber": 85746065, "role": 0 }).to_string();

    let response = app.router.oneshot(signature_request(Some(&bearer), &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["signature"]["sdkKey"], "test-sdk-key");
    let token = json["signature"]["signature"].as_str().unwrap();
    assert_eq!(token.split('.').count(), 3);
}

#[tokio::test]
async fn test_join_signature_rejects_bad_body_and_role() {
    let app = create_test_app();
    let bearer = client_bearer();

    let missing_role = json!({ "meetingNumber": 85746065 }).to_string();
    let response = app
        .router
        .clone()
        .oneshot(signature_request(Some(&bearer), &missing_role))
        .await
        .unwrap();
    assert!(response.status().is_client_error());

    let bad_role = json!({ "meetingNumber": 85746065, "role": 7 }).to_string();
    let response = app.router.oneshot(signature_request(Some(&bearer), &bad_role)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
