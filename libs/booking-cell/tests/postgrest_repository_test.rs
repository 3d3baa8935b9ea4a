use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use booking_cell::{
    Booking, BookingError, BookingPatch, BookingRepository, BookingStatus, ConflictRejection, PaymentStatus,
    PostgrestBookingRepository,
};
use shared_database::SupabaseClient;
use shared_utils::test_utils::TestConfig;

fn repository(server: &MockServer) -> PostgrestBookingRepository {
    let config = TestConfig {
        supabase_url: server.uri(),
        ..Default::default()
    };
    PostgrestBookingRepository::with_client(Arc::new(SupabaseClient::new(&config.to_app_config())))
}

fn booking() -> Booking {
    let start = Utc::now() + Duration::days(1);
    Booking {
        id: Uuid::new_v4(),
        client_id: Uuid::new_v4(),
        expert_id: Uuid::new_v4(),
        start_time: start,
        end_time: start + Duration::hours(1),
        topic: "Audit prep".to_string(),
        additional_notes: None,
        total_amount: 5000,
        bk_status: BookingStatus::Pending,
        payment_status: PaymentStatus::Pending,
        transaction_id: None,
        payment_init_id: None,
        payment_attempt_id: None,
        session_id: None,
        user_reminder: 0,
        expert_reminder: 0,
        version: 1,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[tokio::test]
async fn exclusion_violation_maps_to_matching_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23P01",
            "message": "conflicting key value violates exclusion constraint \"no_client_overlap\"",
            "details": null
        })))
        .mount(&server)
        .await;

    let result = repository(&server).insert_checked(&booking()).await;
    assert_matches!(result, Err(BookingError::Rejected(ConflictRejection::ClientOverlap)));
}

#[tokio::test]
async fn expert_constraint_maps_to_expert_overlap() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23P01",
            "message": "conflicting key value violates exclusion constraint \"no_expert_overlap\""
        })))
        .mount(&server)
        .await;

    let result = repository(&server).insert_checked(&booking()).await;
    assert_matches!(result, Err(BookingError::Rejected(ConflictRejection::ExpertOverlap)));
}

#[tokio::test]
async fn other_storage_errors_stay_database_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let result = repository(&server).insert_checked(&booking()).await;
    assert_matches!(result, Err(BookingError::Database(_)));
}

#[tokio::test]
async fn version_guarded_update_bumps_version() {
    let server = MockServer::start().await;
    let stored = booking();
    let mut updated = stored.clone();
    updated.payment_status = PaymentStatus::Paid;
    updated.version = 2;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/bookings"))
        .and(query_param("id", format!("eq.{}", stored.id)))
        .and(query_param("version", "eq.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([updated])))
        .expect(1)
        .mount(&server)
        .await;

    let patch = BookingPatch {
        payment_status: Some(PaymentStatus::Paid),
        ..Default::default()
    };
    let result = repository(&server).update(stored.id, 1, &patch).await.unwrap();
    assert_eq!(result.version, 2);
    assert_eq!(result.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn empty_patch_result_distinguishes_stale_from_missing() {
    let server = MockServer::start().await;
    let stored = booking();
    let missing = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .and(query_param("id", format!("eq.{}", stored.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([stored])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .and(query_param("id", format!("eq.{}", missing)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let repo = repository(&server);
    let patch = BookingPatch {
        bk_status: Some(BookingStatus::Confirmed),
        ..Default::default()
    };

    assert_matches!(repo.update(stored.id, 1, &patch).await, Err(BookingError::StaleVersion));
    assert_matches!(repo.update(missing, 1, &patch).await, Err(BookingError::NotFound));
}

#[tokio::test]
async fn transaction_lookup_encodes_filter_value() {
    let server = MockServer::start().await;
    let mut stored = booking();
    let hostile = "txn_1&bk_status=eq.confirmed";
    stored.transaction_id = Some(hostile.to_string());

    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .and(query_param("transaction_id", format!("eq.{}", hostile)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([stored])))
        .expect(1)
        .mount(&server)
        .await;

    let found = repository(&server).find_by_transaction_id(hostile).await.unwrap();
    assert_eq!(found.map(|b| b.id), Some(stored.id));
}
