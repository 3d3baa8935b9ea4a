use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_database::SupabaseClient;
use shared_utils::test_utils::TestConfig;
use video_conferencing_cell::{Participant, PostgrestSessionRepository, SessionRepository};

fn repository(server: &MockServer) -> PostgrestSessionRepository {
    let config = TestConfig {
        supabase_url: server.uri(),
        ..Default::default()
    };
    PostgrestSessionRepository::with_client(Arc::new(SupabaseClient::new(&config.to_app_config())))
}

#[tokio::test]
async fn close_participant_encodes_participant_filter() {
    let server = MockServer::start().await;
    let participant_id = "user 7&left_at=not.is.null";
    let joined_at = Utc::now() - Duration::minutes(10);
    let left_at = Utc::now();
    let open = Participant {
        id: Uuid::new_v4(),
        session_id: Uuid::new_v4(),
        provider_meeting_id: 42,
        meeting_uuid: None,
        participant_id: participant_id.to_string(),
        participant_name: None,
        participant_email: None,
        joined_at,
        left_at: None,
        duration_seconds: None,
    };
    let closed = Participant {
        left_at: Some(left_at),
        duration_seconds: Some(600),
        ..open.clone()
    };

    Mock::given(method("GET"))
        .and(path("/rest/v1/session_participants"))
        .and(query_param("participant_id", format!("eq.{}", participant_id)))
        .and(query_param("left_at", "is.null"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([open])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/session_participants"))
        .and(query_param("id", format!("eq.{}", open.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([closed])))
        .expect(1)
        .mount(&server)
        .await;

    let result = repository(&server)
        .close_participant(42, participant_id, left_at)
        .await
        .unwrap();
    assert_eq!(result.map(|p| p.left_at), Some(Some(left_at)));
}
