use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub payunit_base_url: String,
    pub zoom_api_base_url: String,
    pub zoom_oauth_url: String,
    pub zoom_webhook_secret: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            payunit_base_url: "http://localhost:9001".to_string(),
            zoom_api_base_url: "http://localhost:9002/v2".to_string(),
            zoom_oauth_url: "http://localhost:9002/oauth/token".to_string(),
            zoom_webhook_secret: "test-zoom-webhook-secret".to_string(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_service_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            redis_url: None,
            backend_url: "http://api.test".to_string(),
            frontend_url: "http://app.test".to_string(),
            server_port: 3000,
            payunit_base_url: self.payunit_base_url.clone(),
            payunit_api_key: "test-api-key".to_string(),
            payunit_username: "test-user".to_string(),
            payunit_password: "test-password".to_string(),
            payunit_mode: "sandbox".to_string(),
            payunit_trusted_ip_prefix: "138.197.".to_string(),
            payunit_status_timeout_seconds: 2,
            zoom_account_id: "test-account".to_string(),
            zoom_client_id: "test-client-id".to_string(),
            zoom_client_secret: "test-client-secret".to_string(),
            zoom_api_base_url: self.zoom_api_base_url.clone(),
            zoom_oauth_url: self.zoom_oauth_url.clone(),
            zoom_webhook_secret_token: self.zoom_webhook_secret.clone(),
            zoom_webhook_tolerance_seconds: 300,
            zoom_sdk_client_id: "test-sdk-key".to_string(),
            zoom_sdk_client_secret: "test-sdk-secret".to_string(),
            platform_fee: 1000,
            worker_concurrency: 2,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self::new("test@example.com", "client")
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn client(email: &str) -> Self {
        Self::new(email, "client")
    }

    pub fn expert(email: &str) -> Self {
        Self::new(email, "expert")
    }

    pub fn uuid(&self) -> Uuid {
        Uuid::parse_str(&self.id).expect("test users always carry uuid ids")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }

    pub fn bearer(user: &TestUser, secret: &str) -> String {
        format!("Bearer {}", Self::create_test_token(user, secret, None))
    }
}

/// Signs provider webhook bodies the way the video provider does.
pub struct WebhookTestUtils;

impl WebhookTestUtils {
    pub fn hmac_hex(secret: &str, message: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    pub fn signature(secret: &str, timestamp: &str, body: &str) -> String {
        format!("v0={}", Self::hmac_hex(secret, &format!("v0:{}:{}", timestamp, body)))
    }

    pub fn now_timestamp() -> String {
        Utc::now().timestamp().to_string()
    }
}

pub struct MockGatewayResponses;

impl MockGatewayResponses {
    pub fn initialize_response(transaction_id: &str) -> serde_json::Value {
        json!({
            "status": "SUCCESS",
            "statusCode": 200,
            "message": "Transaction created",
            "data": {
                "transaction_id": transaction_id,
                "transaction_url": format!("https://pay.test/{}", transaction_id),
                "t_id": "t-001",
                "t_sum": "sum-001",
                "t_url": "url-001",
                "providers": [
                    { "shortcode": "CM_MTNMOMO", "name": "MTN Mobile Money", "logo": "" }
                ]
            }
        })
    }

    pub fn make_payment_response(transaction_id: &str) -> serde_json::Value {
        json!({
            "status": "SUCCESS",
            "statusCode": 200,
            "message": "Payment request sent",
            "data": {
                "id": "pay-001",
                "transaction_id": transaction_id,
                "payment_status": "PENDING",
                "amount": 4000,
                "provider_transaction_id": "prov-001"
            }
        })
    }

    pub fn status_response(transaction_id: &str, status: &str) -> serde_json::Value {
        json!({
            "status": "SUCCESS",
            "statusCode": 200,
            "message": "Transaction status",
            "data": {
                "transaction_id": transaction_id,
                "transaction_status": status,
                "transaction_amount": 4000,
                "transaction_currency": "XAF",
                "transaction_gateway": "CM_MTNMOMO",
                "purchase_ref": "ref-001",
                "message": "status fetched"
            }
        })
    }
}

pub struct MockZoomResponses;

impl MockZoomResponses {
    pub fn token_response() -> serde_json::Value {
        json!({
            "access_token": "test-access-token",
            "token_type": "bearer",
            "expires_in": 3600,
            "scope": "meeting:write"
        })
    }

    pub fn meeting_response(meeting_id: i64, start_time: DateTime<Utc>, duration: i64) -> serde_json::Value {
        json!({
            "id": meeting_id,
            "uuid": "meeting-uuid==",
            "host_id": "host-001",
            "host_email": "host@example.com",
            "topic": "Consultation",
            "agenda": "Discuss project",
            "start_time": start_time.to_rfc3339(),
            "duration": duration,
            "timezone": "UTC",
            "password": "secret",
            "join_url": format!("https://zoom.test/j/{}", meeting_id),
            "start_url": format!("https://zoom.test/s/{}", meeting_id),
            "status": "waiting"
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert!(!app_config.supabase_jwt_secret.is_empty());
        assert!(app_config.is_payment_configured());
        assert!(app_config.is_video_conferencing_configured());
        assert!(!app_config.is_queue_configured());
    }

    #[test]
    fn test_user_creation() {
        let user = TestUser::expert("expert@example.com");
        assert_eq!(user.role, "expert");

        let user_model = user.to_user();
        assert_eq!(user_model.id, user.id);
        assert_eq!(user_model.account_id().unwrap(), user.uuid());
    }

    #[test]
    fn webhook_signature_has_version_prefix() {
        let signature = WebhookTestUtils::signature("secret", "1700000000", "{}");
        assert!(signature.starts_with("v0="));
        assert_eq!(signature.len(), 3 + 64);
    }
}
