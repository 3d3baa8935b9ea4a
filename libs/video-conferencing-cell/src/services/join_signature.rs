// libs/video-conferencing-cell/src/services/join_signature.rs
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tracing::debug;

use shared_config::AppConfig;

use crate::models::{
    JoinSignature, JoinSignatureRequest, VideoConferencingError, SDK_ROLE_ATTENDEE, SDK_ROLE_HOST,
};

type HmacSha256 = Hmac<Sha256>;

/// Issued-at is backdated to absorb client clock drift.
const CLOCK_SKEW_SECONDS: i64 = 30;
const SIGNATURE_LIFETIME_HOURS: i64 = 2;

#[derive(Serialize)]
struct Header {
    alg: &'static str,
    typ: &'static str,
}

#[derive(Serialize)]
struct JoinClaims<'a> {
    #[serde(rename = "appKey")]
    app_key: &'a str,
    mn: i64,
    role: i64,
    iat: i64,
    exp: i64,
    #[serde(rename = "tokenExp")]
    token_exp: i64,
}

/// Signs Meeting SDK join tokens (HS256) so a browser client can enter a session.
#[derive(Clone)]
pub struct JoinSignatureSigner {
    sdk_key: String,
    sdk_secret: String,
}

impl JoinSignatureSigner {
    pub fn new(sdk_key: impl Into<String>, sdk_secret: impl Into<String>) -> Self {
        Self {
            sdk_key: sdk_key.into(),
            sdk_secret: sdk_secret.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.zoom_sdk_client_id.clone(), config.zoom_sdk_client_secret.clone())
    }

    pub fn sign(
        &self,
        request: &JoinSignatureRequest,
        now: DateTime<Utc>,
    ) -> Result<JoinSignature, VideoConferencingError> {
        if self.sdk_key.is_empty() || self.sdk_secret.is_empty() {
            return Err(VideoConferencingError::NotConfigured);
        }
        if request.meeting_number <= 0 {
            return Err(VideoConferencingError::ValidationError {
                message: "meetingNumber must be a positive meeting id".to_string(),
            });
        }
        if request.role != SDK_ROLE_ATTENDEE && request.role != SDK_ROLE_HOST {
            return Err(VideoConferencingError::ValidationError {
                message: format!("role must be {} or {}", SDK_ROLE_ATTENDEE, SDK_ROLE_HOST),
            });
        }

        let iat = (now - Duration::seconds(CLOCK_SKEW_SECONDS)).timestamp();
        let exp = iat + Duration::hours(SIGNATURE_LIFETIME_HOURS).num_seconds();
        let claims = JoinClaims {
            app_key: &self.sdk_key,
            mn: request.meeting_number,
            role: request.role,
            iat,
            exp,
            token_exp: exp,
        };

        let header = serde_json::to_vec(&Header { alg: "HS256", typ: "JWT" })
            .map_err(|e| VideoConferencingError::ValidationError { message: e.to_string() })?;
        let claims = serde_json::to_vec(&claims)
            .map_err(|e| VideoConferencingError::ValidationError { message: e.to_string() })?;
        let signing_input = format!("{}.{}", URL_SAFE_NO_PAD.encode(header), URL_SAFE_NO_PAD.encode(claims));

        let mut mac = HmacSha256::new_from_slice(self.sdk_secret.as_bytes())
            .map_err(|_| VideoConferencingError::NotConfigured)?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        debug!("Issued join signature for meeting {} as role {}", request.meeting_number, request.role);

        Ok(JoinSignature {
            signature: format!("{}.{}", signing_input, signature),
            sdk_key: self.sdk_key.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::Value;

    const KEY: &str = "sdk-key";
    const SECRET: &str = "sdk-secret";

    fn request(meeting_number: i64, role: i64) -> JoinSignatureRequest {
        JoinSignatureRequest { meeting_number, role }
    }

    fn segment(token: &str, index: usize) -> Value {
        let raw = token.split('.').nth(index).unwrap();
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(raw).unwrap()).unwrap()
    }

    #[test]
    fn signs_claims_with_backdated_two_hour_window() {
        let now = Utc::now();
        let signed = JoinSignatureSigner::new(KEY, SECRET).sign(&request(85746065, 1), now).unwrap();
        assert_eq!(signed.sdk_key, KEY);

        assert_eq!(segment(&signed.signature, 0)["alg"], "HS256");
        let claims = segment(&signed.signature, 1);
        assert_eq!(claims["appKey"], KEY);
        assert_eq!(claims["mn"], 85746065);
        assert_eq!(claims["role"], 1);

        let iat = claims["iat"].as_i64().unwrap();
        assert_eq!(iat, now.timestamp() - 30);
        assert_eq!(claims["exp"].as_i64().unwrap(), iat + 7200);
        assert_eq!(claims["tokenExp"], claims["exp"]);
    }

    #[test]
    fn signature_verifies_with_sdk_secret_only() {
        let signed = JoinSignatureSigner::new(KEY, SECRET).sign(&request(1, 0), Utc::now()).unwrap();
        let (input, signature) = signed.signature.rsplit_once('.').unwrap();
        let signature = URL_SAFE_NO_PAD.decode(signature).unwrap();

        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(input.as_bytes());
        assert!(mac.verify_slice(&signature).is_ok());

        let mut wrong = HmacSha256::new_from_slice(b"other-secret").unwrap();
        wrong.update(input.as_bytes());
        assert!(wrong.verify_slice(&signature).is_err());
    }

    #[test]
    fn rejects_unknown_role_and_meeting_number() {
        let signer = JoinSignatureSigner::new(KEY, SECRET);
        assert_matches!(
            signer.sign(&request(1, 2), Utc::now()),
            Err(VideoConferencingError::ValidationError { .. })
        );
        assert_matches!(
            signer.sign(&request(0, 0), Utc::now()),
            Err(VideoConferencingError::ValidationError { .. })
        );
    }

    #[test]
    fn missing_credentials_are_not_configured() {
        assert_matches!(
            JoinSignatureSigner::new("", SECRET).sign(&request(1, 0), Utc::now()),
            Err(VideoConferencingError::NotConfigured)
        );
        assert_matches!(
            JoinSignatureSigner::new(KEY, "").sign(&request(1, 0), Utc::now()),
            Err(VideoConferencingError::NotConfigured)
        );
    }
}
