// libs/video-conferencing-cell/src/services/signature.rs
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use shared_config::AppConfig;

use crate::models::{UrlValidationResponse, VideoConferencingError};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-zm-signature";
pub const TIMESTAMP_HEADER: &str = "x-zm-request-timestamp";

/// Verifies provider webhook deliveries: `v0=hex(HMAC-SHA256(secret, "v0:{ts}:{body}"))`.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    /// Maximum accepted age of a delivery; 0 disables the check.
    tolerance_seconds: i64,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance_seconds: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_seconds,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.zoom_webhook_secret_token.clone(), config.zoom_webhook_tolerance_seconds)
    }

    fn mac(&self) -> Result<HmacSha256, VideoConferencingError> {
        if self.secret.is_empty() {
            return Err(VideoConferencingError::InvalidSignature {
                reason: "webhook secret not configured".to_string(),
            });
        }
        HmacSha256::new_from_slice(self.secret.as_bytes()).map_err(|_| VideoConferencingError::InvalidSignature {
            reason: "unusable webhook secret".to_string(),
        })
    }

    pub fn verify(
        &self,
        signature: &str,
        timestamp: &str,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), VideoConferencingError> {
        let sent_at: i64 = timestamp.trim().parse().map_err(|_| VideoConferencingError::InvalidSignature {
            reason: "timestamp is not a number".to_string(),
        })?;

        if self.tolerance_seconds > 0 && (now.timestamp() - sent_at).abs() > self.tolerance_seconds {
            return Err(VideoConferencingError::InvalidSignature {
                reason: "timestamp outside tolerance".to_string(),
            });
        }

        let provided = signature
            .strip_prefix("v0=")
            .and_then(|hex_digest| hex::decode(hex_digest.trim()).ok())
            .ok_or_else(|| VideoConferencingError::InvalidSignature {
                reason: "malformed signature".to_string(),
            })?;

        let mut mac = self.mac()?;
        mac.update(b"v0:");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(body);

        mac.verify_slice(&provided).map_err(|_| VideoConferencingError::InvalidSignature {
            reason: "signature mismatch".to_string(),
        })
    }

    /// Answers the `endpoint.url_validation` challenge.
    pub fn url_validation(&self, plain_token: &str) -> Result<UrlValidationResponse, VideoConferencingError> {
        let mut mac = self.mac()?;
        mac.update(plain_token.as_bytes());

        Ok(UrlValidationResponse {
            plain_token: plain_token.to_string(),
            encrypted_token: hex::encode(mac.finalize().into_bytes()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "zoom-webhook-secret";

    fn sign(ts: &str, body: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(format!("v0:{}:{}", ts, body).as_bytes());
        format!("v0={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn accepts_valid_signature() {
        let verifier = WebhookVerifier::new(SECRET, 300);
        let now = Utc::now();
        let ts = now.timestamp().to_string();
        let body = r#"{"event":"meeting.started"}"#;

        assert!(verifier.verify(&sign(&ts, body), &ts, body.as_bytes(), now).is_ok());
    }

    #[test]
    fn rejects_tampered_body() {
        let verifier = WebhookVerifier::new(SECRET, 300);
        let now = Utc::now();
        let ts = now.timestamp().to_string();
        let signature = sign(&ts, r#"{"event":"meeting.started"}"#);

        let result = verifier.verify(&signature, &ts, br#"{"event":"meeting.ended"}"#, now);
        assert!(matches!(result, Err(VideoConferencingError::InvalidSignature { .. })));
    }

    #[test]
    fn rejects_stale_timestamp_unless_disabled() {
        let now = Utc::now();
        let ts = (now.timestamp() - 3600).to_string();
        let body = "{}";
        let signature = sign(&ts, body);

        assert!(WebhookVerifier::new(SECRET, 300)
            .verify(&signature, &ts, body.as_bytes(), now)
            .is_err());
        assert!(WebhookVerifier::new(SECRET, 0)
            .verify(&signature, &ts, body.as_bytes(), now)
            .is_ok());
    }

    #[test]
    fn rejects_signature_without_version_prefix() {
        let verifier = WebhookVerifier::new(SECRET, 0);
        let result = verifier.verify("deadbeef", "1", b"{}", Utc::now());
        assert!(result.is_err());
    }

    #[test]
    fn url_validation_hashes_plain_token() {
        let verifier = WebhookVerifier::new(SECRET, 300);
        let response = verifier.url_validation("qgg8vlvZRS6UYooatFL8Aw").unwrap();

        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(b"qgg8vlvZRS6UYooatFL8Aw");
        assert_eq!(response.encrypted_token, hex::encode(mac.finalize().into_bytes()));
        assert_eq!(response.plain_token, "qgg8vlvZRS6UYooatFL8Aw");
    }

    #[test]
    fn rejects_non_hex_signature() {
        let verifier = WebhookVerifier::new(SECRET, 0);
        assert!(verifier.verify("v0=abc", "1", b"{}", Utc::now()).is_err());
        assert!(verifier.verify("v0=zz", "1", b"{}", Utc::now()).is_err());
    }
}
