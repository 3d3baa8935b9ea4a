// libs/video-conferencing-cell/src/services/provider.rs
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use shared_config::AppConfig;

use crate::models::{
    MeetingRequest, ProviderMeeting, SessionUpdate, VideoConferencingError, ZoomMeetingResponse,
    ZoomTokenResponse,
};

/// Tokens are refreshed this long before the provider says they expire.
const TOKEN_REFRESH_MARGIN_SECONDS: i64 = 60;

#[async_trait]
pub trait VideoProvider: Send + Sync {
    async fn create_session(&self, request: &MeetingRequest) -> Result<ProviderMeeting, VideoConferencingError>;

    /// Ends a running meeting. A meeting the provider no longer knows is already ended.
    async fn end_session(&self, meeting_id: i64) -> Result<(), VideoConferencingError>;

    /// Deletes a meeting. A meeting that is already gone counts as deleted.
    async fn delete_session(&self, meeting_id: i64) -> Result<(), VideoConferencingError>;

    async fn update_session(&self, meeting_id: i64, update: &SessionUpdate) -> Result<(), VideoConferencingError>;
}

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Zoom REST client using server-to-server OAuth.
pub struct ZoomClient {
    client: Client,
    api_base_url: String,
    oauth_url: String,
    account_id: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl ZoomClient {
    pub fn new(config: &AppConfig) -> Result<Self, VideoConferencingError> {
        if !config.is_video_conferencing_configured() {
            return Err(VideoConferencingError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(VideoConferencingError::from)?;

        Ok(Self {
            client,
            api_base_url: config.zoom_api_base_url.trim_end_matches('/').to_string(),
            oauth_url: config.zoom_oauth_url.clone(),
            account_id: config.zoom_account_id.clone(),
            client_id: config.zoom_client_id.clone(),
            client_secret: config.zoom_client_secret.clone(),
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, VideoConferencingError> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.access_token.clone());
            }
        }

        debug!("Requesting Zoom access token");

        let credentials = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));
        let response = self
            .client
            .post(&self.oauth_url)
            .query(&[("grant_type", "account_credentials"), ("account_id", self.account_id.as_str())])
            .header("Authorization", format!("Basic {}", credentials))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let response_text = response.text().await?;
            error!("Zoom token request failed: {} - {}", status, response_text);
            return Err(VideoConferencingError::ProviderError {
                message: format!("token request failed with HTTP {}", status),
            });
        }

        let token: ZoomTokenResponse = response.json().await.map_err(|e| {
            VideoConferencingError::ProviderResponseInvalid {
                message: format!("Failed to parse token response: {}", e),
            }
        })?;

        let lifetime = (token.expires_in - TOKEN_REFRESH_MARGIN_SECONDS).max(0);
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Utc::now() + chrono::Duration::seconds(lifetime),
        });

        Ok(token.access_token)
    }

    /// Shared handling for end/delete, where a 404 means the work is already done.
    async fn expect_done(
        &self,
        response: reqwest::Response,
        action: &str,
        meeting_id: i64,
    ) -> Result<(), VideoConferencingError> {
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            warn!("Zoom meeting {} not found on {}, treating as done", meeting_id, action);
            return Ok(());
        }

        if status != StatusCode::OK && status != StatusCode::NO_CONTENT {
            let response_text = response.text().await?;
            error!("Zoom {} failed for meeting {}: {} - {}", action, meeting_id, status, response_text);
            return Err(VideoConferencingError::ProviderError {
                message: format!("{} failed with HTTP {}", action, status),
            });
        }

        info!("Zoom {} succeeded for meeting {}", action, meeting_id);
        Ok(())
    }
}

#[async_trait]
impl VideoProvider for ZoomClient {
    async fn create_session(&self, request: &MeetingRequest) -> Result<ProviderMeeting, VideoConferencingError> {
        info!("Creating Zoom meeting starting at {}", request.start_time);

        let token = self.access_token().await?;
        let url = format!("{}/users/me/meetings", self.api_base_url);

        let body = json!({
            "topic": request.topic,
            "agenda": request.agenda,
            "type": 2,
            "start_time": request.start_time.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            "duration": request.duration_minutes,
            "timezone": "UTC",
            "settings": {
                "host_video": true,
                "participant_video": true,
                "join_before_host": true,
                "auto_start_meeting": true,
                "waiting_room": false,
                "mute_upon_entry": false,
                "audio_setting": "both",
                "approval_type": 0,
                "auto_recording": "none"
            }
        });

        let response = self.client.post(&url).bearer_auth(token).json(&body).send().await?;

        let status = response.status();
        let response_text = response.text().await?;

        if status != StatusCode::CREATED {
            error!("Zoom meeting creation failed: {} - {}", status, response_text);
            return Err(VideoConferencingError::ProviderError {
                message: format!("meeting creation failed with HTTP {}", status),
            });
        }

        let meeting: ZoomMeetingResponse = serde_json::from_str(&response_text).map_err(|e| {
            VideoConferencingError::ProviderResponseInvalid {
                message: format!("Failed to parse meeting response: {}", e),
            }
        })?;

        let meeting_id = meeting
            .id
            .as_ref()
            .and_then(|id| id.as_i64())
            .filter(|id| *id != 0)
            .ok_or_else(|| VideoConferencingError::ProviderResponseInvalid {
                message: "missing or zero meeting id".to_string(),
            })?;

        info!("Created Zoom meeting {}", meeting_id);

        Ok(ProviderMeeting {
            meeting_id,
            join_url: meeting.join_url,
            start_url: meeting.start_url,
            host_id: meeting.host_id,
            host_email: meeting.host_email,
            password: meeting.password,
            start_time: meeting.start_time.unwrap_or(request.start_time),
            duration_minutes: meeting.duration.unwrap_or(request.duration_minutes),
            timezone: meeting.timezone.unwrap_or_else(|| "UTC".to_string()),
        })
    }

    async fn end_session(&self, meeting_id: i64) -> Result<(), VideoConferencingError> {
        let token = self.access_token().await?;
        let url = format!("{}/meetings/{}/status", self.api_base_url, meeting_id);

        let response = self
            .client
            .put(&url)
            .bearer_auth(token)
            .json(&json!({ "action": "end" }))
            .send()
            .await?;

        self.expect_done(response, "end", meeting_id).await
    }

    async fn delete_session(&self, meeting_id: i64) -> Result<(), VideoConferencingError> {
        let token = self.access_token().await?;
        let url = format!("{}/meetings/{}", self.api_base_url, meeting_id);

        let response = self.client.delete(&url).bearer_auth(token).send().await?;

        self.expect_done(response, "delete", meeting_id).await
    }

    async fn update_session(&self, meeting_id: i64, update: &SessionUpdate) -> Result<(), VideoConferencingError> {
        let token = self.access_token().await?;
        let url = format!("{}/meetings/{}", self.api_base_url, meeting_id);

        let response = self.client.patch(&url).bearer_auth(token).json(update).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(VideoConferencingError::SessionNotFound);
        }
        if !status.is_success() {
            let response_text = response.text().await?;
            error!("Zoom meeting update failed for {}: {} - {}", meeting_id, status, response_text);
            return Err(VideoConferencingError::ProviderError {
                message: format!("meeting update failed with HTTP {}", status),
            });
        }

        info!("Updated Zoom meeting {}", meeting_id);
        Ok(())
    }
}
