// libs/video-conferencing-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// SESSION MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: Uuid,
    pub provider_meeting_id: i64,
    pub booking_id: Uuid,
    pub topic: String,
    pub agenda: Option<String>,
    pub join_url: String,
    pub start_url: String,
    pub host_id: String,
    pub host_email: String,
    pub password: Option<String>,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub timezone: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn scheduled_end(&self) -> DateTime<Utc> {
        self.start_time + chrono::Duration::minutes(self.duration_minutes)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    Started,
    Ended,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Scheduled => write!(f, "scheduled"),
            SessionStatus::Started => write!(f, "started"),
            SessionStatus::Ended => write!(f, "ended"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub id: Uuid,
    pub session_id: Uuid,
    pub provider_meeting_id: i64,
    pub meeting_uuid: Option<String>,
    pub participant_id: String,
    pub participant_name: Option<String>,
    pub participant_email: Option<String>,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
}

/// What a booking needs from the session manager to get a meeting.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub booking_id: Uuid,
    pub topic: String,
    pub agenda: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl SessionPlan {
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agenda: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
}

// ==============================================================================
// PROVIDER MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct MeetingRequest {
    pub topic: String,
    pub agenda: Option<String>,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
}

/// Normalized reply from the provider's create call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderMeeting {
    pub meeting_id: i64,
    pub join_url: String,
    pub start_url: String,
    pub host_id: String,
    pub host_email: String,
    pub password: Option<String>,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub timezone: String,
}

/// Zoom sends meeting ids as numbers in some payloads and strings in others.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum MeetingId {
    Number(i64),
    Text(String),
}

impl MeetingId {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MeetingId::Number(n) => Some(*n),
            MeetingId::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ZoomTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
pub struct ZoomMeetingResponse {
    #[serde(default)]
    pub id: Option<MeetingId>,
    #[serde(default)]
    pub join_url: String,
    #[serde(default)]
    pub start_url: String,
    #[serde(default)]
    pub host_id: String,
    #[serde(default)]
    pub host_email: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub timezone: Option<String>,
}

// ==============================================================================
// WEBHOOK MODELS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct ZoomWebhookEvent {
    pub event: String,
    #[serde(default)]
    pub event_ts: Option<i64>,
    #[serde(default)]
    pub payload: ZoomWebhookPayload,
}

#[derive(Debug, Default, Deserialize)]
pub struct ZoomWebhookPayload {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(rename = "plainToken", default)]
    pub plain_token: Option<String>,
    #[serde(default)]
    pub object: Option<ZoomWebhookObject>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ZoomWebhookObject {
    #[serde(default)]
    pub id: Option<MeetingId>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub participant: Option<ZoomWebhookParticipant>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ZoomWebhookParticipant {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub participant_uuid: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub join_time: Option<String>,
    #[serde(default)]
    pub leave_time: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct UrlValidationResponse {
    #[serde(rename = "plainToken")]
    pub plain_token: String,
    #[serde(rename = "encryptedToken")]
    pub encrypted_token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantInfo {
    pub participant_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub joined_at: Option<DateTime<Utc>>,
    pub left_at: Option<DateTime<Utc>>,
}

/// Provider lifecycle events the session manager reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Started {
        meeting_id: i64,
        start_time: Option<DateTime<Utc>>,
        duration: Option<i64>,
    },
    Ended {
        meeting_id: i64,
        duration: Option<i64>,
    },
    ParticipantJoined {
        meeting_id: i64,
        meeting_uuid: Option<String>,
        participant: ParticipantInfo,
    },
    ParticipantLeft {
        meeting_id: i64,
        participant: ParticipantInfo,
    },
}

impl LifecycleEvent {
    pub fn meeting_id(&self) -> i64 {
        match self {
            LifecycleEvent::Started { meeting_id, .. }
            | LifecycleEvent::Ended { meeting_id, .. }
            | LifecycleEvent::ParticipantJoined { meeting_id, .. }
            | LifecycleEvent::ParticipantLeft { meeting_id, .. } => *meeting_id,
        }
    }
}

fn parse_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.filter(|s| !s.is_empty())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

impl ZoomWebhookEvent {
    /// Maps a delivery onto a lifecycle event. `Ok(None)` means the event type is not one we track.
    pub fn to_lifecycle_event(&self) -> Result<Option<LifecycleEvent>, VideoConferencingError> {
        let tracked = matches!(
            self.event.as_str(),
            "meeting.started" | "meeting.ended" | "meeting.participant_joined" | "meeting.participant_left"
        );
        if !tracked {
            return Ok(None);
        }

        let object = self.payload.object.as_ref().ok_or_else(|| {
            VideoConferencingError::InvalidWebhookPayload {
                message: format!("{} without payload.object", self.event),
            }
        })?;

        let meeting_id = object
            .id
            .as_ref()
            .and_then(MeetingId::as_i64)
            .ok_or_else(|| VideoConferencingError::InvalidWebhookPayload {
                message: format!("{} without a usable meeting id", self.event),
            })?;

        let participant = || -> Result<ParticipantInfo, VideoConferencingError> {
            let p = object.participant.as_ref().ok_or_else(|| {
                VideoConferencingError::InvalidWebhookPayload {
                    message: format!("{} without participant", self.event),
                }
            })?;
            let participant_id = p
                .participant_uuid
                .clone()
                .or_else(|| p.user_id.clone())
                .or_else(|| p.id.clone())
                .filter(|id| !id.is_empty())
                .ok_or_else(|| VideoConferencingError::InvalidWebhookPayload {
                    message: "participant without an id".to_string(),
                })?;

            Ok(ParticipantInfo {
                participant_id,
                name: p.user_name.clone(),
                email: p.email.clone().filter(|e| !e.is_empty()),
                joined_at: parse_time(p.join_time.as_deref()),
                left_at: parse_time(p.leave_time.as_deref()),
            })
        };

        let event = match self.event.as_str() {
            "meeting.started" => LifecycleEvent::Started {
                meeting_id,
                start_time: parse_time(object.start_time.as_deref()),
                duration: object.duration,
            },
            "meeting.ended" => LifecycleEvent::Ended {
                meeting_id,
                duration: object.duration,
            },
            "meeting.participant_joined" => LifecycleEvent::ParticipantJoined {
                meeting_id,
                meeting_uuid: object.uuid.clone(),
                participant: participant()?,
            },
            _ => LifecycleEvent::ParticipantLeft {
                meeting_id,
                participant: participant()?,
            },
        };

        Ok(Some(event))
    }
}

// ==============================================================================
// MEETING SDK MODELS
// ==============================================================================

/// Meeting SDK role: 0 joins as attendee, 1 as host.
pub const SDK_ROLE_ATTENDEE: i64 = 0;
pub const SDK_ROLE_HOST: i64 = 1;

#[derive(Debug, Clone, Deserialize)]
pub struct JoinSignatureRequest {
    #[serde(rename = "meetingNumber")]
    pub meeting_number: i64,
    pub role: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JoinSignature {
    pub signature: String,
    #[serde(rename = "sdkKey")]
    pub sdk_key: String,
}

// ==============================================================================
// ERROR HANDLING
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum VideoConferencingError {
    #[error("Video session not found")]
    SessionNotFound,

    #[error("Video provider error: {message}")]
    ProviderError { message: String },

    #[error("Video provider returned an unusable response: {message}")]
    ProviderResponseInvalid { message: String },

    #[error("Video conferencing not configured")]
    NotConfigured,

    #[error("Webhook signature rejected: {reason}")]
    InvalidSignature { reason: String },

    #[error("Invalid webhook payload: {message}")]
    InvalidWebhookPayload { message: String },

    #[error("Failed to schedule session termination: {0}")]
    Scheduling(#[from] task_scheduler_cell::SchedulerError),

    #[error("Database error: {message}")]
    DatabaseError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

impl From<anyhow::Error> for VideoConferencingError {
    fn from(err: anyhow::Error) -> Self {
        VideoConferencingError::DatabaseError {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for VideoConferencingError {
    fn from(err: reqwest::Error) -> Self {
        VideoConferencingError::ProviderError {
            message: err.to_string(),
        }
    }
}
