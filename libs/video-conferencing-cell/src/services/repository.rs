// libs/video-conferencing-cell/src/services/repository.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{PostgrestError, SupabaseClient};

use crate::models::{Participant, Session, VideoConferencingError};

const SESSIONS_TABLE: &str = "sessions";
const PARTICIPANTS_TABLE: &str = "session_participants";

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert(&self, session: &Session) -> Result<Session, VideoConferencingError>;

    async fn get(&self, id: Uuid) -> Result<Option<Session>, VideoConferencingError>;

    async fn find_by_meeting_id(&self, meeting_id: i64) -> Result<Option<Session>, VideoConferencingError>;

    /// Overwrites the mutable fields (topic, agenda, timing, status).
    async fn update(&self, session: &Session) -> Result<Session, VideoConferencingError>;

    /// Returns `false` when the same (meeting, participant, joined_at) is already recorded.
    async fn add_participant(&self, participant: &Participant) -> Result<bool, VideoConferencingError>;

    /// Closes the most recent open record for the participant.
    async fn close_participant(
        &self,
        meeting_id: i64,
        participant_id: &str,
        left_at: DateTime<Utc>,
    ) -> Result<Option<Participant>, VideoConferencingError>;

    async fn participants(&self, session_id: Uuid) -> Result<Vec<Participant>, VideoConferencingError>;
}

fn duration_seconds(joined_at: DateTime<Utc>, left_at: DateTime<Utc>) -> i64 {
    (left_at - joined_at).num_seconds().max(0)
}

// ==============================================================================
// IN-MEMORY
// ==============================================================================

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: Mutex<Vec<Session>>,
    participants: Mutex<Vec<Participant>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn insert(&self, session: &Session) -> Result<Session, VideoConferencingError> {
        let mut sessions = self.sessions.lock().await;
        if sessions.iter().any(|s| s.provider_meeting_id == session.provider_meeting_id) {
            return Err(VideoConferencingError::DatabaseError {
                message: format!("session for meeting {} already exists", session.provider_meeting_id),
            });
        }
        sessions.push(session.clone());
        Ok(session.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Session>, VideoConferencingError> {
        Ok(self.sessions.lock().await.iter().find(|s| s.id == id).cloned())
    }

    async fn find_by_meeting_id(&self, meeting_id: i64) -> Result<Option<Session>, VideoConferencingError> {
        Ok(self
            .sessions
            .lock()
            .await
            .iter()
            .find(|s| s.provider_meeting_id == meeting_id)
            .cloned())
    }

    async fn update(&self, session: &Session) -> Result<Session, VideoConferencingError> {
        let mut sessions = self.sessions.lock().await;
        let stored = sessions
            .iter_mut()
            .find(|s| s.id == session.id)
            .ok_or(VideoConferencingError::SessionNotFound)?;
        *stored = session.clone();
        Ok(stored.clone())
    }

    async fn add_participant(&self, participant: &Participant) -> Result<bool, VideoConferencingError> {
        let mut participants = self.participants.lock().await;
        let duplicate = participants.iter().any(|p| {
            p.provider_meeting_id == participant.provider_meeting_id
                && p.participant_id == participant.participant_id
                && p.joined_at == participant.joined_at
        });
        if duplicate {
            return Ok(false);
        }
        participants.push(participant.clone());
        Ok(true)
    }

    async fn close_participant(
        &self,
        meeting_id: i64,
        participant_id: &str,
        left_at: DateTime<Utc>,
    ) -> Result<Option<Participant>, VideoConferencingError> {
        let mut participants = self.participants.lock().await;
        let open = participants
            .iter_mut()
            .filter(|p| {
                p.provider_meeting_id == meeting_id && p.participant_id == participant_id && p.left_at.is_none()
            })
            .max_by_key(|p| p.joined_at);

        Ok(open.map(|p| {
            p.left_at = Some(left_at);
            p.duration_seconds = Some(duration_seconds(p.joined_at, left_at));
            p.clone()
        }))
    }

    async fn participants(&self, session_id: Uuid) -> Result<Vec<Participant>, VideoConferencingError> {
        Ok(self
            .participants
            .lock()
            .await
            .iter()
            .filter(|p| p.session_id == session_id)
            .cloned()
            .collect())
    }
}

// ==============================================================================
// POSTGREST
// ==============================================================================

pub struct PostgrestSessionRepository {
    supabase: Arc<SupabaseClient>,
}

impl PostgrestSessionRepository {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl SessionRepository for PostgrestSessionRepository {
    async fn insert(&self, session: &Session) -> Result<Session, VideoConferencingError> {
        let row = serde_json::to_value(session).map_err(|e| VideoConferencingError::DatabaseError {
            message: e.to_string(),
        })?;
        Ok(self.supabase.insert(SESSIONS_TABLE, row).await?)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Session>, VideoConferencingError> {
        Ok(self
            .supabase
            .select_one(SESSIONS_TABLE, &format!("id=eq.{}", id))
            .await?)
    }

    async fn find_by_meeting_id(&self, meeting_id: i64) -> Result<Option<Session>, VideoConferencingError> {
        Ok(self
            .supabase
            .select_one(SESSIONS_TABLE, &format!("provider_meeting_id=eq.{}", meeting_id))
            .await?)
    }

    async fn update(&self, session: &Session) -> Result<Session, VideoConferencingError> {
        let patch = json!({
            "topic": session.topic,
            "agenda": session.agenda,
            "start_time": session.start_time,
            "duration_minutes": session.duration_minutes,
            "status": session.status,
            "updated_at": Utc::now(),
        });

        let rows: Vec<Session> = self
            .supabase
            .update(SESSIONS_TABLE, &format!("id=eq.{}", session.id), patch)
            .await?;

        rows.into_iter().next().ok_or(VideoConferencingError::SessionNotFound)
    }

    async fn add_participant(&self, participant: &Participant) -> Result<bool, VideoConferencingError> {
        let row = serde_json::to_value(participant).map_err(|e| VideoConferencingError::DatabaseError {
            message: e.to_string(),
        })?;

        match self.supabase.insert::<Participant>(PARTICIPANTS_TABLE, row).await {
            Ok(_) => Ok(true),
            Err(err) => match err.downcast_ref::<PostgrestError>() {
                Some(pg) if pg.is_unique_violation() => {
                    debug!(
                        "Participant {} already recorded for meeting {}",
                        participant.participant_id, participant.provider_meeting_id
                    );
                    Ok(false)
                }
                _ => Err(err.into()),
            },
        }
    }

    async fn close_participant(
        &self,
        meeting_id: i64,
        participant_id: &str,
        left_at: DateTime<Utc>,
    ) -> Result<Option<Participant>, VideoConferencingError> {
        let open: Option<Participant> = self
            .supabase
            .select_one(
                PARTICIPANTS_TABLE,
                &format!(
                    "provider_meeting_id=eq.{}&participant_id=eq.{}&left_at=is.null&order=joined_at.desc",
                    meeting_id,
                    urlencoding::encode(participant_id)
                ),
            )
            .await?;

        let Some(open) = open else {
            return Ok(None);
        };

        let rows: Vec<Participant> = self
            .supabase
            .update(
                PARTICIPANTS_TABLE,
                &format!("id=eq.{}", open.id),
                json!({
                    "left_at": left_at,
                    "duration_seconds": duration_seconds(open.joined_at, left_at),
                }),
            )
            .await?;

        Ok(rows.into_iter().next())
    }

    async fn participants(&self, session_id: Uuid) -> Result<Vec<Participant>, VideoConferencingError> {
        Ok(self
            .supabase
            .select(PARTICIPANTS_TABLE, &format!("session_id=eq.{}&order=joined_at.asc", session_id))
            .await?)
    }
}
