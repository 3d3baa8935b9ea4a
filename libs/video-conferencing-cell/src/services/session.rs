// libs/video-conferencing-cell/src/services/session.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use task_scheduler_cell::{
    DeferredTaskScheduler, EndSessionPayload, ScheduledTask, SchedulerError, TaskHandler,
};

use crate::models::{
    LifecycleEvent, MeetingRequest, Participant, Session, SessionPlan, SessionStatus, SessionUpdate,
    VideoConferencingError,
};
use crate::services::provider::VideoProvider;
use crate::services::repository::SessionRepository;

/// Owns the provider meeting and its local record for a booking.
pub struct SessionManager {
    provider: Arc<dyn VideoProvider>,
    repository: Arc<dyn SessionRepository>,
    scheduler: DeferredTaskScheduler,
}

impl SessionManager {
    pub fn new(
        provider: Arc<dyn VideoProvider>,
        repository: Arc<dyn SessionRepository>,
        scheduler: DeferredTaskScheduler,
    ) -> Self {
        Self {
            provider,
            repository,
            scheduler,
        }
    }

    pub async fn get_session(&self, session_id: Uuid) -> Result<Session, VideoConferencingError> {
        self.repository
            .get(session_id)
            .await?
            .ok_or(VideoConferencingError::SessionNotFound)
    }

    pub async fn participants(&self, session_id: Uuid) -> Result<Vec<Participant>, VideoConferencingError> {
        self.repository.participants(session_id).await
    }

    /// Creates the provider meeting, stores it, and schedules its termination.
    #[instrument(skip(self, plan), fields(booking_id = %plan.booking_id))]
    pub async fn provision(&self, plan: &SessionPlan) -> Result<Session, VideoConferencingError> {
        let duration_minutes = plan.duration_minutes();
        if duration_minutes <= 0 {
            return Err(VideoConferencingError::ValidationError {
                message: "session duration must be positive".to_string(),
            });
        }

        let meeting = self
            .provider
            .create_session(&MeetingRequest {
                topic: plan.topic.clone(),
                agenda: plan.agenda.clone(),
                start_time: plan.start_time,
                duration_minutes,
            })
            .await?;

        if meeting.meeting_id == 0 {
            return Err(VideoConferencingError::ProviderResponseInvalid {
                message: "provider returned meeting id 0".to_string(),
            });
        }

        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            provider_meeting_id: meeting.meeting_id,
            booking_id: plan.booking_id,
            topic: plan.topic.clone(),
            agenda: plan.agenda.clone(),
            join_url: meeting.join_url,
            start_url: meeting.start_url,
            host_id: meeting.host_id,
            host_email: meeting.host_email,
            password: meeting.password,
            start_time: meeting.start_time,
            duration_minutes: meeting.duration_minutes,
            timezone: meeting.timezone,
            status: SessionStatus::Scheduled,
            created_at: now,
            updated_at: now,
        };

        let session = match self.repository.insert(&session).await {
            Ok(stored) => stored,
            Err(e) => {
                error!("Failed to store session for meeting {}: {}", session.provider_meeting_id, e);
                if let Err(cleanup) = self.provider.delete_session(session.provider_meeting_id).await {
                    error!("Failed to delete orphaned meeting {}: {}", session.provider_meeting_id, cleanup);
                }
                return Err(e);
            }
        };

        self.schedule_termination(&session).await;

        info!("Provisioned session {} (meeting {})", session.id, session.provider_meeting_id);
        Ok(session)
    }

    /// Failures are logged only; the next participant join schedules again.
    async fn schedule_termination(&self, session: &Session) {
        match self
            .scheduler
            .schedule_end_session(session.provider_meeting_id, session.scheduled_end())
            .await
        {
            Ok(task_id) => debug!("Termination task {} scheduled", task_id),
            Err(SchedulerError::InvalidFireTime { fire_at }) => {
                warn!(
                    "Session {} already past its end ({}), not scheduling termination",
                    session.id, fire_at
                );
            }
            Err(e) => error!("Failed to schedule termination for session {}: {}", session.id, e),
        }
    }

    #[instrument(skip(self, event), fields(meeting_id = event.meeting_id()))]
    pub async fn on_lifecycle_event(&self, event: LifecycleEvent) -> Result<Session, VideoConferencingError> {
        let mut session = self
            .repository
            .find_by_meeting_id(event.meeting_id())
            .await?
            .ok_or(VideoConferencingError::SessionNotFound)?;

        match event {
            LifecycleEvent::Started { start_time, duration, .. } => {
                session.status = SessionStatus::Started;
                if let Some(start_time) = start_time {
                    session.start_time = start_time;
                }
                if let Some(duration) = duration {
                    session.duration_minutes = duration;
                }
                session.updated_at = Utc::now();
                session = self.repository.update(&session).await?;
                info!("Session {} started", session.id);
            }
            LifecycleEvent::Ended { meeting_id, duration } => {
                session.status = SessionStatus::Ended;
                if let Some(duration) = duration {
                    session.duration_minutes = duration;
                }
                session.updated_at = Utc::now();
                session = self.repository.update(&session).await?;
                self.provider.delete_session(meeting_id).await?;
                info!("Session {} ended and meeting {} deleted", session.id, meeting_id);
            }
            LifecycleEvent::ParticipantJoined {
                meeting_id,
                meeting_uuid,
                participant,
            } => {
                self.schedule_termination(&session).await;

                let record = Participant {
                    id: Uuid::new_v4(),
                    session_id: session.id,
                    provider_meeting_id: meeting_id,
                    meeting_uuid,
                    participant_id: participant.participant_id,
                    participant_name: participant.name,
                    participant_email: participant.email,
                    joined_at: participant.joined_at.unwrap_or_else(Utc::now),
                    left_at: None,
                    duration_seconds: None,
                };

                if self.repository.add_participant(&record).await? {
                    info!("Participant {} joined session {}", record.participant_id, session.id);
                } else {
                    debug!("Duplicate join for participant {} ignored", record.participant_id);
                }
            }
            LifecycleEvent::ParticipantLeft { meeting_id, participant } => {
                let left_at = participant.left_at.unwrap_or_else(Utc::now);
                match self
                    .repository
                    .close_participant(meeting_id, &participant.participant_id, left_at)
                    .await?
                {
                    Some(record) => info!(
                        "Participant {} left session {} after {:?}s",
                        record.participant_id, session.id, record.duration_seconds
                    ),
                    None => warn!(
                        "No open participant record for {} in meeting {}",
                        participant.participant_id, meeting_id
                    ),
                }
            }
        }

        Ok(session)
    }

    /// Ends the remote meeting; an unknown meeting counts as ended.
    #[instrument(skip(self))]
    pub async fn terminate(&self, meeting_id: i64) -> Result<(), VideoConferencingError> {
        self.provider.end_session(meeting_id).await
    }

    /// Pushes topic/agenda/duration to the provider, then to the local record.
    #[instrument(skip(self, update))]
    pub async fn update_session(
        &self,
        session_id: Uuid,
        update: &SessionUpdate,
    ) -> Result<Session, VideoConferencingError> {
        if let Some(duration) = update.duration {
            if duration <= 0 {
                return Err(VideoConferencingError::ValidationError {
                    message: "duration must be positive".to_string(),
                });
            }
        }

        let mut session = self.get_session(session_id).await?;

        self.provider
            .update_session(session.provider_meeting_id, update)
            .await?;

        if let Some(topic) = &update.topic {
            session.topic = topic.clone();
        }
        if let Some(agenda) = &update.agenda {
            session.agenda = Some(agenda.clone());
        }
        if let Some(duration) = update.duration {
            session.duration_minutes = duration;
        }
        session.updated_at = Utc::now();

        let session = self.repository.update(&session).await?;
        if update.duration.is_some() {
            self.schedule_termination(&session).await;
        }
        Ok(session)
    }

    /// Undoes a provision whose booking update lost a race: the meeting is
    /// deleted remotely and the local record ended.
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    pub async fn discard(&self, session: &Session) -> Result<(), VideoConferencingError> {
        warn!("Discarding session {} (meeting {})", session.id, session.provider_meeting_id);

        self.provider.delete_session(session.provider_meeting_id).await?;

        let mut ended = session.clone();
        ended.status = SessionStatus::Ended;
        ended.updated_at = Utc::now();
        self.repository.update(&ended).await?;
        Ok(())
    }
}

// ==============================================================================
// DEFERRED TERMINATION
// ==============================================================================

/// Worker-side handler for `end:session` tasks. Needs only the provider.
pub struct EndSessionTaskHandler {
    provider: Arc<dyn VideoProvider>,
}

impl EndSessionTaskHandler {
    pub fn new(provider: Arc<dyn VideoProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl TaskHandler for EndSessionTaskHandler {
    async fn handle(&self, task: &ScheduledTask) -> Result<(), SchedulerError> {
        let payload: EndSessionPayload = serde_json::from_value(task.payload.clone())?;

        self.provider
            .end_session(payload.meeting_id)
            .await
            .map_err(|e| SchedulerError::HandlerFailed(e.to_string()))?;

        info!("Meeting {} ended by task {}", payload.meeting_id, task.task_id);
        Ok(())
    }
}
