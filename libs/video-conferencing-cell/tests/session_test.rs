use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use uuid::Uuid;

use task_scheduler_cell::{
    DeferredTaskScheduler, InMemoryTaskQueue, ScheduledTask, TaskKind, TaskOutcome, TaskQueue, TaskStatus,
    TaskWorker, WorkerConfig,
};
use video_conferencing_cell::models::ParticipantInfo;
use video_conferencing_cell::testing::{ProviderCall, RecordingVideoProvider};
use video_conferencing_cell::{
    EndSessionTaskHandler, InMemorySessionRepository, LifecycleEvent, SessionManager, SessionRepository,
    SessionPlan, SessionStatus, SessionUpdate, VideoConferencingError,
};

struct Harness {
    provider: Arc<RecordingVideoProvider>,
    repository: Arc<InMemorySessionRepository>,
    queue: Arc<InMemoryTaskQueue>,
    manager: SessionManager,
}

fn harness_with(provider: RecordingVideoProvider) -> Harness {
    let provider = Arc::new(provider);
    let repository = Arc::new(InMemorySessionRepository::new());
    let queue = Arc::new(InMemoryTaskQueue::new());
    let manager = SessionManager::new(
        provider.clone(),
        repository.clone(),
        DeferredTaskScheduler::new(queue.clone()),
    );
    Harness {
        provider,
        repository,
        queue,
        manager,
    }
}

fn harness() -> Harness {
    harness_with(RecordingVideoProvider::new())
}

fn plan(start_in_minutes: i64, minutes: i64) -> SessionPlan {
    let start = Utc::now() + Duration::minutes(start_in_minutes);
    SessionPlan {
        booking_id: Uuid::new_v4(),
        topic: "Tax planning".to_string(),
        agenda: Some("Quarterly filing".to_string()),
        start_time: start,
        end_time: start + Duration::minutes(minutes),
    }
}

fn participant(id: &str, joined_at: chrono::DateTime<Utc>) -> ParticipantInfo {
    ParticipantInfo {
        participant_id: id.to_string(),
        name: Some("Ada".to_string()),
        email: None,
        joined_at: Some(joined_at),
        left_at: None,
    }
}

#[tokio::test]
async fn provision_stores_session_and_schedules_termination() {
    let h = harness();
    let plan = plan(60, 30);

    let session = h.manager.provision(&plan).await.unwrap();

    assert_eq!(session.booking_id, plan.booking_id);
    assert_eq!(session.status, SessionStatus::Scheduled);
    assert_eq!(session.duration_minutes, 30);
    assert_eq!(h.provider.created(), 1);

    let task = h
        .queue
        .get_task(&ScheduledTask::end_session_id(session.provider_meeting_id))
        .await
        .unwrap()
        .expect("termination task");
    assert_eq!(task.kind, TaskKind::EndSession);
    assert_eq!(task.fire_at, plan.end_time);
    assert_eq!(task.payload["meeting_id"], session.provider_meeting_id);
}

#[tokio::test]
async fn provision_rejects_zero_meeting_id() {
    let h = harness_with(RecordingVideoProvider::returning_zero_ids());

    let result = h.manager.provision(&plan(60, 30)).await;

    assert_matches!(result, Err(VideoConferencingError::ProviderResponseInvalid { .. }));
    assert!(h.repository.find_by_meeting_id(0).await.unwrap().is_none());
}

#[tokio::test]
async fn provision_surfaces_provider_failure_without_storing() {
    let h = harness_with(RecordingVideoProvider::failing_create());

    let result = h.manager.provision(&plan(60, 30)).await;

    assert_matches!(result, Err(VideoConferencingError::ProviderError { .. }));
    assert_eq!(h.queue.stats().await.scheduled, 0);
}

#[tokio::test]
async fn started_then_ended_updates_status_and_deletes_meeting() {
    let h = harness();
    let session = h.manager.provision(&plan(60, 30)).await.unwrap();
    let meeting_id = session.provider_meeting_id;

    let started = h
        .manager
        .on_lifecycle_event(LifecycleEvent::Started {
            meeting_id,
            start_time: None,
            duration: Some(30),
        })
        .await
        .unwrap();
    assert_eq!(started.status, SessionStatus::Started);

    let ended = h
        .manager
        .on_lifecycle_event(LifecycleEvent::Ended {
            meeting_id,
            duration: Some(28),
        })
        .await
        .unwrap();
    assert_eq!(ended.status, SessionStatus::Ended);
    assert_eq!(ended.duration_minutes, 28);
    assert_eq!(h.provider.deleted(), vec![meeting_id]);
}

#[tokio::test]
async fn lifecycle_event_for_unknown_meeting_is_session_not_found() {
    let h = harness();
    let result = h
        .manager
        .on_lifecycle_event(LifecycleEvent::Ended {
            meeting_id: 1234,
            duration: None,
        })
        .await;
    assert_matches!(result, Err(VideoConferencingError::SessionNotFound));
}

#[tokio::test]
async fn duplicate_join_is_recorded_once_and_left_sets_duration() {
    let h = harness();
    let session = h.manager.provision(&plan(60, 30)).await.unwrap();
    let meeting_id = session.provider_meeting_id;
    let joined_at = Utc::now();

    for _ in 0..2 {
        h.manager
            .on_lifecycle_event(LifecycleEvent::ParticipantJoined {
                meeting_id,
                meeting_uuid: Some("uuid==".to_string()),
                participant: participant("p-1", joined_at),
            })
            .await
            .unwrap();
    }

    let mut left = participant("p-1", joined_at);
    left.left_at = Some(joined_at + Duration::seconds(95));
    h.manager
        .on_lifecycle_event(LifecycleEvent::ParticipantLeft {
            meeting_id,
            participant: left,
        })
        .await
        .unwrap();

    let records = h.manager.participants(session.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].duration_seconds, Some(95));
    assert!(records[0].left_at.is_some());
}

#[tokio::test]
async fn participant_join_reschedules_termination() {
    let h = harness();
    let session = h.manager.provision(&plan(60, 30)).await.unwrap();
    let task_id = ScheduledTask::end_session_id(session.provider_meeting_id);

    h.manager
        .on_lifecycle_event(LifecycleEvent::ParticipantJoined {
            meeting_id: session.provider_meeting_id,
            meeting_uuid: None,
            participant: participant("p-2", Utc::now()),
        })
        .await
        .unwrap();

    let task = h.queue.get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Scheduled);
    assert_eq!(task.fire_at, session.scheduled_end());
    assert_eq!(h.queue.stats().await.scheduled, 2);
}

#[tokio::test]
async fn update_session_pushes_to_provider_then_local() {
    let h = harness();
    let session = h.manager.provision(&plan(60, 30)).await.unwrap();

    let update = SessionUpdate {
        topic: Some("Updated".to_string()),
        agenda: None,
        duration: Some(45),
    };
    let updated = h.manager.update_session(session.id, &update).await.unwrap();

    assert_eq!(updated.topic, "Updated");
    assert_eq!(updated.duration_minutes, 45);
    assert!(h
        .provider
        .calls()
        .contains(&ProviderCall::Update(session.provider_meeting_id, update)));
}

#[tokio::test]
async fn update_session_rejects_non_positive_duration() {
    let h = harness();
    let session = h.manager.provision(&plan(60, 30)).await.unwrap();

    let result = h
        .manager
        .update_session(
            session.id,
            &SessionUpdate {
                duration: Some(0),
                ..SessionUpdate::default()
            },
        )
        .await;
    assert_matches!(result, Err(VideoConferencingError::ValidationError { .. }));
}

#[tokio::test]
async fn discard_deletes_remote_and_ends_local() {
    let h = harness();
    let session = h.manager.provision(&plan(60, 30)).await.unwrap();

    h.manager.discard(&session).await.unwrap();

    assert_eq!(h.provider.deleted(), vec![session.provider_meeting_id]);
    let stored = h.manager.get_session(session.id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Ended);
}

#[tokio::test]
async fn end_task_for_already_ended_session_completes() {
    let provider = Arc::new(RecordingVideoProvider::new());
    let queue = Arc::new(InMemoryTaskQueue::new());

    let task = ScheduledTask::new(
        ScheduledTask::end_session_id(555),
        TaskKind::EndSession,
        serde_json::json!({ "meeting_id": 555 }),
        Utc::now() - Duration::seconds(1),
    );
    queue.enqueue(&task).await.unwrap();

    let worker = TaskWorker::new(
        WorkerConfig {
            retry_delay_seconds: 0,
            ..WorkerConfig::default()
        },
        queue.clone(),
    )
    .register(TaskKind::EndSession, Arc::new(EndSessionTaskHandler::new(provider.clone())));

    assert_eq!(worker.run_once("w").await.unwrap(), Some(TaskOutcome::Completed));
    assert_eq!(provider.ended(), vec![555]);
}

#[tokio::test]
async fn end_task_failures_are_retried_then_abandoned() {
    let provider = Arc::new(RecordingVideoProvider::failing_end());
    let queue = Arc::new(InMemoryTaskQueue::new());

    let task = ScheduledTask::new(
        ScheduledTask::end_session_id(9),
        TaskKind::EndSession,
        serde_json::json!({ "meeting_id": 9 }),
        Utc::now() - Duration::seconds(1),
    );
    queue.enqueue(&task).await.unwrap();

    let worker = TaskWorker::new(
        WorkerConfig {
            retry_delay_seconds: 0,
            ..WorkerConfig::default()
        },
        queue.clone(),
    )
    .register(TaskKind::EndSession, Arc::new(EndSessionTaskHandler::new(provider.clone())));

    let mut outcomes = Vec::new();
    while let Some(outcome) = worker.run_once("w").await.unwrap() {
        outcomes.push(outcome);
    }

    assert_eq!(
        outcomes,
        vec![TaskOutcome::Retrying, TaskOutcome::Retrying, TaskOutcome::Abandoned]
    );
    assert_eq!(provider.ended().len(), 3);
}
