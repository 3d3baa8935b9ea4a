use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{DateTime, Duration, NaiveTime, Utc, Weekday};
use futures::future::join_all;
use uuid::Uuid;

use booking_cell::models::{CreateBookingRequest, RescheduleBookingRequest};
use booking_cell::{
    AvailabilityWindow, BookingError, BookingPatch, BookingService, BookingStatus, ConflictRejection, Expert,
    InMemoryBookingRepository, InMemoryExpertDirectory, PaymentStatus,
};
use task_scheduler_cell::{DeferredTaskScheduler, InMemoryTaskQueue};
use video_conferencing_cell::testing::{ProviderCall, RecordingVideoProvider};
use video_conferencing_cell::{InMemorySessionRepository, SessionManager, SessionPlan};

const ALL_WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

struct Harness {
    service: Arc<BookingService>,
    sessions: Arc<SessionManager>,
    provider: Arc<RecordingVideoProvider>,
    directory: Arc<InMemoryExpertDirectory>,
    expert: Expert,
}

async fn add_expert(directory: &InMemoryExpertDirectory, fees_per_hr: f64) -> Expert {
    let expert = Expert {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        fees_per_hr,
    };
    directory.add_expert(expert.clone()).await;
    for day in ALL_WEEK {
        directory
            .add_window(AvailabilityWindow {
                expert_id: expert.id,
                day,
                start_time: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
                is_weekend: matches!(day, Weekday::Sat | Weekday::Sun),
            })
            .await;
    }
    expert
}

async fn harness() -> Harness {
    let directory = Arc::new(InMemoryExpertDirectory::new());
    let expert = add_expert(&directory, 3000.0).await;

    let provider = Arc::new(RecordingVideoProvider::new());
    let sessions = Arc::new(SessionManager::new(
        provider.clone(),
        Arc::new(InMemorySessionRepository::new()),
        DeferredTaskScheduler::new(Arc::new(InMemoryTaskQueue::new())),
    ));

    let service = Arc::new(BookingService::new(
        Arc::new(InMemoryBookingRepository::new()),
        directory.clone(),
        sessions.clone(),
        1000,
    ));

    Harness {
        service,
        sessions,
        provider,
        directory,
        expert,
    }
}

/// A time on the day after tomorrow, so it is never in the past.
fn slot(hour: u32, minute: u32) -> DateTime<Utc> {
    let day = (Utc::now() + Duration::days(2)).date_naive();
    day.and_hms_opt(hour, minute, 0).unwrap().and_utc()
}

fn request(start: DateTime<Utc>, minutes: i64) -> CreateBookingRequest {
    CreateBookingRequest {
        topic: "Contract review".to_string(),
        agenda: Some("Lease terms".to_string()),
        start_time: start,
        end_time: start + Duration::minutes(minutes),
    }
}

#[tokio::test]
async fn create_booking_prices_and_stores_pending_booking() {
    let h = harness().await;
    let client = Uuid::new_v4();

    let booking = h
        .service
        .create_booking(client, h.expert.id, request(slot(10, 0), 90))
        .await
        .unwrap();

    assert_eq!(booking.bk_status, BookingStatus::Pending);
    assert_eq!(booking.payment_status, PaymentStatus::Pending);
    assert_eq!(booking.total_amount, 5500);
    assert_eq!(booking.version, 1);
    assert_eq!(booking.additional_notes.as_deref(), Some("Lease terms"));
    assert_eq!(h.service.get(booking.id).await.unwrap(), booking);
}

#[tokio::test]
async fn concurrent_overlapping_requests_admit_exactly_one() {
    let h = harness().await;
    let start = slot(14, 0);

    let attempts = (0..12).map(|i| {
        let service = h.service.clone();
        let expert_id = h.expert.id;
        // Staggered starts so every pair overlaps.
        let start = start + Duration::minutes(i);
        async move { service.create_booking(Uuid::new_v4(), expert_id, request(start, 30)).await }
    });

    let results = join_all(attempts).await;

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(accepted, 1);
    for rejected in results.iter().filter(|r| r.is_err()) {
        assert_matches!(rejected, Err(BookingError::Rejected(ConflictRejection::ExpertOverlap)));
    }
}

#[tokio::test]
async fn concurrent_spawned_requests_admit_exactly_one() {
    let h = harness().await;
    let start = slot(15, 0);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = h.service.clone();
            let expert_id = h.expert.id;
            tokio::spawn(async move { service.create_booking(Uuid::new_v4(), expert_id, request(start, 45)).await })
        })
        .collect();

    let mut accepted = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 1);
}

#[tokio::test]
async fn client_cannot_hold_two_overlapping_bookings() {
    let h = harness().await;
    let other_expert = add_expert(&h.directory, 2000.0).await;
    let client = Uuid::new_v4();

    h.service
        .create_booking(client, h.expert.id, request(slot(9, 0), 60))
        .await
        .unwrap();

    let clash = h
        .service
        .create_booking(client, other_expert.id, request(slot(9, 30), 30))
        .await;
    assert_matches!(clash, Err(BookingError::Rejected(ConflictRejection::ClientOverlap)));

    let touching = h
        .service
        .create_booking(client, other_expert.id, request(slot(10, 0), 30))
        .await;
    assert!(touching.is_ok(), "back-to-back bookings do not overlap");
}

#[tokio::test]
async fn unknown_expert_and_self_booking_are_rejected() {
    let h = harness().await;

    let missing = h
        .service
        .create_booking(Uuid::new_v4(), Uuid::new_v4(), request(slot(10, 0), 30))
        .await;
    assert_matches!(missing, Err(BookingError::ExpertNotFound));

    let own = h
        .service
        .create_booking(h.expert.user_id, h.expert.id, request(slot(10, 0), 30))
        .await;
    assert_matches!(own, Err(BookingError::Rejected(ConflictRejection::SelfBooking)));
}

#[tokio::test]
async fn short_and_past_requests_are_rejected() {
    let h = harness().await;
    let client = Uuid::new_v4();

    let short = h
        .service
        .create_booking(client, h.expert.id, request(slot(10, 0), 20))
        .await;
    assert_matches!(short, Err(BookingError::Rejected(ConflictRejection::InvalidDuration(_))));

    let past = h
        .service
        .create_booking(client, h.expert.id, request(Utc::now() - Duration::hours(2), 60))
        .await;
    assert_matches!(past, Err(BookingError::Rejected(ConflictRejection::PastBooking)));
}

#[tokio::test]
async fn cancelled_booking_frees_its_slot() {
    let h = harness().await;
    let booking = h
        .service
        .create_booking(Uuid::new_v4(), h.expert.id, request(slot(12, 0), 60))
        .await
        .unwrap();

    h.service
        .update_status(h.expert.user_id, booking.id, "cancelled")
        .await
        .unwrap();

    let again = h
        .service
        .create_booking(Uuid::new_v4(), h.expert.id, request(slot(12, 0), 60))
        .await;
    assert!(again.is_ok());
}

#[tokio::test]
async fn status_transitions_follow_the_state_machine() {
    let h = harness().await;
    let booking = h
        .service
        .create_booking(Uuid::new_v4(), h.expert.id, request(slot(10, 0), 60))
        .await
        .unwrap();

    let confirmed = h
        .service
        .update_status(h.expert.user_id, booking.id, "Confirmed")
        .await
        .unwrap();
    assert_eq!(confirmed.bk_status, BookingStatus::Confirmed);
    assert_eq!(confirmed.version, 2);

    let unchanged = h
        .service
        .update_status(h.expert.user_id, booking.id, "confirmed")
        .await
        .unwrap();
    assert_eq!(unchanged.version, 2);

    let backwards = h
        .service
        .update_status(h.expert.user_id, booking.id, "pending")
        .await;
    assert_matches!(
        backwards,
        Err(BookingError::InvalidTransition {
            from: BookingStatus::Confirmed,
            to: BookingStatus::Pending
        })
    );

    let bogus = h.service.update_status(h.expert.user_id, booking.id, "approved").await;
    assert_matches!(bogus, Err(BookingError::InvalidStatus(_)));
}

#[tokio::test]
async fn only_the_owning_expert_changes_status() {
    let h = harness().await;
    let client = Uuid::new_v4();
    let booking = h
        .service
        .create_booking(client, h.expert.id, request(slot(10, 0), 60))
        .await
        .unwrap();

    let by_client = h.service.update_status(client, booking.id, "confirmed").await;
    assert_matches!(by_client, Err(BookingError::Forbidden(_)));

    let read_by_client = h.service.get_for_expert(client, booking.id).await;
    assert_matches!(read_by_client, Err(BookingError::Forbidden(_)));

    let read_by_expert = h.service.get_for_expert(h.expert.user_id, booking.id).await;
    assert!(read_by_expert.is_ok());
}

#[tokio::test]
async fn stale_version_is_never_overwritten() {
    let h = harness().await;
    let booking = h
        .service
        .create_booking(Uuid::new_v4(), h.expert.id, request(slot(10, 0), 60))
        .await
        .unwrap();

    let paid = BookingPatch {
        payment_status: Some(PaymentStatus::Paid),
        ..Default::default()
    };
    let failed = BookingPatch {
        payment_status: Some(PaymentStatus::Failed),
        ..Default::default()
    };

    h.service.apply_patch(booking.id, booking.version, &paid).await.unwrap();
    let second = h.service.apply_patch(booking.id, booking.version, &failed).await;
    assert_matches!(second, Err(BookingError::StaleVersion));

    let stored = h.service.get(booking.id).await.unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
    assert_eq!(stored.version, 2);

    let missing = h.service.apply_patch(Uuid::new_v4(), 1, &paid).await;
    assert_matches!(missing, Err(BookingError::NotFound));
}

#[tokio::test]
async fn client_reads_are_scoped_to_the_owner() {
    let h = harness().await;
    let client = Uuid::new_v4();
    let booking = h
        .service
        .create_booking(client, h.expert.id, request(slot(10, 0), 60))
        .await
        .unwrap();

    assert_eq!(h.service.list_for_client(client).await.unwrap().len(), 1);
    assert!(h.service.list_for_client(Uuid::new_v4()).await.unwrap().is_empty());
    assert!(h.service.get_for_client(client, booking.id).await.is_ok());
    assert_matches!(
        h.service.get_for_client(Uuid::new_v4(), booking.id).await,
        Err(BookingError::Forbidden(_))
    );
    assert_matches!(
        h.service.get_for_client(client, Uuid::new_v4()).await,
        Err(BookingError::NotFound)
    );
}

#[tokio::test]
async fn reschedule_requires_a_session() {
    let h = harness().await;
    let client = Uuid::new_v4();
    let booking = h
        .service
        .create_booking(client, h.expert.id, request(slot(10, 0), 60))
        .await
        .unwrap();

    let result = h
        .service
        .reschedule(
            client,
            booking.id,
            RescheduleBookingRequest {
                duration: Some(45),
                ..Default::default()
            },
        )
        .await;
    assert_matches!(result, Err(BookingError::SessionMissing));
}

#[tokio::test]
async fn reschedule_updates_remote_then_local_session() {
    let h = harness().await;
    let client = Uuid::new_v4();
    let booking = h
        .service
        .create_booking(client, h.expert.id, request(slot(10, 0), 60))
        .await
        .unwrap();

    let session = h
        .sessions
        .provision(&SessionPlan {
            booking_id: booking.id,
            topic: booking.topic.clone(),
            agenda: booking.additional_notes.clone(),
            start_time: booking.start_time,
            end_time: booking.end_time,
        })
        .await
        .unwrap();
    let linked = h
        .service
        .apply_patch(
            booking.id,
            booking.version,
            &BookingPatch {
                session_id: Some(session.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let stranger = h
        .service
        .reschedule(Uuid::new_v4(), booking.id, RescheduleBookingRequest::default())
        .await;
    assert_matches!(stranger, Err(BookingError::Forbidden(_)));

    let (updated, session) = h
        .service
        .reschedule(
            client,
            booking.id,
            RescheduleBookingRequest {
                topic: Some("Lease renewal".to_string()),
                agenda: None,
                duration: Some(45),
            },
        )
        .await
        .unwrap();

    assert_eq!(session.duration_minutes, 45);
    assert_eq!(session.topic, "Lease renewal");
    assert_eq!(updated.topic, "Lease renewal");
    assert_eq!(updated.version, linked.version + 1);
    assert!(h
        .provider
        .calls()
        .iter()
        .any(|c| matches!(c, ProviderCall::Update(id, u) if *id == session.provider_meeting_id && u.duration == Some(45))));
}
