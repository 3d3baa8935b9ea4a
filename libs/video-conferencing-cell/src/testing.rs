// libs/video-conferencing-cell/src/testing.rs
//! In-process stand-ins for the video provider, shared with other cells' tests.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::models::{MeetingRequest, ProviderMeeting, SessionUpdate, VideoConferencingError};
use crate::services::VideoProvider;

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    Create { meeting_id: i64, topic: String, duration_minutes: i64 },
    End(i64),
    Delete(i64),
    Update(i64, SessionUpdate),
}

/// Records every call and hands out increasing meeting ids.
pub struct RecordingVideoProvider {
    next_id: AtomicI64,
    calls: Mutex<Vec<ProviderCall>>,
    fail_create: bool,
    fail_end: bool,
}

impl Default for RecordingVideoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingVideoProvider {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(90_000_000_001),
            calls: Mutex::new(Vec::new()),
            fail_create: false,
            fail_end: false,
        }
    }

    /// Every create returns meeting id 0, which callers must reject.
    pub fn returning_zero_ids() -> Self {
        let provider = Self::new();
        provider.next_id.store(0, Ordering::SeqCst);
        provider
    }

    pub fn failing_create() -> Self {
        Self {
            fail_create: true,
            ..Self::new()
        }
    }

    pub fn failing_end() -> Self {
        Self {
            fail_end: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn created(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ProviderCall::Create { .. }))
            .count()
    }

    pub fn deleted(&self) -> Vec<i64> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                ProviderCall::Delete(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn ended(&self) -> Vec<i64> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                ProviderCall::End(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ProviderCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl VideoProvider for RecordingVideoProvider {
    async fn create_session(&self, request: &MeetingRequest) -> Result<ProviderMeeting, VideoConferencingError> {
        if self.fail_create {
            return Err(VideoConferencingError::ProviderError {
                message: "create unavailable".to_string(),
            });
        }

        let current = self.next_id.load(Ordering::SeqCst);
        let meeting_id = if current == 0 {
            0
        } else {
            self.next_id.fetch_add(1, Ordering::SeqCst)
        };

        self.record(ProviderCall::Create {
            meeting_id,
            topic: request.topic.clone(),
            duration_minutes: request.duration_minutes,
        });

        Ok(ProviderMeeting {
            meeting_id,
            join_url: format!("https://zoom.test/j/{}", meeting_id),
            start_url: format!("https://zoom.test/s/{}", meeting_id),
            host_id: "host".to_string(),
            host_email: "host@zoom.test".to_string(),
            password: Some("secret".to_string()),
            start_time: request.start_time,
            duration_minutes: request.duration_minutes,
            timezone: "UTC".to_string(),
        })
    }

    async fn end_session(&self, meeting_id: i64) -> Result<(), VideoConferencingError> {
        self.record(ProviderCall::End(meeting_id));
        if self.fail_end {
            return Err(VideoConferencingError::ProviderError {
                message: "end unavailable".to_string(),
            });
        }
        Ok(())
    }

    async fn delete_session(&self, meeting_id: i64) -> Result<(), VideoConferencingError> {
        self.record(ProviderCall::Delete(meeting_id));
        Ok(())
    }

    async fn update_session(&self, meeting_id: i64, update: &SessionUpdate) -> Result<(), VideoConferencingError> {
        self.record(ProviderCall::Update(meeting_id, update.clone()));
        Ok(())
    }
}
