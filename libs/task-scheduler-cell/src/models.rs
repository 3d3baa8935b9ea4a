use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_TASK_TIMEOUT_SECONDS: u64 = 30;

// ==============================================================================
// TASK MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskKind {
    #[serde(rename = "end:session")]
    EndSession,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::EndSession => write!(f, "end:session"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndSessionPayload {
    pub meeting_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub task_id: String,
    pub kind: TaskKind,
    pub payload: serde_json::Value,
    pub fire_at: DateTime<Utc>,
    pub status: TaskStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub timeout_seconds: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub worker_id: Option<String>,
}

impl ScheduledTask {
    pub fn new(task_id: String, kind: TaskKind, payload: serde_json::Value, fire_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            kind,
            payload,
            fire_at,
            status: TaskStatus::Scheduled,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout_seconds: DEFAULT_TASK_TIMEOUT_SECONDS,
            created_at: now,
            updated_at: now,
            completed_at: None,
            last_error: None,
            worker_id: None,
        }
    }

    /// Deterministic id: re-scheduling the same session replaces the pending task.
    pub fn end_session_id(meeting_id: i64) -> String {
        format!("end-session:{}", meeting_id)
    }

    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.fire_at <= now
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Scheduled,
    Processing,
    Retrying,
    Completed,
    Abandoned,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Abandoned)
    }

    pub fn can_transition_to(&self, target: &TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, target) {
            (Scheduled, Processing) => true,
            (Retrying, Processing) => true,
            (Processing, Completed) => true,
            (Processing, Retrying) => true,
            (Processing, Abandoned) => true,
            // A pending task can be re-scheduled to a new fire time.
            (Scheduled, Scheduled) | (Retrying, Scheduled) => true,
            _ => false,
        }
    }
}

// ==============================================================================
// WORKER CONFIGURATION & STATS
// ==============================================================================

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub concurrency: usize,
    pub retry_delay_seconds: u64,
    pub poll_interval_ms: u64,
    pub stats_interval_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", uuid::Uuid::new_v4()),
            concurrency: 10,
            retry_delay_seconds: 5,
            poll_interval_ms: 500,
            stats_interval_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueStats {
    pub scheduled: u64,
    pub processing: u64,
    pub completed: u64,
    pub retried: u64,
    pub abandoned: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_do_not_transition() {
        for status in [TaskStatus::Completed, TaskStatus::Abandoned] {
            assert!(status.is_terminal());
            for target in [TaskStatus::Scheduled, TaskStatus::Processing, TaskStatus::Retrying] {
                assert!(!status.can_transition_to(&target));
            }
        }
    }

    #[test]
    fn retry_budget_counts_attempts() {
        let mut task = ScheduledTask::new(
            ScheduledTask::end_session_id(7),
            TaskKind::EndSession,
            serde_json::json!({ "meeting_id": 7 }),
            Utc::now(),
        );
        assert!(task.can_retry());
        task.attempts = DEFAULT_MAX_ATTEMPTS;
        assert!(!task.can_retry());
    }

    #[test]
    fn task_kind_wire_name() {
        assert_eq!(serde_json::to_string(&TaskKind::EndSession).unwrap(), "\"end:session\"");
        assert_eq!(TaskKind::EndSession.to_string(), "end:session");
    }
}
