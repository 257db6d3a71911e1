use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Everything the cancellation email needs, captured at enqueue time.
/// The worker never re-reads appointment or profile state, so later changes
/// to either cannot race with delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationSnapshot {
    pub appointment_id: Uuid,
    pub slot: DateTime<Utc>,
    pub requester_name: String,
    pub provider_name: String,
    pub provider_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationJob {
    pub job_id: Uuid,
    pub snapshot: CancellationSnapshot,
    pub status: JobStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub worker_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Retrying,
    Dropped,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Dropped)
    }

    pub fn can_transition_to(&self, target: &JobStatus) -> bool {
        use JobStatus::*;
        match (self, target) {
            (Queued, Processing) => true,
            (Retrying, Processing) => true,
            (Processing, Completed) => true,
            (Processing, Failed) => true,
            (Failed, Retrying) => true,
            (Failed, Dropped) => true,
            _ => false,
        }
    }
}

impl CancellationJob {
    pub fn new(snapshot: CancellationSnapshot) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            snapshot,
            status: JobStatus::Queued,
            retry_count: 0,
            max_retries: 3,
            created_at: now,
            updated_at: now,
            completed_at: None,
            error_message: None,
            worker_id: None,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries && self.status == JobStatus::Failed
    }
}

/// Returned to the enqueuing side once the job is durably queued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReceipt {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub retry_count: u32,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub max_concurrent_jobs: u32,
    pub job_timeout_seconds: u64,
    pub retry_delay_seconds: u64,
    pub sweep_interval_seconds: u64,
    pub graceful_shutdown_timeout_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("mail-worker-{}", Uuid::new_v4()),
            max_concurrent_jobs: 2,
            job_timeout_seconds: 30,
            retry_delay_seconds: 30,
            sweep_interval_seconds: 300,
            graceful_shutdown_timeout_seconds: 30,
        }
    }
}
