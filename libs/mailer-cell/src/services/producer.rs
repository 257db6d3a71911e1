use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::error::MailQueueError;
use crate::models::{CancellationJob, CancellationSnapshot, JobReceipt, JobStatus};
use crate::services::queue::CancellationQueue;

/// Enqueue side of the cancellation mail pipeline. Called from the
/// cancellation request path; returns as soon as the job is durably queued.
pub struct CancellationMailProducer {
    queue: Arc<dyn CancellationQueue>,
}

impl CancellationMailProducer {
    pub fn new(queue: Arc<dyn CancellationQueue>) -> Self {
        Self { queue }
    }

    pub async fn enqueue(&self, snapshot: CancellationSnapshot) -> Result<JobReceipt, MailQueueError> {
        let job = CancellationJob::new(snapshot);

        self.queue.enqueue_job(&job).await?;

        info!(
            "Cancellation mail queued for appointment {} with job ID {}",
            job.snapshot.appointment_id, job.job_id
        );

        Ok(JobReceipt {
            job_id: job.job_id,
            status: JobStatus::Queued,
            retry_count: job.retry_count,
            max_retries: job.max_retries,
        })
    }

    pub async fn get_job_status(&self, job_id: Uuid) -> Result<Option<CancellationJob>, MailQueueError> {
        self.queue.get_job(job_id).await
    }
}
