use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::MailQueueError;
use crate::models::{CancellationJob, JobStatus};
use shared_config::AppConfig;

const QUEUE_PENDING: &str = "cancellation_mail:pending";
const QUEUE_PROCESSING: &str = "cancellation_mail:processing";
const JOB_TTL_SECONDS: i64 = 604800;
const STALE_PROCESSING_SECONDS: i64 = 600;

/// Durable queue seam between the cancellation request path and the mail
/// worker. Both sides receive the same handle; there is no ambient queue.
#[async_trait]
pub trait CancellationQueue: Send + Sync {
    /// Durably stores the job and makes it visible to workers. Once this
    /// returns, the requester-facing path is done with the cancellation
    /// email; delivery is at-least-once from here.
    async fn enqueue_job(&self, job: &CancellationJob) -> Result<(), MailQueueError>;

    async fn dequeue_job(&self, worker_id: &str) -> Result<Option<CancellationJob>, MailQueueError>;

    async fn update_job_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<(), MailQueueError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<CancellationJob>, MailQueueError>;

    /// Re-queues a failed job, consuming one retry.
    async fn retry_job(&self, job_id: Uuid) -> Result<(), MailQueueError>;

    async fn cleanup_expired_jobs(&self) -> Result<u64, MailQueueError>;
}

pub struct RedisCancellationQueue {
    pool: Pool,
}

impl RedisCancellationQueue {
    pub async fn new(config: &AppConfig) -> Result<Self, MailQueueError> {
        let redis_url = config
            .redis_url
            .clone()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        let cfg = Config::from_url(redis_url);
        let pool = cfg.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
            MailQueueError::QueueError(format!("Failed to create Redis pool: {}", e))
        })?;

        // Fail at startup rather than on the first cancellation.
        let mut conn = pool
            .get()
            .await
            .map_err(|e| MailQueueError::QueueError(format!("Failed to connect to Redis: {}", e)))?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Cancellation mail queue initialized");

        Ok(Self { pool })
    }

    async fn get_connection(&self) -> Result<Connection, MailQueueError> {
        self.pool
            .get()
            .await
            .map_err(|e| MailQueueError::QueueError(format!("Failed to get Redis connection: {}", e)))
    }

    async fn write_job(
        &self,
        conn: &mut Connection,
        job: &CancellationJob,
    ) -> Result<(), MailQueueError> {
        let job_key = job_key(job.job_id);
        let job_data = serde_json::to_string(job)?;

        let _: () = conn
            .hset_multiple(
                &job_key,
                &[
                    ("data", job_data.as_str()),
                    ("status", &serde_json::to_string(&job.status)?),
                    ("updated_at", &job.updated_at.to_rfc3339()),
                ],
            )
            .await?;

        Ok(())
    }

    async fn read_job(
        &self,
        conn: &mut Connection,
        job_id: Uuid,
    ) -> Result<Option<CancellationJob>, MailQueueError> {
        let job_data: Option<String> = conn.hget(job_key(job_id), "data").await?;
        match job_data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }
}

fn job_key(job_id: Uuid) -> String {
    format!("cancellation_job:{}", job_id)
}

#[async_trait]
impl CancellationQueue for RedisCancellationQueue {
    async fn enqueue_job(&self, job: &CancellationJob) -> Result<(), MailQueueError> {
        let mut conn = self.get_connection().await?;

        let job_key = job_key(job.job_id);
        let job_data = serde_json::to_string(job)?;

        let _: () = conn
            .hset_multiple(
                &job_key,
                &[
                    ("data", job_data.as_str()),
                    ("status", &serde_json::to_string(&job.status)?),
                    ("created_at", &job.created_at.to_rfc3339()),
                ],
            )
            .await?;

        let _: () = conn.expire(&job_key, JOB_TTL_SECONDS).await?;
        let _: () = conn.lpush(QUEUE_PENDING, job.job_id.to_string()).await?;

        debug!("Job {} enqueued", job.job_id);
        Ok(())
    }

    async fn dequeue_job(&self, worker_id: &str) -> Result<Option<CancellationJob>, MailQueueError> {
        let mut conn = self.get_connection().await?;

        // Atomic handoff: the id moves to the processing list before the
        // worker sees it, so a crashed worker leaves a visible trace.
        let job_id: Option<String> = conn.brpoplpush(QUEUE_PENDING, QUEUE_PROCESSING, 1.0).await?;

        if let Some(job_id_str) = job_id {
            let parsed = Uuid::parse_str(&job_id_str)
                .map_err(|_| MailQueueError::JobNotFound(job_id_str.clone()))?;

            if let Some(mut job) = self.read_job(&mut conn, parsed).await? {
                job.worker_id = Some(worker_id.to_string());
                job.status = JobStatus::Processing;
                job.updated_at = Utc::now();

                self.write_job(&mut conn, &job).await?;

                debug!("Job {} dequeued by worker {}", job.job_id, worker_id);
                return Ok(Some(job));
            }
        }

        Ok(None)
    }

    async fn update_job_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<(), MailQueueError> {
        let mut conn = self.get_connection().await?;

        let Some(mut job) = self.read_job(&mut conn, job_id).await? else {
            return Err(MailQueueError::JobNotFound(job_id.to_string()));
        };

        if !job.status.can_transition_to(&status) {
            return Err(MailQueueError::InvalidStatusTransition {
                from: format!("{:?}", job.status),
                to: format!("{:?}", status),
            });
        }

        let old_status = job.status.clone();
        job.status = status.clone();
        job.updated_at = Utc::now();
        job.error_message = error_message;

        if status.is_terminal() {
            job.completed_at = Some(Utc::now());
            let _: () = conn.lrem(QUEUE_PROCESSING, 1, job_id.to_string()).await?;
        }

        self.write_job(&mut conn, &job).await?;

        debug!("Job {} status updated from {:?} to {:?}", job_id, old_status, status);
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<CancellationJob>, MailQueueError> {
        let mut conn = self.get_connection().await?;
        self.read_job(&mut conn, job_id).await
    }

    async fn retry_job(&self, job_id: Uuid) -> Result<(), MailQueueError> {
        let mut conn = self.get_connection().await?;

        let Some(mut job) = self.read_job(&mut conn, job_id).await? else {
            return Err(MailQueueError::JobNotFound(job_id.to_string()));
        };

        if !job.can_retry() {
            return Err(MailQueueError::MaxRetriesExceeded {
                job_id: job_id.to_string(),
                max_retries: job.max_retries,
            });
        }

        job.retry_count += 1;
        job.status = JobStatus::Retrying;
        job.updated_at = Utc::now();
        job.error_message = None;
        job.worker_id = None;

        self.write_job(&mut conn, &job).await?;

        let _: () = conn.lrem(QUEUE_PROCESSING, 1, job_id.to_string()).await?;
        let _: () = conn.lpush(QUEUE_PENDING, job_id.to_string()).await?;

        info!("Job {} retried (attempt {}/{})", job_id, job.retry_count, job.max_retries);
        Ok(())
    }

    async fn cleanup_expired_jobs(&self) -> Result<u64, MailQueueError> {
        let mut conn = self.get_connection().await?;

        let cutoff = Utc::now() - chrono::Duration::seconds(JOB_TTL_SECONDS);
        let keys: Vec<String> = conn.keys("cancellation_job:*").await?;
        let mut cleaned = 0;

        for key in keys {
            let created_at_str: Option<String> = conn.hget(&key, "created_at").await?;

            if let Some(created_str) = created_at_str {
                if let Ok(created_at) = chrono::DateTime::parse_from_rfc3339(&created_str) {
                    if created_at.with_timezone(&Utc) < cutoff {
                        let _: () = conn.del(&key).await?;
                        cleaned += 1;
                    }
                }
            }
        }

        // Re-deliver jobs whose worker died mid-send. Delivery is
        // at-least-once, so a duplicate email beats a lost one.
        let stale_cutoff = Utc::now() - chrono::Duration::seconds(STALE_PROCESSING_SECONDS);
        let processing_ids: Vec<String> = conn.lrange(QUEUE_PROCESSING, 0, -1).await?;

        for id_str in processing_ids {
            let Ok(job_id) = Uuid::parse_str(&id_str) else {
                continue;
            };
            let Some(mut job) = self.read_job(&mut conn, job_id).await? else {
                let _: () = conn.lrem(QUEUE_PROCESSING, 1, &id_str).await?;
                continue;
            };

            if job.status == JobStatus::Processing && job.updated_at < stale_cutoff {
                job.status = JobStatus::Queued;
                job.updated_at = Utc::now();
                job.worker_id = None;
                self.write_job(&mut conn, &job).await?;

                let _: () = conn.lrem(QUEUE_PROCESSING, 1, &id_str).await?;
                let _: () = conn.lpush(QUEUE_PENDING, &id_str).await?;
                info!("Requeued stale cancellation job {}", job_id);
            }
        }

        if cleaned > 0 {
            info!("Cleaned up {} expired cancellation jobs", cleaned);
        } else {
            debug!("No expired cancellation jobs found");
        }
        Ok(cleaned)
    }
}
